// Entry point of the node binary.
// Settings are loaded once here and everything else gets what it needs from them.

use carecoin::{
    send_message, Blockchain, BlockchainError, Command, Message, Miner, Node, Operator, Opt,
    Settings, WalletVault,
};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::process;
use std::sync::atomic::AtomicBool;
use uuid::Uuid;

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), BlockchainError> {
    let settings = Settings::load(opt.config.as_deref())?;
    let data_dir = settings.node_data_dir();
    let blockchain = Blockchain::open(&data_dir.join("chain"), settings.consensus.clone())?;

    match opt.command {
        Command::StartNode { miner } => {
            let node = Node::new(
                &settings.node.listen_address,
                blockchain,
                settings.node.max_peers,
            )
            .with_max_block_transactions(settings.mining.max_block_transactions);

            let reward_address = miner.or_else(|| {
                settings
                    .mining
                    .auto_mine
                    .then(|| settings.mining.reward_address.clone())
                    .flatten()
            });
            if let Some(reward_address) = reward_address {
                let fee_address = settings
                    .mining
                    .fee_address
                    .clone()
                    .unwrap_or_else(|| reward_address.clone());
                node.start_mining_loop(
                    reward_address,
                    fee_address,
                    settings.mining.poll_interval(),
                );
            }

            // Returns once the node shuts down and the mining loop has stopped
            node.run(&settings.node.bootstrap_peers)?;
        }
        Command::Createwallet { password } => {
            let operator = open_operator(&settings, blockchain)?;
            let material = operator.hash_password(&password)?;
            let wallet = operator.create_wallet_from_password(&material)?;
            println!("Wallet id: {}", wallet.id);
            println!("Your new address: {}", wallet.addresses[0]);
        }
        Command::ListWallets => {
            let operator = open_operator(&settings, blockchain)?;
            for wallet in operator.get_wallets() {
                println!("{}", wallet.id);
                for address in wallet.addresses {
                    println!("  {address}");
                }
            }
        }
        Command::NewAddress { wallet, password } => {
            let operator = open_operator(&settings, blockchain)?;
            let wallet_id = unlock(&operator, &wallet, &password)?;
            let address = operator.generate_address_for_wallet(&wallet_id)?;
            println!("Your new address: {address}");
        }
        Command::GetBalance { address } => {
            let balance = blockchain.get_balance_for_address(&address)?;
            println!("Balance of {address}: {balance}");
        }
        Command::Send {
            wallet,
            password,
            from,
            to,
            amount,
            change,
            mine,
        } => {
            let operator = open_operator(&settings, blockchain.clone())?;
            let wallet_id = unlock(&operator, &wallet, &password)?;
            let tx = operator.create_transaction(&wallet_id, &from, &to, amount, change.as_deref())?;
            let tx = blockchain.add_transaction(tx)?;
            println!("Transaction {} accepted", tx.get_id());

            if mine {
                let reward = settings
                    .mining
                    .reward_address
                    .clone()
                    .unwrap_or_else(|| from.clone());
                let fee = settings.fee_address().unwrap_or(&reward).to_string();
                let block = Miner::new(blockchain)
                    .with_max_transactions(settings.mining.max_block_transactions)
                    .mine_and_commit(&reward, &fee, &AtomicBool::new(false))?;
                println!("Mined block {} ({})", block.get_index(), block.get_hash());
            } else {
                let message = Message::NewTransaction { transaction: tx };
                for peer in &settings.node.bootstrap_peers {
                    match send_message(peer, &message) {
                        Ok(()) => info!("Relayed transaction to {peer}"),
                        Err(e) => warn!("Could not relay transaction to {peer}: {e}"),
                    }
                }
            }
        }
        Command::Mine { reward, fee } => {
            let fee = fee.unwrap_or_else(|| reward.clone());
            let block = Miner::new(blockchain)
                .with_max_transactions(settings.mining.max_block_transactions)
                .mine_and_commit(&reward, &fee, &AtomicBool::new(false))?;
            println!(
                "Mined block {} with {} transactions: {}",
                block.get_index(),
                block.get_transactions().len(),
                block.get_hash()
            );
        }
        Command::Confirmations { transaction } => {
            let id = parse_id(&transaction)?;
            let confirmations = blockchain.get_confirmations(&id)?;
            println!("Transaction {id}: {confirmations} confirmations");
        }
        Command::Printchain => {
            for block in blockchain.get_all_blocks().iter().rev() {
                println!("Block #{}", block.get_index());
                println!("Pre block hash: {}", block.get_previous_hash());
                println!("Cur block hash: {}", block.get_hash());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Difficulty: {}, nonce: {}", block.get_difficulty(), block.get_nonce());

                for tx in block.get_transactions() {
                    println!("- Transaction {} ({:?}, fee {})", tx.get_id(), tx.get_kind(), tx.get_fee());
                    for input in tx.get_inputs() {
                        println!("-- Input {}, from = {}", input.get_outpoint(), input.get_address());
                    }
                    for output in tx.get_outputs() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_amount(),
                            output.get_address()
                        );
                    }
                }
                println!()
            }
        }
    }
    Ok(())
}

fn open_operator(settings: &Settings, blockchain: Blockchain) -> Result<Operator, BlockchainError> {
    Operator::open(
        blockchain,
        WalletVault::new(&settings.node_data_dir()),
        settings.wallet.kdf(),
        settings.wallet.min_password_length,
    )
}

fn parse_id(id: &str) -> Result<Uuid, BlockchainError> {
    Uuid::parse_str(id).map_err(|e| BlockchainError::Argument(format!("Invalid id {id}: {e}")))
}

// Every wallet command starts with a password check
fn unlock(operator: &Operator, wallet: &str, password: &str) -> Result<Uuid, BlockchainError> {
    let wallet_id = parse_id(wallet)?;
    let material = operator.hash_password(password)?;
    if !operator.check_wallet_password(&wallet_id, &material)? {
        return Err(BlockchainError::Unauthorized(
            "Wrong wallet password".to_string(),
        ));
    }
    Ok(wallet_id)
}
