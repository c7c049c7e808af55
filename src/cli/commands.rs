use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "carecoin-node", about = "A proof-of-work UTXO ledger node")]
pub struct Opt {
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node and join the network")]
    StartNode {
        #[arg(long, help = "Enable mining mode and send rewards to ADDRESS")]
        miner: Option<String>,
    },
    #[command(name = "createwallet", about = "Create a new password protected wallet")]
    Createwallet {
        #[arg(long, help = "Wallet password")]
        password: String,
    },
    #[command(name = "listwallets", about = "Print local wallets and their addresses")]
    ListWallets,
    #[command(name = "newaddress", about = "Derive a new address in a wallet")]
    NewAddress {
        #[arg(long, help = "Wallet id")]
        wallet: String,
        #[arg(long, help = "Wallet password")]
        password: String,
    },
    #[command(
        name = "getbalance",
        about = "Get the confirmed balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "send", about = "Send coins from one of your addresses")]
    Send {
        #[arg(long, help = "Wallet id")]
        wallet: String,
        #[arg(long, help = "Wallet password")]
        password: String,
        #[arg(long, help = "Source address")]
        from: String,
        #[arg(long, help = "Destination address")]
        to: String,
        #[arg(long, help = "Amount to send")]
        amount: u64,
        #[arg(long, help = "Address receiving the change, defaults to the source")]
        change: Option<String>,
        #[arg(long, help = "Mine a block with the transaction right away")]
        mine: bool,
    },
    #[command(name = "mine", about = "Mine one block from the pending transactions")]
    Mine {
        #[arg(long, help = "Address receiving the block reward")]
        reward: String,
        #[arg(long, help = "Address receiving the fees, defaults to the reward address")]
        fee: Option<String>,
    },
    #[command(name = "confirmations", about = "Show the confirmations of a transaction")]
    Confirmations {
        #[arg(help = "Transaction id")]
        transaction: String,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
}
