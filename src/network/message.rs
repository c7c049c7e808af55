use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

pub(crate) const TCP_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Peer protocol. Blocks and transactions travel in their canonical JSON form,
/// so the receiver re-checks every hash while decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// First message to a new peer: who I am and where my chain ends
    #[serde(rename_all = "camelCase")]
    Hello {
        addr_from: String,
        latest_block: Block,
    },
    #[serde(rename_all = "camelCase")]
    NewBlock { addr_from: String, block: Block },
    NewTransaction { transaction: Transaction },
    #[serde(rename_all = "camelCase")]
    ChainRequest { addr_from: String, from_index: u64 },
    /// Consecutive blocks, starting at the requested index
    ChainResponse { blocks: Vec<Block> },
    PeerList { peers: Vec<String> },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::NewBlock { .. } => "newBlock",
            Message::NewTransaction { .. } => "newTransaction",
            Message::ChainRequest { .. } => "chainRequest",
            Message::ChainResponse { .. } => "chainResponse",
            Message::PeerList { .. } => "peerList",
        }
    }
}

pub fn parse_peer_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse::<SocketAddr>()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))
}

/// Opens a connection to `addr`, writes one message and closes it
pub fn send_message(addr: &str, message: &Message) -> Result<()> {
    let socket_addr = parse_peer_addr(addr)?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, TCP_WRITE_TIMEOUT)
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;

    stream
        .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

    serde_json::to_writer(&stream, message)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;

    stream
        .flush()
        .map_err(|e| BlockchainError::Network(format!("Failed to flush stream to {addr}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_tagged() {
        let message = Message::ChainRequest {
            addr_from: "127.0.0.1:2001".to_string(),
            from_index: 3,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "chainRequest");
        assert_eq!(json["addrFrom"], "127.0.0.1:2001");
        assert_eq!(json["fromIndex"], 3);
    }

    #[test]
    fn test_block_payload_is_checked_on_receipt() {
        let message = Message::NewBlock {
            addr_from: "127.0.0.1:2001".to_string(),
            block: Block::genesis().clone(),
        };
        let mut json = serde_json::to_value(&message).unwrap();
        let decoded: Message = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded.name(), "newBlock");

        json["block"]["nonce"] = serde_json::json!(42);
        assert!(serde_json::from_value::<Message>(json).is_err());
    }

    #[test]
    fn test_invalid_peer_address() {
        assert!(parse_peer_addr("not an address").is_err());
        assert!(parse_peer_addr("127.0.0.1:2001").is_ok());
    }
}
