use crate::error::{BlockchainError, Result};
use crate::network::{Message, Node};
use log::{debug, error, info, warn};
use serde_json::Deserializer;
use std::io::{BufReader, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

const TCP_READ_TIMEOUT: Duration = Duration::from_secs(60);
// How often the accept loop looks at the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// TCP listener feeding inbound peer messages into a [`Node`]
pub struct Server {
    node: Node,
}

impl Server {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    /// Binds the node's listen address
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.node.address();
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        listener.set_nonblocking(true).map_err(|e| {
            BlockchainError::Network(format!("Failed to make listener non-blocking: {e}"))
        })?;

        info!("Server listening on {addr}");
        Ok(listener)
    }

    /// Accepts connections until the node shuts down. Every connection gets its
    /// own reader thread.
    pub fn serve(self, listener: TcpListener) {
        while !self.node.is_shutting_down() {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    let node = self.node.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&node, stream, peer_addr) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        info!("Server on {} stopped", self.node.address());
    }

    fn handle_connection(node: &Node, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        // The listener is non-blocking, but the reader must block
        stream
            .set_nonblocking(false)
            .map_err(|e| BlockchainError::Network(format!("Failed to configure stream: {e}")))?;
        stream
            .set_read_timeout(Some(TCP_READ_TIMEOUT))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let messages = Deserializer::from_reader(reader).into_iter::<Message>();

        for message in messages {
            let message = message.map_err(|e| {
                BlockchainError::MalformedEntity(format!("Failed to decode message: {e}"))
            })?;

            debug!("Received {} from {peer_addr}", message.name());

            if let Err(e) = node.handle_message(message) {
                warn!("Rejected message from {peer_addr}: {e}");
            }
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }
}
