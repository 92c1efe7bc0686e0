//! Single-session INDI TCP server
//!
//! Accepts one peer at a time. While a peer is active, further connections
//! are accepted and closed immediately. Every read is handed straight to the
//! session and any replies are written back before the next read.
//!
//! Device-side values arrive through the sender returned by `updates()`.
//! They are applied whether or not a peer is connected and forwarded to the
//! active peer as `set*Vector` messages.

use crate::config::ServerConfig;
use crate::error::IndiResult;
use crate::property::Device;
use crate::session::{EntryUpdate, IndiSession};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 4096;
const UPDATE_QUEUE_DEPTH: usize = 100;
/// Pause after a failed accept so a persistent error (e.g. EMFILE) cannot spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Outcome of one round of the serve loop
enum Step {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Read(std::io::Result<usize>),
    Update(EntryUpdate),
}

pub struct IndiServer {
    config: ServerConfig,
    session: IndiSession,
    updates_tx: mpsc::Sender<EntryUpdate>,
    updates_rx: mpsc::Receiver<EntryUpdate>,
}

impl IndiServer {
    /// Create a server, loading the device from the configured property source
    pub fn new(config: ServerConfig) -> Self {
        let device = config.load_device();
        Self::with_device(config, device)
    }

    pub fn with_device(config: ServerConfig, device: Device) -> Self {
        let session = IndiSession::with_config(device, &config);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_DEPTH);
        Self {
            config,
            session,
            updates_tx,
            updates_rx,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self) -> &IndiSession {
        &self.session
    }

    /// Sender for device-side value changes
    pub fn updates(&self) -> mpsc::Sender<EntryUpdate> {
        self.updates_tx.clone()
    }

    /// Bind the configured address
    pub async fn bind(&self) -> IndiResult<TcpListener> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(
            "INDI server for '{}' listening on {}",
            self.session.device().name(),
            listener.local_addr()?
        );
        Ok(listener)
    }

    /// Bind and serve; only a bind failure ends it
    pub async fn run(&mut self) -> IndiResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve peers from an already bound listener
    pub async fn serve(&mut self, listener: TcpListener) -> IndiResult<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut peer: Option<(TcpStream, SocketAddr)> = None;

        loop {
            let Some((stream, addr)) = peer.as_mut() else {
                let step = tokio::select! {
                    accepted = listener.accept() => Step::Accepted(accepted),
                    Some(update) = self.updates_rx.recv() => Step::Update(update),
                };
                match step {
                    Step::Accepted(accepted) => match accepted_peer(accepted) {
                        Some((stream, addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                            }
                            tracing::info!("INDI client connected from {}", addr);
                            peer = Some((stream, addr));
                        }
                        None => tokio::time::sleep(ACCEPT_RETRY_DELAY).await,
                    },
                    Step::Update(update) => {
                        // No peer to notify; the value shows up in the next definitions
                        self.publish(&update);
                    }
                    Step::Read(_) => {}
                }
                continue;
            };

            let step = tokio::select! {
                accepted = listener.accept() => Step::Accepted(accepted),
                read = stream.read(&mut buf) => Step::Read(read),
                Some(update) = self.updates_rx.recv() => Step::Update(update),
            };

            let close = match step {
                Step::Accepted(accepted) => {
                    if let Some((extra, extra_addr)) = accepted_peer(accepted) {
                        tracing::warn!(
                            "Rejecting INDI client {}: session already active for {}",
                            extra_addr,
                            addr
                        );
                        drop(extra);
                    }
                    false
                }
                Step::Read(Ok(0)) => {
                    tracing::info!("INDI client {} disconnected", addr);
                    true
                }
                Step::Read(Ok(n)) => {
                    let replies = self.session.feed(&buf[..n]);
                    Self::send_or_close(stream, *addr, &replies).await
                }
                Step::Read(Err(e)) => {
                    tracing::error!("INDI read error from {}: {}", addr, e);
                    true
                }
                Step::Update(update) => match self.publish(&update) {
                    Some(message) => Self::send_or_close(stream, *addr, &[message]).await,
                    None => false,
                },
            };

            if close {
                peer = None;
                self.session.reset();
            }
        }
    }

    /// Serve a single stream until EOF, then reset the session for the next peer
    pub async fn serve_connection<S>(&mut self, mut stream: S) -> IndiResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let result = loop {
            let step = tokio::select! {
                read = stream.read(&mut buf) => Step::Read(read),
                Some(update) = self.updates_rx.recv() => Step::Update(update),
            };
            let replies = match step {
                Step::Read(Ok(0)) => break Ok(()),
                Step::Read(Ok(n)) => self.session.feed(&buf[..n]),
                Step::Read(Err(e)) => break Err(e.into()),
                Step::Update(update) => self.publish(&update).into_iter().collect(),
                Step::Accepted(_) => Vec::new(),
            };
            if let Err(e) = write_messages(&mut stream, &replies).await {
                break Err(e.into());
            }
        };
        self.session.reset();
        result
    }

    /// Apply a device-side update; a rejected update is logged and dropped
    fn publish(&mut self, update: &EntryUpdate) -> Option<String> {
        match self.session.publish(update) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(
                    "Dropping device update for {}.{}: {}",
                    update.vector,
                    update.entry,
                    e
                );
                None
            }
        }
    }

    /// Write to the peer; returns true when the connection should be closed
    async fn send_or_close(stream: &mut TcpStream, addr: SocketAddr, messages: &[String]) -> bool {
        match write_messages(stream, messages).await {
            Ok(()) => false,
            Err(e) => {
                tracing::error!("INDI write error to {}: {}", addr, e);
                true
            }
        }
    }
}

/// Accept failures are transient for the server; log them and carry on
fn accepted_peer(
    result: std::io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match result {
        Ok(peer) => Some(peer),
        Err(e) => {
            tracing::warn!("INDI accept error: {}", e);
            None
        }
    }
}

/// Write messages, one per line, and flush
async fn write_messages<W>(writer: &mut W, messages: &[String]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if messages.is_empty() {
        return Ok(());
    }

    let mut payload = String::new();
    for message in messages {
        payload.push_str(message);
        payload.push('\n');
    }
    tracing::debug!("INDI TX: {} message(s), {} bytes", messages.len(), payload.len());
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await
}
