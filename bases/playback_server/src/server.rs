use crate::config::Config;
use crate::error::ServerError;
use control_protocol::{Command, CommandName, ProtocolError, Response};
use queue_player::Router;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Loopback entry point: one command per connection, one response back.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
}

impl Listener {
    /// Bind the first free port of the configured range on 127.0.0.1
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let (start, end) = (config.port_start, config.port_end);
        if start > end {
            return Err(ServerError::InvalidPortRange { start, end });
        }

        for port in start..=end {
            match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
                Ok(listener) => {
                    info!("Listening on {}", listener.local_addr()?);
                    return Ok(Self {
                        listener,
                        config,
                        shutdown: CancellationToken::new(),
                    });
                }
                Err(e) => debug!("Port {} unavailable: {}", port, e),
            }
        }

        Err(ServerError::NoFreePort { start, end })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Cancelled when a client sends SHUTDOWN; cancel it to stop the listener
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown is requested
    pub async fn run(self, router: Router) {
        let Listener {
            listener,
            config,
            shutdown,
        } = self;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let connection = Connection {
                            router: router.clone(),
                            shutdown: shutdown.clone(),
                            read_timeout: config.read_timeout,
                            max_envelope_bytes: config.max_envelope_bytes,
                        };
                        tokio::spawn(async move {
                            if let Err(e) = connection.serve(stream).await {
                                warn!("Dropped connection from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        info!("Listener stopped");
    }
}

struct Connection {
    router: Router,
    shutdown: CancellationToken,
    read_timeout: Duration,
    max_envelope_bytes: usize,
}

impl Connection {
    async fn serve(self, mut stream: TcpStream) -> Result<(), ServerError> {
        let command = tokio::time::timeout(
            self.read_timeout,
            read_command(&mut stream, self.max_envelope_bytes),
        )
        .await
        .map_err(|_| ServerError::ReadTimeout(self.read_timeout))??;

        info!("Received {}", command.name);

        let response = match command.name {
            CommandName::Shutdown => {
                if !self.shutdown.is_cancelled() {
                    info!("Shutdown requested");
                }
                self.shutdown.cancel();
                Response::ok()
            }
            _ => self.router.submit(command).await,
        };

        stream.write_all(&response.encode()?).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Read until the bytes form one complete envelope, the peer stops sending,
/// or the envelope outgrows `limit`.
async fn read_command(stream: &mut TcpStream, limit: usize) -> Result<Command, ServerError> {
    let mut envelope = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(Command::decode(&envelope)?);
        }

        envelope.extend_from_slice(&chunk[..read]);
        if envelope.len() > limit {
            return Err(ProtocolError::EnvelopeTooLarge { limit }.into());
        }

        match Command::decode(&envelope) {
            Ok(command) => return Ok(command),
            Err(e) if e.is_incomplete() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
