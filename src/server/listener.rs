//! Connection acceptor and server lifecycle.
//!
//! The server moves through `Stopped → Listening → ShuttingDown → Stopped`:
//! [`Server::bind`] enters `Listening` (bind failure is fatal to the
//! process), [`Server::run`] accepts until the shutdown future resolves,
//! then enters `ShuttingDown` — no new connections are accepted, in-flight
//! ones get the configured grace period, and whatever remains afterwards is
//! aborted.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::serve::handler::StaticHandler;

/// Short-response closure for connections beyond the concurrency bound.
const OVERLOAD_RESPONSE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

pub struct Server {
    config: Config,
    listener: TcpListener,
    handler: Arc<StaticHandler>,
}

impl Server {
    pub async fn bind(config: Config) -> anyhow::Result<Self> {
        let handler = Arc::new(StaticHandler::new(&config)?);

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.listen_addr))?;

        info!(
            addr = %listener.local_addr()?,
            root = %handler.root().display(),
            "listening"
        );

        Ok(Self {
            config,
            listener,
            handler,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` resolves, one task per
    /// connection so a slow client never blocks the others.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_connections));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (mut socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&permits).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!(%peer, "connection limit reached, refusing");
                            tokio::spawn(async move {
                                let _ = socket.write_all(OVERLOAD_RESPONSE).await;
                            });
                            continue;
                        }
                    };

                    debug!(%peer, "accepted connection");
                    let conn = Connection::new(
                        socket,
                        Arc::clone(&self.handler),
                        &self.config,
                        shutdown_rx.clone(),
                    );
                    tasks.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = conn.run().await {
                            debug!(%peer, error = %e, "connection error");
                        }
                    });
                }

                // Reap finished connection tasks as we go
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

                _ = &mut shutdown => break,
            }
        }

        info!("shutdown signal received, draining connections");
        let _ = shutdown_tx.send(true);
        drop(self.listener);

        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.config.shutdown_grace(), drain).await.is_err() {
            warn!(
                remaining = tasks.len(),
                "grace period elapsed, aborting remaining connections"
            );
            tasks.shutdown().await;
        }

        info!("server stopped");
        Ok(())
    }
}
