use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::parser::{self, Limits, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::serve::handler::StaticHandler;

pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    state: ConnectionState,
    handler: Arc<StaticHandler>,
    limits: Limits,
    read_timeout: Duration,
    response_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing {
        response: Response,
        head_only: bool,
        keep_alive: bool,
    },
    Closed,
}

enum ReadOutcome {
    Request(Request),
    Malformed(ParseError),
    TimedOut,
    Eof,
    Shutdown,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        handler: Arc<StaticHandler>,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Reading,
            handler,
            limits: Limits::new(config.max_header_bytes, config.max_header_count),
            read_timeout: config.read_timeout(),
            response_timeout: config.response_timeout(),
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        ReadOutcome::Request(req) => ConnectionState::Processing(req),
                        ReadOutcome::Malformed(err) => {
                            debug!(error = ?err, "malformed request");
                            ConnectionState::Writing {
                                response: Response::error_page(StatusCode::BadRequest),
                                head_only: false,
                                keep_alive: false,
                            }
                        }
                        ReadOutcome::TimedOut => {
                            debug!("idle read timeout, closing connection");
                            ConnectionState::Closed
                        }
                        ReadOutcome::Eof | ReadOutcome::Shutdown => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(req) => {
                    let head_only = req.method == Method::HEAD;
                    let keep_alive = req.keep_alive() && !*self.shutdown.borrow();

                    let response = self.handler.handle(&req).await;
                    info!(
                        method = ?req.method,
                        target = %req.path,
                        status = response.status.as_u16(),
                        "handled request"
                    );

                    self.state = ConnectionState::Writing {
                        response,
                        head_only,
                        keep_alive,
                    };
                }

                ConnectionState::Writing {
                    response,
                    head_only,
                    keep_alive,
                } => {
                    let writer = ResponseWriter::new(response, head_only);
                    match timeout(self.response_timeout, writer.write_to_stream(&mut self.stream)).await {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!("response write timed out, closing connection");
                            // state is already Closed from the replace above
                            continue;
                        }
                    }

                    self.state = if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            // Try parsing whatever we already have
            match parser::parse_http_request(&self.buffer, &self.limits) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(ReadOutcome::Request(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    return Ok(ReadOutcome::Malformed(e));
                }
            }

            // Read more data, bounded by the idle timeout; an idle
            // keep-alive connection closes as soon as shutdown begins.
            let mut chunk = [0u8; 1024];
            let n = tokio::select! {
                read = timeout(self.read_timeout, self.stream.read(&mut chunk)) => {
                    match read {
                        Ok(result) => result?,
                        Err(_) => return Ok(ReadOutcome::TimedOut),
                    }
                }
                _ = self.shutdown.changed() => {
                    return Ok(ReadOutcome::Shutdown);
                }
            };

            if n == 0 {
                // Client closed connection
                return Ok(ReadOutcome::Eof);
            }

            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
