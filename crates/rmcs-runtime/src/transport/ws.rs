use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use rmcs_core::{Result, RmcsError};

use super::{Connection, Connector, Frame, FrameSink, FrameStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections with client-side keepalive pings.
#[derive(Debug, Clone)]
pub struct WsConnector {
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl WsConnector {
    pub fn new(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            ping_interval,
            ping_timeout,
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(20), Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        info!(url = %url, "opening websocket connection");
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RmcsError::Transport(format!("connect to {url} failed: {e}")))?;

        let (write, read) = socket.split();
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(writer_task(write, rx));

        let sink = Arc::new(WsSink { tx: tx.clone() });
        let stream = WsStream {
            read,
            tx,
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
            next_ping: Instant::now() + self.ping_interval,
            pong_deadline: None,
        };
        Ok(Connection {
            sink,
            stream: Box::new(stream),
        })
    }
}

enum WriterCommand {
    Send {
        message: Message,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Close {
        ack: oneshot::Sender<Result<()>>,
    },
}

/// Sole owner of the socket's write half. Every sender hands frames to it.
async fn writer_task(mut write: SplitSink<Socket, Message>, mut rx: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send { message, ack } => {
                let result = write.send(message).await.map_err(map_ws_error);
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                } else if let Err(e) = result {
                    debug!(error = %e, "unacknowledged websocket write failed");
                }
            }
            WriterCommand::Close { ack } => {
                let result = write.close().await.map_err(map_ws_error);
                let _ = ack.send(result);
                break;
            }
        }
    }
    debug!("websocket writer exiting");
}

fn map_ws_error(e: tungstenite::Error) -> RmcsError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            RmcsError::ConnectionClosed
        }
        other => RmcsError::Transport(other.to_string()),
    }
}

struct WsSink {
    tx: mpsc::Sender<WriterCommand>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&self, text: String) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriterCommand::Send {
                message: Message::Text(text.into()),
                ack: Some(ack),
            })
            .await
            .map_err(|_| RmcsError::ConnectionClosed)?;
        done.await.map_err(|_| RmcsError::ConnectionClosed)?
    }

    async fn close(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterCommand::Close { ack }).await.is_err() {
            return Ok(());
        }
        match done.await {
            Ok(Err(RmcsError::ConnectionClosed)) | Err(_) => Ok(()),
            Ok(other) => other,
        }
    }
}

struct WsStream {
    read: SplitStream<Socket>,
    tx: mpsc::Sender<WriterCommand>,
    ping_interval: Duration,
    ping_timeout: Duration,
    next_ping: Instant,
    /// Set while a keepalive ping is outstanding.
    pong_deadline: Option<Instant>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let ping_due = tokio::time::sleep_until(self.next_ping);
            let pong_due = tokio::time::sleep_until(self.pong_deadline.unwrap_or(self.next_ping));
            let awaiting_pong = self.pong_deadline.is_some();

            tokio::select! {
                msg = self.read.next() => match msg {
                    None => return None,
                    Some(Err(e)) => {
                        return match map_ws_error(e) {
                            RmcsError::ConnectionClosed => None,
                            other => Some(Err(other)),
                        };
                    }
                    Some(Ok(Message::Text(text))) => return Some(Ok(Frame::Text(text.to_string()))),
                    Some(Ok(Message::Binary(bytes))) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                    Some(Ok(Message::Pong(_))) => {
                        self.pong_deadline = None;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the websocket");
                        return None;
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                },
                _ = ping_due, if !awaiting_pong => {
                    let ping = WriterCommand::Send {
                        message: Message::Ping(Vec::new().into()),
                        ack: None,
                    };
                    if self.tx.try_send(ping).is_err() {
                        warn!("could not queue keepalive ping");
                    }
                    self.pong_deadline = Some(Instant::now() + self.ping_timeout);
                    self.next_ping = Instant::now() + self.ping_interval;
                },
                _ = pong_due, if awaiting_pong => {
                    warn!(timeout = ?self.ping_timeout, "keepalive ping timed out");
                    return Some(Err(RmcsError::Transport("keepalive ping timed out".into())));
                },
            }
        }
    }
}
