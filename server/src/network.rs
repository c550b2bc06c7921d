//! Server network layer handling WebSocket connections and the coordinator loop

use crate::articles::ArticleLibrary;
use crate::client_manager::Outbox;
use crate::config::GameConfig;
use crate::session::Session;
use crate::timer::{TimerFired, TokioScheduler};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::PlayerId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from connection tasks to the coordinator loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        outbox: Outbox,
        reply: oneshot::Sender<Option<PlayerId>>,
    },
    Frame {
        id: PlayerId,
        text: String,
    },
    /// Any control frame from the client, used for liveness only
    Heartbeat {
        id: PlayerId,
    },
    Disconnected {
        id: PlayerId,
    },
    Shutdown,
}

/// Quiz server: owns the session and feeds it network and timer events one
/// at a time.
pub struct Server {
    listener: Arc<TcpListener>,
    session: Session<TokioScheduler>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: GameConfig,
        library: ArticleLibrary,
    ) -> Result<Self, BoxError> {
        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            session: Session::new(config, library, TokioScheduler::new(timer_tx)),
            server_tx,
            server_rx,
            timer_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Sender for injecting events, e.g. `ServerEvent::Shutdown`
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.server_tx.clone()
    }

    pub fn session(&self) -> &Session<TokioScheduler> {
        &self.session
    }

    /// Spawns task that accepts connections and starts a task per client
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let server_tx = self.server_tx.clone();
        let config = self.session.config();
        let max_send_queue = config.max_send_queue;
        let ping_interval = config.ping_interval;

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("Accepted TCP connection from {}", addr);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            server_tx.clone(),
                            max_send_queue,
                            ping_interval,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
                if server_tx.is_closed() {
                    break;
                }
            }
        });
    }

    fn handle_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Connected { outbox, reply } => {
                let id = self.session.connect(outbox);
                // The connection task gave up before we answered
                if let Err(Some(id)) = reply.send(id) {
                    self.session.disconnect(&id);
                }
            }
            ServerEvent::Frame { id, text } => self.session.handle_frame(&id, &text),
            ServerEvent::Heartbeat { id } => self.session.heartbeat(&id),
            ServerEvent::Disconnected { id } => self.session.disconnect(&id),
            ServerEvent::Shutdown => return false,
        }
        true
    }

    /// Main server loop. Every session mutation happens here.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_acceptor();

        let mut liveness = interval(self.session.config().ping_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.server_rx.recv() => {
                    let keep_running = match event {
                        Some(event) => self.handle_event(event),
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                Some(fired) = self.timer_rx.recv() => {
                    self.session.on_timer(fired);
                },

                _ = liveness.tick() => {
                    self.session.expire_idle();
                },
            }
        }

        Ok(())
    }
}

/// Drives one WebSocket connection until either side closes it.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    max_send_queue: usize,
    ping_interval: Duration,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (outbox, mut rx) = mpsc::channel::<String>(max_send_queue);
    let (reply_tx, reply_rx) = oneshot::channel();
    if events
        .send(ServerEvent::Connected {
            outbox,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }

    let id = match reply_rx.await {
        Ok(Some(id)) => id,
        _ => {
            info!("Refusing connection from {}", addr);
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    info!("Client {} connected from {}", id, addr);

    // Writer task: forward queued frames to the socket, ping periodically
    let writer = tokio::spawn(async move {
        let mut ping = interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(text) => {
                        if ws_tx.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped the connection
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(result) = ws_rx.next().await {
        let event = match result {
            Ok(Message::Text(text)) => ServerEvent::Frame {
                id: id.clone(),
                text: text.as_str().to_string(),
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => ServerEvent::Heartbeat { id: id.clone() },
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                debug!("Ignoring non-text frame from {}", id);
                continue;
            }
            Err(e) => {
                debug!("Read error from {}: {}", id, e);
                break;
            }
        };
        if events.send(event).is_err() {
            break;
        }
    }

    let _ = events.send(ServerEvent::Disconnected { id });
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ClientMessage, ServerMessage};
    use tokio_tungstenite::connect_async;

    async fn start_server() -> (SocketAddr, mpsc::UnboundedSender<ServerEvent>) {
        let config = GameConfig {
            max_clients: 1,
            ..GameConfig::default()
        };
        let mut server = Server::bind("127.0.0.1:0", config, ArticleLibrary::builtin())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        tokio::spawn(async move { server.run().await });
        (addr, handle)
    }

    #[test]
    fn test_server_event_creation() {
        let id = PlayerId::from("abc123xyz");
        let event = ServerEvent::Frame {
            id: id.clone(),
            text: "{}".to_string(),
        };

        match event {
            ServerEvent::Frame { id: got, text } => {
                assert_eq!(got, id);
                assert_eq!(text, "{}");
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_join_over_websocket() {
        let (addr, handle) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let join = serde_json::to_string(&ClientMessage::Join {
            name: "Ada".to_string(),
        })
        .unwrap();
        ws.send(Message::text(join)).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let message: ServerMessage = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        match message {
            ServerMessage::Joined { players, .. } => assert_eq!(players[0].name, "Ada"),
            other => panic!("expected joined, got {:?}", other),
        }

        handle.send(ServerEvent::Shutdown).unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_when_full() {
        let (addr, handle) = start_server().await;
        let (_first, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let (mut second, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let closed = loop {
            match second.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break true,
                Some(Ok(_)) => continue,
            }
        };
        assert!(closed);

        handle.send(ServerEvent::Shutdown).unwrap();
    }
}
