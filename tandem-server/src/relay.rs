//! Accepting connections and fanning out frames.
//!
//! One reader task and one writer task per client; the writer owns the
//! WebSocket sink, so concurrent broadcasters can never interleave bytes
//! mid-frame. Inbound frames are routed onto one of two dispatch queues:
//! document sync traffic is kept off the general broadcast path.
//!
//! A write failure evicts the failing client and nothing else; there are
//! no retries and no acknowledgments.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, WebSocketStream};
use uuid::Uuid;

use tandem_wire::Message;

use crate::registry::{ClientHandle, Registry};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on. A bare `:port` binds every interface.
    pub addr: String,
    /// Frames buffered per client before broadcasters block.
    pub outbound_capacity: usize,
    /// Frames buffered per dispatch queue.
    pub dispatch_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            addr: ":8080".to_string(),
            outbound_capacity: 64,
            dispatch_capacity: 256,
        }
    }
}

/// A routed inbound frame, tagged with the connection it came from.
struct Dispatch {
    origin: Uuid,
    message: Message,
}

/// The relay: client table plus the two dispatch queues.
pub struct Relay {
    pub registry: Registry,
    config: RelayConfig,
    general_tx: mpsc::Sender<Dispatch>,
    sync_tx: mpsc::Sender<Dispatch>,
}

/// Bind and serve forever. Only failure to bind (or accept) is fatal.
pub async fn serve(config: RelayConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(normalize_addr(&config.addr)).await?;
    log::info!("relay listening on {}", listener.local_addr()?);
    serve_on(listener, config).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: RelayConfig,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let relay = Relay::start(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        let relay = relay.clone();
        tokio::spawn(async move {
            relay.handle_connection(stream, peer).await;
        });
    }
}

/// `":8080"` is accepted for parity with the usual listen-flag shorthand.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

impl Relay {
    /// Create the relay and spawn its dispatcher tasks.
    pub fn start(config: RelayConfig) -> Arc<Relay> {
        let (general_tx, general_rx) = mpsc::channel(config.dispatch_capacity);
        let (sync_tx, sync_rx) = mpsc::channel(config.dispatch_capacity);
        let relay = Arc::new(Relay {
            registry: Registry::new(),
            config,
            general_tx,
            sync_tx,
        });
        tokio::spawn(dispatch_general(relay.clone(), general_rx));
        tokio::spawn(dispatch_sync(relay.clone(), sync_rx));
        relay
    }

    /// Drive one client connection to completion.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                log::warn!("websocket handshake with {peer} failed: {err}");
                return;
            }
        };
        let (sink, mut inbound) = ws.split();

        let client_id = Uuid::new_v4();
        let site_id = self.registry.mint_site_id();
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);

        tokio::spawn(write_outbound(self.clone(), client_id, sink, rx));
        self.registry
            .add(client_id, ClientHandle::new(site_id, tx.clone()))
            .await;
        log::info!("client {client_id} connected from {peer}, assigned site {site_id}");

        let assignment = Message::SiteId {
            text: site_id.to_string(),
            id: client_id,
        };
        if tx.send(assignment).await.is_err() {
            self.evict(client_id).await;
            return;
        }

        // Bootstrap the joiner from any one existing peer.
        self.send_any_except(Message::DocReq { id: client_id }, client_id)
            .await;
        self.broadcast_users().await;

        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(WsMessage::Text(raw)) => match Message::from_json(raw.as_str()) {
                    // docSync ids name a destination; everything else is
                    // routed by its origin.
                    Ok(message @ Message::DocSync { .. }) => {
                        if self
                            .sync_tx
                            .send(Dispatch {
                                origin: client_id,
                                message,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(message) => {
                        if self
                            .general_tx
                            .send(Dispatch {
                                origin: client_id,
                                message,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => log::warn!("undecodable frame from {client_id}: {err}"),
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    log::warn!("read error from {client_id}: {err}");
                    break;
                }
            }
        }

        self.evict(client_id).await;
    }

    /// Remove a client and tell the rest. Safe to call twice.
    async fn evict(&self, client_id: Uuid) {
        if let Some(handle) = self.registry.remove(client_id).await {
            let name = if handle.username.is_empty() {
                "unnamed client".to_string()
            } else {
                handle.username
            };
            log::info!(
                "removing {name} ({client_id}) from the session, {} relayed so far",
                self.registry.stats().messages_relayed.load(Ordering::Relaxed)
            );
            self.broadcast_users().await;
        }
    }

    /// Queue a fresh `users` list for broadcast.
    async fn broadcast_users(&self) {
        let text = self.registry.usernames().await;
        let _ = self
            .sync_tx
            .send(Dispatch {
                origin: Uuid::nil(),
                message: Message::Users { text },
            })
            .await;
    }

    async fn broadcast_all(&self, message: &Message) {
        let targets = self.registry.senders().await;
        let failed = self.deliver(targets, message).await;
        self.reap(failed).await;
    }

    async fn broadcast_all_except(&self, message: &Message, except: Uuid) {
        let targets = self
            .registry
            .senders()
            .await
            .into_iter()
            .filter(|(id, _)| *id != except)
            .collect();
        let failed = self.deliver(targets, message).await;
        self.reap(failed).await;
    }

    async fn send_one(&self, message: Message, dst: Uuid) {
        match self.registry.sender(dst).await {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    self.reap(vec![dst]).await;
                } else {
                    self.registry
                        .stats()
                        .messages_relayed
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            None => log::warn!("no client {dst} to deliver a frame to"),
        }
    }

    /// Deliver to any single client other than `except`; the first that
    /// accepts wins.
    async fn send_any_except(&self, message: Message, except: Uuid) {
        let targets = self.registry.senders().await;
        let mut failed = Vec::new();
        let mut sent = false;
        for (id, tx) in targets {
            if id == except {
                continue;
            }
            if tx.send(message.clone()).await.is_ok() {
                sent = true;
                break;
            }
            failed.push(id);
        }
        if !sent {
            log::debug!("no peer available to receive {}", message.tag());
        }
        self.reap(failed).await;
    }

    /// Send to each target, collecting the ones whose writer is gone.
    async fn deliver(
        &self,
        targets: Vec<(Uuid, mpsc::Sender<Message>)>,
        message: &Message,
    ) -> Vec<Uuid> {
        let mut failed = Vec::new();
        for (id, tx) in targets {
            if tx.send(message.clone()).await.is_err() {
                failed.push(id);
            } else {
                self.registry
                    .stats()
                    .messages_relayed
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
        failed
    }

    /// Evict unreachable clients and rebroadcast the shrunken users list,
    /// repeating until the broadcast lands everywhere that is left.
    async fn reap(&self, mut failed: Vec<Uuid>) {
        while !failed.is_empty() {
            let mut evicted_any = false;
            for id in std::mem::take(&mut failed) {
                if self.registry.remove(id).await.is_some() {
                    log::info!("evicting unreachable client {id}");
                    evicted_any = true;
                }
            }
            if !evicted_any {
                break;
            }
            let users = Message::Users {
                text: self.registry.usernames().await,
            };
            let targets = self.registry.senders().await;
            failed = self.deliver(targets, &users).await;
        }
    }
}

/// Writer task: the only owner of this client's sink.
///
/// A write failure evicts the client; the eviction drops the table's
/// sender, which ends this task's channel and closes the socket.
async fn write_outbound(
    relay: Arc<Relay>,
    client_id: Uuid,
    mut sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let frame = match message.to_json() {
            Ok(json) => WsMessage::Text(json.into()),
            Err(err) => {
                log::error!("dropping unencodable frame for {client_id}: {err}");
                continue;
            }
        };
        if let Err(err) = sink.send(frame).await {
            log::warn!("write to {client_id} failed: {err}");
            relay.evict(client_id).await;
            return;
        }
    }
    let _ = sink.close().await;
}

/// General traffic: joins and operation fan-out.
async fn dispatch_general(relay: Arc<Relay>, mut rx: mpsc::Receiver<Dispatch>) {
    while let Some(Dispatch { origin, message }) = rx.recv().await {
        match &message {
            Message::Join { username, .. } => {
                log::info!("{username} ({origin}) joined the session");
                relay
                    .registry
                    .update_username(origin, username.clone())
                    .await;
                relay.broadcast_all_except(&message, origin).await;
                relay.broadcast_users().await;
            }
            Message::Operation { operation } => {
                log::debug!(
                    "relaying {:?} at position {} from {origin}",
                    operation.kind,
                    operation.position
                );
                relay.broadcast_all_except(&message, origin).await;
            }
            other => log::warn!("ignoring unexpected {} frame from {origin}", other.tag()),
        }
    }
}

/// Sync traffic: addressed snapshots and users broadcasts.
async fn dispatch_sync(relay: Arc<Relay>, mut rx: mpsc::Receiver<Dispatch>) {
    while let Some(Dispatch { origin, message }) = rx.recv().await {
        match message {
            Message::DocSync { id: Some(dst), .. } => {
                log::info!("forwarding document snapshot from {origin} to {dst}");
                relay.send_one(message, dst).await;
            }
            Message::DocSync { id: None, .. } => {
                log::warn!("document snapshot from {origin} has no destination, dropping");
            }
            Message::Users { .. } => {
                log::debug!("broadcasting users list");
                relay.broadcast_all(&message).await;
            }
            other => log::warn!("unroutable {} frame on the sync queue", other.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_documented_interface() {
        let config = RelayConfig::default();
        assert_eq!(config.addr, ":8080");
        assert_eq!(config.outbound_capacity, 64);
        assert_eq!(config.dispatch_capacity, 256);
    }

    #[test]
    fn bare_port_addresses_bind_every_interface() {
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn start_spawns_an_empty_relay() {
        let relay = Relay::start(RelayConfig::default());
        assert!(relay.registry.is_empty().await);
        assert_eq!(relay.registry.mint_site_id(), 1);
    }
}
