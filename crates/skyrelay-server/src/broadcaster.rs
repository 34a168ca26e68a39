use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use skyrelay_types::RelayError;

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

pub type ConnectionId = u64;

struct Registry {
    next_id: ConnectionId,
    queues: HashMap<ConnectionId, mpsc::UnboundedSender<Bytes>>,
    last_broadcast: Option<Instant>,
}

/// Fans every payload out to all connected clients.
///
/// Each connection has its own unbounded FIFO queue drained by its own task,
/// so a stalled client only grows its own backlog. The registry lock is never
/// held across an await and never taken together with the store lock.
pub struct Broadcaster {
    registry: Mutex<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster {
            registry: Mutex::new(Registry {
                next_id: 1,
                queues: HashMap::new(),
                last_broadcast: None,
            }),
        }
    }

    /// Bind `addr` and spawn the accept loop. Only the bind can fail; once
    /// listening, the loop runs until the returned task is aborted.
    pub async fn listen(self: Arc<Self>, addr: SocketAddr) -> Result<JoinHandle<()>, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "BaseStation listener started");
        Ok(tokio::spawn(self.accept_loop(listener)))
    }

    /// Accept connections on an already-bound listener. Never returns; accept
    /// errors are logged and the loop carries on.
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let (id, queue) = self.subscribe();
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.serve_connection(id, stream, peer, queue).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept BaseStation client");
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            }
        }
    }

    /// Register a new outbound queue. Payloads broadcast from now on are
    /// delivered to it; earlier ones are not replayed.
    pub fn subscribe(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut g = self.registry.lock();
        let id = g.next_id;
        g.next_id += 1;
        g.queues.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ConnectionId) {
        self.registry.lock().queues.remove(&id);
    }

    /// Queue `payload` for every connected client. Returns how many queues
    /// received it. An empty payload still counts as a broadcast for the
    /// keep-alive clock but is not queued.
    pub fn broadcast(&self, payload: Bytes) -> usize {
        let mut g = self.registry.lock();
        g.last_broadcast = Some(Instant::now());
        if payload.is_empty() {
            return 0;
        }
        g.queues
            .values()
            .filter(|tx| tx.send(payload.clone()).is_ok())
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.lock().queues.len()
    }

    /// When `broadcast` was last called, if ever.
    pub fn last_broadcast(&self) -> Option<Instant> {
        self.registry.lock().last_broadcast
    }

    async fn serve_connection(
        self: Arc<Self>,
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        mut queue: mpsc::UnboundedReceiver<Bytes>,
    ) {
        tracing::info!(%peer, connection = id, "client connected");
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();
        let mut discard = [0u8; 512];
        let mut peer_eof = false;

        // Only a failed write ends a connection. A client may half-close and
        // keep reading, so EOF on the read side just stops the reads.
        let reason: String = loop {
            tokio::select! {
                payload = queue.recv() => {
                    let Some(payload) = payload else {
                        break "broadcaster dropped".into();
                    };
                    if let Err(e) = writer.write_all(&payload).await {
                        break e.to_string();
                    }
                }
                read = reader.read(&mut discard), if !peer_eof => match read {
                    Ok(0) => peer_eof = true,
                    Ok(_) => {}
                    Err(e) => break e.to_string(),
                },
            }
        };

        self.unsubscribe(id);
        tracing::info!(%peer, connection = id, %reason, "client disconnected");
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
