use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pylon_wire::read_string;

/// How long a freshly accepted connection gets to present its debug id
/// before the listener gives up on it.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type Registry = Arc<Mutex<HashMap<Uuid, oneshot::Sender<TcpStream>>>>;

/// Rendezvous point between controllers and freshly started targets.
///
/// A controller registers its process GUID *before* the target starts (so
/// the target can never connect first), the bootstrap inside the target
/// dials the listener port and sends the GUID, and the listener hands the
/// socket to the matching controller. One listener serves any number of
/// concurrent controllers; tests can instantiate isolated listeners —
/// there is deliberately no process-wide instance.
pub struct ConnectionListener {
    local_addr: SocketAddr,
    registry: Registry,
    shutdown: CancellationToken,
}

impl ConnectionListener {
    /// Bind on an ephemeral localhost port.
    pub async fn bind() -> io::Result<Self> {
        Self::bind_addr(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await
    }

    pub async fn bind_addr(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(listener, registry.clone(), shutdown.clone()));

        Ok(Self {
            local_addr,
            registry,
            shutdown,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Registered controllers are left in
    /// place; their rendezvous channels simply never resolve.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn register(&self, debug_id: Uuid) -> oneshot::Receiver<TcpStream> {
        let (tx, rx) = oneshot::channel();
        self.registry.lock().insert(debug_id, tx);
        rx
    }

    pub(crate) fn registry(&self) -> Registry {
        self.registry.clone()
    }
}

pub(crate) fn unregister(registry: &Registry, debug_id: Uuid) {
    registry.lock().remove(&debug_id);
}

impl Drop for ConnectionListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, registry: Registry, shutdown: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = listener.accept() => res,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(target = "pylon.debugger", error = %err, "accept failed");
                continue;
            }
        };

        tokio::spawn(handshake(stream, peer, registry.clone()));
    }
}

async fn handshake(mut stream: TcpStream, peer: SocketAddr, registry: Registry) {
    let _ = stream.set_nodelay(true);

    let debug_id = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_string(&mut stream)).await {
        Ok(Ok(id)) => id,
        Ok(Err(err)) => {
            tracing::warn!(target = "pylon.debugger", %peer, error = %err, "bad rendezvous handshake");
            return;
        }
        Err(_) => {
            tracing::warn!(target = "pylon.debugger", %peer, "rendezvous handshake timed out");
            return;
        }
    };

    let Ok(debug_id) = Uuid::parse_str(&debug_id) else {
        tracing::warn!(target = "pylon.debugger", %peer, %debug_id, "malformed debug id");
        return;
    };

    let slot = registry.lock().remove(&debug_id);
    match slot {
        Some(tx) => {
            tracing::debug!(target = "pylon.debugger", %debug_id, %peer, "target connected");
            // The controller may have been closed between register and
            // connect; the socket is simply dropped in that case.
            let _ = tx.send(stream);
        }
        None => {
            tracing::warn!(
                target = "pylon.debugger",
                %debug_id,
                %peer,
                "connection for unknown debug id dropped"
            );
        }
    }
}
