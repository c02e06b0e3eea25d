use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{instrument, warn};

use junction_core::Error;
use junction_task::PeriodicTask;

use crate::allocator::PortAllocator;
use crate::handler::ConnectionHandler;
use crate::socket_factory::SocketFactory;
use crate::stream_settings::StreamSettings;
use crate::worker::{bind, BindAddress, BoundSocket, TcpWorker, UdpWorker, UnixWorker};

enum Worker {
    /// Wrapped in its own lock, separate from the registry lock, since
    /// this is the one variant `rotate_handler` ever swaps out from
    /// under a running accept loop.
    Tcp(Mutex<TcpWorker>),
    Udp(UdpWorker),
    Unix(UnixWorker),
}

/// Everything a dynamic (port-rotating) TCP inbound needs to rebind
/// itself to a new port on a schedule without the caller's involvement.
struct RotationState {
    host: IpAddr,
    pool: Arc<PortAllocator>,
    connection_handler: Arc<dyn ConnectionHandler>,
    settings: StreamSettings,
    refresh: Duration,
    current_port: Mutex<u16>,
    /// Set once the handler is registered and a manager exists to weak-
    /// reference from the periodic closure; `None` only during the brief
    /// window between bind and registration.
    periodic: Mutex<Option<PeriodicTask>>,
}

/// One running inbound: its tag, the worker accepting on it, and, when
/// the receiver was configured to rotate, the state needed to rebind it
/// to a new port on a schedule.
pub struct InboundHandler {
    pub tag: String,
    worker: Worker,
    rotation: Option<RotationState>,
}

impl InboundHandler {
    pub async fn close(&self) {
        if let Some(rotation) = &self.rotation {
            if let Some(periodic) = rotation.periodic.lock().take() {
                periodic.close().await;
            }
        }
        match &self.worker {
            Worker::Tcp(w) => w.lock().close(),
            Worker::Unix(w) => w.close(),
            Worker::Udp(w) => w.close().await,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.rotation.is_some()
    }

    pub fn current_port(&self) -> Option<u16> {
        self.rotation.as_ref().map(|r| *r.current_port.lock())
    }
}

/// A tag-indexed registry of running inbound handlers, mirroring the
/// outbound manager's shape (the teacher's `app/inbound` plus `leaf`'s
/// `app::outbound::manager` registry style).
pub struct InboundManager {
    factory: Arc<dyn SocketFactory>,
    handlers: Mutex<HashMap<String, Arc<InboundHandler>>>,
}

impl InboundManager {
    pub fn new(factory: Arc<dyn SocketFactory>) -> Self {
        Self {
            factory,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Starts an always-on inbound listening at a fixed address.
    #[instrument(skip(self, handler), fields(tag = %tag))]
    pub async fn add_handler(
        &self,
        tag: impl Into<String> + std::fmt::Display,
        addr: BindAddress,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<(), Error> {
        let tag = tag.into();
        if self.handlers.lock().contains_key(&tag) {
            return Err(Error::DuplicateTag(tag));
        }
        let tcp_settings = match &addr {
            BindAddress::Tcp(_, settings) => settings.clone(),
            _ => StreamSettings::default(),
        };
        let bound = bind(self.factory.as_ref(), &addr).await?;
        let worker = match bound {
            BoundSocket::Tcp(listener) => {
                Worker::Tcp(Mutex::new(TcpWorker::spawn_with_settings(listener, tag.clone(), handler, tcp_settings)))
            }
            BoundSocket::Udp(socket) => Worker::Udp(UdpWorker::spawn(
                socket,
                tag.clone(),
                handler,
                true,
                Duration::from_secs(60),
                Duration::from_secs(120),
            )),
            BoundSocket::Unix(listener) => Worker::Unix(UnixWorker::spawn(listener, tag.clone(), handler)),
        };
        self.handlers.lock().insert(
            tag.clone(),
            Arc::new(InboundHandler {
                tag,
                worker,
                rotation: None,
            }),
        );
        Ok(())
    }

    /// Starts a dynamic inbound: its TCP port is drawn from `pool`, and
    /// every `refresh` interval a background task re-picks a fresh port
    /// from the same pool, binds a new listener there, and atomically
    /// swaps it in. The displaced listener keeps draining its in-flight
    /// connections and is only closed (and its port released back to
    /// `pool`) after `2 * refresh` has passed, so a client mid-handshake
    /// on the old port isn't cut off the moment the new one goes live.
    ///
    /// Requires the manager to be held as an `Arc` since the rotation
    /// task needs to call back into it on a schedule.
    pub async fn add_dynamic_tcp_handler(
        self: Arc<Self>,
        tag: impl Into<String>,
        host: IpAddr,
        pool: Arc<PortAllocator>,
        handler: Arc<dyn ConnectionHandler>,
        refresh: Duration,
    ) -> Result<u16, Error> {
        self.add_dynamic_tcp_handler_with_settings(tag, host, pool, handler, refresh, StreamSettings::default())
            .await
    }

    pub async fn add_dynamic_tcp_handler_with_settings(
        self: Arc<Self>,
        tag: impl Into<String>,
        host: IpAddr,
        pool: Arc<PortAllocator>,
        handler: Arc<dyn ConnectionHandler>,
        refresh: Duration,
        settings: StreamSettings,
    ) -> Result<u16, Error> {
        let tag = tag.into();
        if self.handlers.lock().contains_key(&tag) {
            return Err(Error::DuplicateTag(tag));
        }
        let port = pool.allocate()?;
        let addr = BindAddress::Tcp((host, port).into(), settings.clone());
        let bound = bind(self.factory.as_ref(), &addr).await?;
        let BoundSocket::Tcp(listener) = bound else {
            unreachable!("BindAddress::Tcp always yields BoundSocket::Tcp");
        };
        let worker = Worker::Tcp(Mutex::new(TcpWorker::spawn_with_settings(
            listener,
            tag.clone(),
            handler.clone(),
            settings.clone(),
        )));
        let rotation = RotationState {
            host,
            pool,
            connection_handler: handler,
            settings,
            refresh,
            current_port: Mutex::new(port),
            periodic: Mutex::new(None),
        };
        let inbound_handler = Arc::new(InboundHandler {
            tag: tag.clone(),
            worker,
            rotation: Some(rotation),
        });
        self.handlers.lock().insert(tag.clone(), inbound_handler.clone());

        let weak_self = Arc::downgrade(&self);
        let rotate_tag = tag.clone();
        let periodic = PeriodicTask::spawn("dynamic_inbound_rotation", refresh, move || {
            let weak_self = weak_self.clone();
            let tag = rotate_tag.clone();
            async move {
                let Some(manager) = weak_self.upgrade() else { return };
                if let Err(e) = manager.rotate_handler(&tag).await {
                    warn!(inbound = %tag, error = %e, "dynamic inbound rotation failed");
                }
            }
        });
        *inbound_handler
            .rotation
            .as_ref()
            .expect("just constructed with Some(rotation)")
            .periodic
            .lock() = Some(periodic);

        Ok(port)
    }

    /// Re-picks a port for a dynamic inbound and atomically swaps its
    /// listener, returning the new port. The old listener is left
    /// running and is closed (and its port released) after `2 *
    /// refresh`. Errors if `tag` doesn't name a dynamic inbound.
    pub async fn rotate_handler(self: Arc<Self>, tag: &str) -> Result<u16, Error> {
        let handler = self
            .handlers
            .lock()
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no such inbound: {tag}")))?;
        let Worker::Tcp(tcp_slot) = &handler.worker else {
            return Err(Error::Other(format!("inbound {tag} is not a tcp handler")));
        };
        let Some(rotation) = &handler.rotation else {
            return Err(Error::Other(format!("inbound {tag} is not dynamic")));
        };

        let new_port = rotation.pool.allocate()?;
        let addr = BindAddress::Tcp((rotation.host, new_port).into(), rotation.settings.clone());
        let bound = bind(self.factory.as_ref(), &addr).await?;
        let BoundSocket::Tcp(listener) = bound else {
            unreachable!("BindAddress::Tcp always yields BoundSocket::Tcp");
        };
        let new_worker = TcpWorker::spawn_with_settings(
            listener,
            tag.to_string(),
            rotation.connection_handler.clone(),
            rotation.settings.clone(),
        );
        let old_worker = std::mem::replace(&mut *tcp_slot.lock(), new_worker);

        let old_port = {
            let mut current = rotation.current_port.lock();
            std::mem::replace(&mut *current, new_port)
        };
        let pool = rotation.pool.clone();
        let drain_for = rotation.refresh * 2;
        tokio::spawn(async move {
            tokio::time::sleep(drain_for).await;
            old_worker.close();
            pool.release(old_port);
        });

        Ok(new_port)
    }

    pub async fn remove_handler(&self, tag: &str) -> bool {
        let removed = self.handlers.lock().remove(tag);
        if let Some(handler) = removed {
            handler.close().await;
            true
        } else {
            false
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.handlers.lock().keys().cloned().collect()
    }

    pub fn get(&self, tag: &str) -> Option<Arc<InboundHandler>> {
        self.handlers.lock().get(tag).cloned()
    }

    pub async fn close_all(&self) {
        let handlers: Vec<_> = self.handlers.lock().drain().map(|(_, h)| h).collect();
        for handler in handlers {
            handler.close().await;
        }
    }
}
