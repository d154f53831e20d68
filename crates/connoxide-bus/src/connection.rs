//! Connection owner and cloneable handle
//!
//! A [`Connection`] owns the dispatch thread. It performs the transport
//! handshake on the caller's thread, so a failed handshake leaves nothing
//! running. Everything else talks to the loop through a [`ConnectionHandle`],
//! which is cheap to clone and safe to use from any thread.

use crate::event_loop::{Command, EventLoop, OnComplete};
use crate::pending::{lock, LoopControl};
use crate::transport::{BusEvent, InboundHandler, MethodCall, Signal, SignalMatch, Transport};
use crate::{CallError, LoopStats, TransportError};
use connoxide_proto::names::{self, method};
use connoxide_proto::{ObjectPath, Payload, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bus name of the remote daemon
    pub destination: String,
    /// Object introspected during the handshake
    pub path: ObjectPath,
    /// Name of the dispatch thread
    pub thread_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            destination: names::SERVICE.to_string(),
            path: ObjectPath::root(),
            thread_name: "connoxide-loop".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Set the destination bus name
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Set the handshake object path
    pub fn with_path(mut self, path: ObjectPath) -> Self {
        self.path = path;
        self
    }

    /// Set the dispatch thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Identifies one signal subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Signal handler invoked on the loop thread
pub(crate) type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync + 'static>;

pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) rule: SignalMatch,
    pub(crate) handler: SignalHandler,
}

#[derive(Clone)]
pub(crate) struct InboundEntry {
    pub(crate) interface: String,
    pub(crate) handler: Arc<dyn InboundHandler>,
}

/// State shared between handles and the loop thread
pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) destination: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) control: Arc<LoopControl>,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) subscriptions: Mutex<Vec<Subscription>>,
    pub(crate) inbound: Mutex<HashMap<ObjectPath, InboundEntry>>,
    next_subscription: AtomicU64,
}

/// Everything the loop thread needs, held until `start`
struct Launch {
    runtime: Runtime,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<BusEvent>,
}

/// Owner of one bus session and its dispatch thread.
///
/// Dropping the connection stops it: the drop blocks until every pending
/// call has completed, then joins the thread.
pub struct Connection {
    handle: ConnectionHandle,
    thread_name: String,
    launch: Mutex<Option<Launch>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    loop_thread: Mutex<Option<ThreadId>>,
}

impl Connection {
    /// Perform the handshake and start the dispatch loop.
    ///
    /// Blocks the calling thread for the handshake, so it must not be called
    /// from inside an async runtime.
    pub fn open(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Result<Self, TransportError> {
        let connection = Self::handshake(transport, config)?;
        connection.start()?;
        Ok(connection)
    }

    /// Perform the handshake without starting the loop
    pub fn handshake(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        info!("Connecting to {} at {}", config.destination, config.path);
        let events = runtime
            .block_on(transport.handshake(&config.destination, &config.path))
            .map_err(|e| {
                warn!("Handshake with {} failed: {}", config.destination, e);
                e
            })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            destination: config.destination,
            transport,
            control: LoopControl::new(),
            commands: command_tx,
            subscriptions: Mutex::new(Vec::new()),
            inbound: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        });
        debug!("Handshake complete for connection {}", shared.id);

        Ok(Self {
            handle: ConnectionHandle { shared },
            thread_name: config.thread_name,
            launch: Mutex::new(Some(Launch {
                runtime,
                commands: command_rx,
                events,
            })),
            thread: Mutex::new(None),
            loop_thread: Mutex::new(None),
        })
    }

    /// Spawn the dispatch thread if it is not running yet.
    ///
    /// Returns once the thread exists; calls made before the loop marker runs
    /// are queued.
    pub fn start(&self) -> Result<(), TransportError> {
        let Some(launch) = lock(&self.launch).take() else {
            return Ok(());
        };

        let shared = Arc::clone(&self.handle.shared);
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let _exit = ExitGuard(Arc::clone(&shared.control));
                let Launch { runtime, commands, events } = launch;
                EventLoop::new(shared, commands, events).run(runtime);
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                error!("Failed to spawn dispatch thread: {}", e);
                self.handle.shared.control.mark_exited();
                return Err(e.into());
            }
        };

        info!("Connection {} started", self.handle.id());
        *lock(&self.loop_thread) = Some(thread.thread().id());
        *lock(&self.thread) = Some(thread);
        Ok(())
    }

    /// Stop the loop once all pending calls complete and join the thread.
    ///
    /// Idempotent. Every caller returns only after the loop has exited; a
    /// concurrent caller waits for the one joining the thread. Does not wait
    /// when called from the loop thread itself.
    pub fn stop(&self) {
        let unstarted = lock(&self.launch).take();
        if let Some(Launch { mut commands, .. }) = unstarted {
            commands.close();
            while let Ok(command) = commands.try_recv() {
                command.abandon();
            }
            self.handle.shared.control.mark_exited();
            return;
        }

        let control = &self.handle.shared.control;
        let on_loop_thread = *lock(&self.loop_thread) == Some(thread::current().id());
        let thread = lock(&self.thread).take();

        control.wait_started();
        let pending = control.request_stop();

        if on_loop_thread {
            warn!("Connection {} stopped from its own loop thread; not joining", self.handle.id());
            return;
        }
        let Some(thread) = thread else {
            debug!("Connection {} stop in progress elsewhere; waiting for exit", self.handle.id());
            control.wait_exited();
            return;
        };

        info!("Stopping connection {} with {} pending calls", self.handle.id(), pending);
        if thread.join().is_err() {
            error!("Dispatch thread of connection {} panicked", self.handle.id());
        }
        info!("Connection {} stopped", self.handle.id());
    }

    /// A handle for issuing calls and subscriptions
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Connection identifier
    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// True while the loop is running and accepting work
    pub fn is_running(&self) -> bool {
        self.handle.shared.control.is_running()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.handle.id())
            .field("thread_name", &self.thread_name)
            .field("stats", &self.handle.stats())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Releases waiters however the loop thread ends
struct ExitGuard(Arc<LoopControl>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Dispatch loop panicked");
        }
        self.0.mark_exited();
    }
}

/// Cloneable handle to a running connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Connection identifier
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Bus name of the remote daemon
    pub fn destination(&self) -> &str {
        &self.shared.destination
    }

    /// False once the loop has exited
    pub fn is_open(&self) -> bool {
        !self.shared.control.has_exited() && !self.shared.commands.is_closed()
    }

    /// Pending-call counters
    pub fn stats(&self) -> LoopStats {
        self.shared.control.stats()
    }

    /// Number of outstanding calls and inbound requests
    pub fn pending_calls(&self) -> usize {
        self.stats().pending
    }

    /// Dispatch one method call.
    ///
    /// The call counts as pending from this moment until `on_complete` has
    /// returned on the loop thread. If the loop is gone, `on_complete` runs
    /// immediately on this thread with [`CallError::Disconnected`].
    pub fn call_async<F>(&self, call: MethodCall, on_complete: F)
    where
        F: FnOnce(Result<Payload, CallError>) + Send + 'static,
    {
        let guard = self.shared.control.track();
        let on_complete: OnComplete = Box::new(on_complete);
        if let Err(mpsc::error::SendError(command)) = self.shared.commands.send(Command::Call {
            call,
            on_complete,
            guard,
        }) {
            command.abandon();
        }
    }

    /// Dispatch `interface.member(args...)` on `path` at the connection's destination
    pub fn call_method<F>(&self, path: &ObjectPath, interface: &str, member: &str, args: Vec<Value>, on_complete: F)
    where
        F: FnOnce(Result<Payload, CallError>) + Send + 'static,
    {
        let body = match Payload::encode(&Value::Struct(args)) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode arguments for {}.{}: {}", interface, member, e);
                on_complete(Err(CallError::Protocol(e)));
                return;
            }
        };
        self.call_async(
            MethodCall {
                destination: self.shared.destination.clone(),
                path: path.clone(),
                interface: interface.to_string(),
                member: member.to_string(),
                body,
            },
            on_complete,
        );
    }

    /// Dispatch `SetProperty(name, value)` on `path`
    pub fn set_property_async<F>(&self, path: &ObjectPath, interface: &str, name: &str, value: Value, on_complete: F)
    where
        F: FnOnce(Result<Payload, CallError>) + Send + 'static,
    {
        self.call_method(
            path,
            interface,
            method::SET_PROPERTY,
            vec![Value::str(name), value],
            on_complete,
        );
    }

    /// Invoke `handler` on the loop thread for every signal matching `rule`
    pub fn subscribe<F>(&self, rule: SignalMatch, handler: F) -> SubscriptionId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.shared.subscriptions).push(Subscription {
            id,
            rule: rule.clone(),
            handler: Arc::new(handler),
        });
        debug!("Subscribed {:?} to {}.{}", id, rule.interface, rule.member);

        if self.shared.commands.send(Command::AddMatch(rule)).is_err() {
            debug!("Match rule not installed: loop not running");
        }
        id
    }

    /// Remove a subscription and its bus-side rule; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscriptions = lock(&self.shared.subscriptions);
            let index = subscriptions.iter().position(|s| s.id == id);
            index.map(|i| subscriptions.remove(i))
        };
        let Some(subscription) = removed else {
            return false;
        };
        debug!("Unsubscribed {:?}", id);

        if self.shared.commands.send(Command::RemoveMatch(subscription.rule)).is_err() {
            debug!("Match rule not withdrawn: loop not running");
        }
        true
    }

    /// Export a local object so the remote side can call into it
    pub fn register_inbound_handler(&self, path: ObjectPath, interface: &str, handler: Arc<dyn InboundHandler>) {
        lock(&self.shared.inbound).insert(
            path.clone(),
            InboundEntry {
                interface: interface.to_string(),
                handler,
            },
        );
        info!("Exported {} at {}", interface, path);

        let command = Command::Export {
            path,
            interface: interface.to_string(),
        };
        if self.shared.commands.send(command).is_err() {
            debug!("Export not announced: loop not running");
        }
    }

    /// Withdraw a local object; returns whether it was exported
    pub fn unregister_inbound_handler(&self, path: &ObjectPath) -> bool {
        let Some(entry) = lock(&self.shared.inbound).remove(path) else {
            return false;
        };
        let command = Command::Unexport {
            path: path.clone(),
            interface: entry.interface,
        };
        if self.shared.commands.send(command).is_err() {
            debug!("Unexport not announced: loop not running");
        }
        true
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("destination", &self.shared.destination)
            .finish()
    }
}
