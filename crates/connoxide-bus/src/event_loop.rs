//! Background dispatch loop
//!
//! Runs on the connection's own thread inside a current-thread runtime, so
//! every completion, signal handler and reconciliation pass for one
//! connection is serialized on that thread.

use crate::connection::{Shared, Subscription};
use crate::pending::{lock, LoopControl, PendingCall};
use crate::transport::{BusEvent, InboundCall, MethodCall, Signal, SignalMatch};
use crate::{CallError, MethodError};
use connoxide_proto::{ObjectPath, Payload};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Completion of one outbound call
pub(crate) type OnComplete = Box<dyn FnOnce(Result<Payload, CallError>) + Send + 'static>;

/// Work sent from user threads to the loop
pub(crate) enum Command {
    /// Dispatch a method call
    Call {
        call: MethodCall,
        on_complete: OnComplete,
        guard: PendingCall,
    },
    /// Install a match rule on the bus
    AddMatch(SignalMatch),
    /// Withdraw a match rule
    RemoveMatch(SignalMatch),
    /// Announce a local object
    Export { path: ObjectPath, interface: String },
    /// Withdraw a local object
    Unexport { path: ObjectPath, interface: String },
}

impl Command {
    /// Complete a command that never reached the loop
    pub(crate) fn abandon(self) {
        if let Command::Call { call, on_complete, guard } = self {
            debug!("Call {}.{} dropped: loop not running", call.interface, call.member);
            on_complete(Err(CallError::Disconnected));
            drop(guard);
        }
    }
}

/// Loop state owned by the loop thread
pub(crate) struct EventLoop {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<BusEvent>,
    events_open: bool,
}

impl EventLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedReceiver<BusEvent>,
    ) -> Self {
        Self {
            shared,
            commands,
            events,
            events_open: true,
        }
    }

    /// Drive the loop to completion on the current thread
    pub(crate) fn run(self, runtime: Runtime) {
        let id = self.shared.id;
        runtime.block_on(self.dispatch());
        drop(runtime);
        info!("Dispatch loop for connection {} finished", id);
    }

    async fn dispatch(mut self) {
        let control = Arc::clone(&self.shared.control);

        // Marker task: first thing the runtime runs once the loop is polling
        let marker = Arc::clone(&control);
        tokio::spawn(async move { marker.mark_ready() });

        let mut exit = Box::pin(control.exit_requested());

        loop {
            tokio::select! {
                _ = &mut exit => {
                    info!("Dispatch loop exit requested");
                    break;
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }

                event = self.events.recv(), if self.events_open => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!("Transport event stream closed");
                            self.events_open = false;
                        }
                    }
                }
            }
        }

        drop(exit);
        self.shutdown(&control).await;
    }

    async fn shutdown(&mut self, control: &LoopControl) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.abandon();
        }

        // Calls accepted just before the stop request still get their replies
        while control.stats().pending > 0 {
            debug!("Waiting for {} pending calls before exit", control.stats().pending);
            control.exit_requested().await;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Call { call, on_complete, guard } => self.dispatch_call(call, on_complete, guard),
            Command::AddMatch(rule) => {
                let transport = Arc::clone(&self.shared.transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.add_match(rule.clone()).await {
                        warn!("Failed to add match {}.{}: {}", rule.interface, rule.member, e);
                    }
                });
            }
            Command::RemoveMatch(rule) => {
                let transport = Arc::clone(&self.shared.transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.remove_match(rule.clone()).await {
                        warn!("Failed to remove match {}.{}: {}", rule.interface, rule.member, e);
                    }
                });
            }
            Command::Export { path, interface } => {
                let transport = Arc::clone(&self.shared.transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.export(&path, &interface).await {
                        warn!("Failed to export {} on {}: {}", interface, path, e);
                    }
                });
            }
            Command::Unexport { path, interface } => {
                let transport = Arc::clone(&self.shared.transport);
                tokio::spawn(async move {
                    if let Err(e) = transport.unexport(&path, &interface).await {
                        warn!("Failed to unexport {} on {}: {}", interface, path, e);
                    }
                });
            }
        }
    }

    fn dispatch_call(&self, call: MethodCall, on_complete: OnComplete, guard: PendingCall) {
        let transport = Arc::clone(&self.shared.transport);
        tokio::spawn(async move {
            let label = format!("{} {}.{}", call.path, call.interface, call.member);
            debug!("Dispatching {}", label);

            let result = transport.call(call).await;
            match &result {
                Ok(reply) => debug!("Completed {} ({} bytes)", label, reply.len()),
                Err(e) => warn!("Call {} failed: {}", label, e),
            }

            if catch_unwind(AssertUnwindSafe(move || on_complete(result))).is_err() {
                error!("Continuation for {} panicked", label);
            }
            drop(guard);
        });
    }

    fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Signal(signal) => self.route_signal(&signal),
            BusEvent::MethodCall(call) => self.route_inbound(call),
        }
    }

    fn route_signal(&self, signal: &Signal) {
        let handlers: Vec<_> = lock(&self.shared.subscriptions)
            .iter()
            .filter(|s: &&Subscription| s.rule.matches(signal))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        debug!(
            "Signal {}.{} from {} -> {} handlers",
            signal.interface,
            signal.member,
            signal.path,
            handlers.len()
        );
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| (*handler)(signal))).is_err() {
                error!("Handler for {}.{} panicked", signal.interface, signal.member);
            }
        }
    }

    fn route_inbound(&self, call: InboundCall) {
        let InboundCall { path, interface, member, body, reply } = call;
        let entry = lock(&self.shared.inbound).get(&path).cloned();

        let Some(entry) = entry else {
            warn!("Inbound call {}.{} for unknown object {}", interface, member, path);
            let _ = reply.send(Err(MethodError::UnknownObject(path.to_string())));
            return;
        };
        if entry.interface != interface {
            warn!("Inbound call on {} for unexported interface {}", path, interface);
            let _ = reply.send(Err(MethodError::UnknownMethod(format!("{}.{}", interface, member))));
            return;
        }

        debug!("Inbound call {}.{} on {}", interface, member, path);
        let guard = self.shared.control.track();
        tokio::task::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| entry.handler.handle(&member, &body)))
                .unwrap_or_else(|_| {
                    error!("Inbound handler for {} panicked", member);
                    Err(MethodError::Failed(format!("{} handler panicked", member)))
                });
            if reply.send(result).is_err() {
                warn!("Reply to inbound {} undeliverable", member);
            }
            drop(guard);
        });
    }
}
