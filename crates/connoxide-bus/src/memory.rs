//! In-memory transport
//!
//! [`MemoryBus`] plays the remote daemon inside the test process. It keeps a
//! table of objects with per-interface property dictionaries and answers
//! `GetProperties` / `SetProperty` itself; any other method needs a handler
//! installed with [`MemoryBus::on_method`].

use crate::pending::lock;
use crate::transport::{BusEvent, InboundCall, MethodCall, Signal, SignalMatch, Transport};
use crate::{CallError, MethodError, TransportError};
use async_trait::async_trait;
use connoxide_proto::names::{self, method, signal};
use connoxide_proto::{ObjectPath, Payload, PropertyMap, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Custom method implementation
pub type MethodHandler = Arc<dyn Fn(&MethodCall, Vec<Value>) -> Result<Value, CallError> + Send + Sync>;

/// An in-process bus hosting one fake daemon
pub struct MemoryBus {
    name: String,
    objects: Mutex<HashMap<ObjectPath, HashMap<String, PropertyMap>>>,
    handlers: Mutex<HashMap<(String, String), MethodHandler>>,
    events: Mutex<Option<mpsc::UnboundedSender<BusEvent>>>,
    gate: watch::Sender<bool>,
    reachable: AtomicBool,
    call_count: AtomicUsize,
    calls: Mutex<Vec<MethodCall>>,
    match_rules: Mutex<Vec<SignalMatch>>,
    exported: Mutex<Vec<(ObjectPath, String)>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(names::SERVICE)
    }
}

impl MemoryBus {
    /// Create a bus whose daemon owns `name`, with an empty root object
    pub fn new(name: impl Into<String>) -> Self {
        let (gate, _) = watch::channel(false);
        let mut objects = HashMap::new();
        objects.insert(ObjectPath::root(), HashMap::new());
        Self {
            name: name.into(),
            objects: Mutex::new(objects),
            handlers: Mutex::new(HashMap::new()),
            events: Mutex::new(None),
            gate,
            reachable: AtomicBool::new(true),
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            match_rules: Mutex::new(Vec::new()),
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Create or replace the properties of `interface` on `path`
    pub fn add_object(&self, path: ObjectPath, interface: &str, props: PropertyMap) {
        lock(&self.objects)
            .entry(path)
            .or_default()
            .insert(interface.to_string(), props);
    }

    /// Remove an object and all its interfaces
    pub fn remove_object(&self, path: &ObjectPath) -> bool {
        lock(&self.objects).remove(path).is_some()
    }

    /// Current properties of `interface` on `path`
    pub fn properties(&self, path: &ObjectPath, interface: &str) -> Option<PropertyMap> {
        lock(&self.objects).get(path)?.get(interface).cloned()
    }

    /// Change a property without emitting a signal
    pub fn set_property_silently(&self, path: &ObjectPath, interface: &str, name: &str, value: Value) {
        lock(&self.objects)
            .entry(path.clone())
            .or_default()
            .entry(interface.to_string())
            .or_default()
            .insert(name, value);
    }

    /// Install a handler for `interface.member`, replacing built-in behavior
    pub fn on_method<F>(&self, interface: &str, member: &str, handler: F)
    where
        F: Fn(&MethodCall, Vec<Value>) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        lock(&self.handlers).insert((interface.to_string(), member.to_string()), Arc::new(handler));
    }

    /// Emit a signal to the connected client
    pub fn emit_signal(
        &self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<(), TransportError> {
        let body = Payload::encode(&Value::Struct(args))?;
        self.push(BusEvent::Signal(Signal {
            path: path.clone(),
            interface: interface.to_string(),
            member: member.to_string(),
            body,
        }))
    }

    /// Call a method on an object exported by the client and wait for the reply.
    ///
    /// Blocks the calling thread; use it from test threads, not from async code.
    pub fn call_inbound(
        &self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, MethodError> {
        let body = Payload::encode(&Value::Struct(args))?;
        let (reply, reply_rx) = oneshot::channel();
        let event = BusEvent::MethodCall(InboundCall {
            path: path.clone(),
            interface: interface.to_string(),
            member: member.to_string(),
            body,
            reply,
        });
        if self.push(event).is_err() {
            return Err(MethodError::NoReply);
        }

        let payload = reply_rx.blocking_recv().map_err(|_| MethodError::NoReply)??;
        Ok(payload.decode()?)
    }

    /// Hold every subsequent call until [`MemoryBus::release_calls`]
    pub fn hold_calls(&self) {
        self.gate.send_replace(true);
    }

    /// Let held calls complete
    pub fn release_calls(&self) {
        self.gate.send_replace(false);
    }

    /// Make the next handshake fail to reach the bus
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of method calls received
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Method calls received, in arrival order
    pub fn calls(&self) -> Vec<MethodCall> {
        lock(&self.calls).clone()
    }

    /// Calls received for `member`
    pub fn calls_to(&self, member: &str) -> Vec<MethodCall> {
        lock(&self.calls).iter().filter(|c| c.member == member).cloned().collect()
    }

    /// Match rules installed by the client
    pub fn match_rules(&self) -> Vec<SignalMatch> {
        lock(&self.match_rules).clone()
    }

    /// Objects exported by the client
    pub fn exported(&self) -> Vec<(ObjectPath, String)> {
        lock(&self.exported).clone()
    }

    fn push(&self, event: BusEvent) -> Result<(), TransportError> {
        let events = lock(&self.events);
        let sender = events.as_ref().ok_or(TransportError::Closed)?;
        sender.send(event).map_err(|_| TransportError::Closed)
    }

    fn get_properties(&self, call: &MethodCall) -> Result<Value, CallError> {
        self.properties(&call.path, &call.interface)
            .map(Value::Dict)
            .ok_or_else(|| MethodError::UnknownObject(call.path.to_string()).into())
    }

    fn set_property(&self, call: &MethodCall, args: Vec<Value>) -> Result<Value, CallError> {
        let [name, value]: [Value; 2] = args
            .try_into()
            .map_err(|_| CallError::from(MethodError::InvalidArgs("expected (s, v)".to_string())))?;
        let name = name.as_str()?.to_string();

        {
            let mut objects = lock(&self.objects);
            let props = objects
                .get_mut(&call.path)
                .and_then(|o| o.get_mut(&call.interface))
                .ok_or_else(|| CallError::from(MethodError::UnknownObject(call.path.to_string())))?;
            props.insert(name.as_str(), value.clone());
        }

        if let Err(e) = self.emit_signal(
            &call.path,
            &call.interface,
            signal::PROPERTY_CHANGED,
            vec![Value::Str(name), value],
        ) {
            warn!("PropertyChanged not delivered: {}", e);
        }
        Ok(Value::unit())
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn handshake(
        &self,
        destination: &str,
        path: &ObjectPath,
    ) -> Result<mpsc::UnboundedReceiver<BusEvent>, TransportError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("memory bus unreachable".to_string()));
        }
        if destination != self.name {
            return Err(TransportError::Handshake(format!("name {} has no owner", destination)));
        }
        if !lock(&self.objects).contains_key(path) {
            return Err(TransportError::Handshake(format!("introspection of {} failed", path)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.events) = Some(tx);
        debug!("Memory bus handshake on {} {}", destination, path);
        Ok(rx)
    }

    async fn call(&self, call: MethodCall) -> Result<Payload, CallError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.calls).push(call.clone());

        let mut gate = self.gate.subscribe();
        let released = gate.wait_for(|held| !*held).await.is_ok();
        if !released {
            return Err(CallError::Disconnected);
        }

        let args = match call.body.decode()? {
            Value::Struct(args) => args,
            other => vec![other],
        };

        let handler = lock(&self.handlers)
            .get(&(call.interface.clone(), call.member.clone()))
            .cloned();
        let reply = match handler {
            Some(handler) => (*handler)(&call, args)?,
            None => match call.member.as_str() {
                method::GET_PROPERTIES => self.get_properties(&call)?,
                method::SET_PROPERTY => self.set_property(&call, args)?,
                other => {
                    return Err(MethodError::UnknownMethod(format!("{}.{}", call.interface, other)).into())
                }
            },
        };
        Ok(Payload::encode(&reply)?)
    }

    async fn add_match(&self, rule: SignalMatch) -> Result<(), TransportError> {
        lock(&self.match_rules).push(rule);
        Ok(())
    }

    async fn remove_match(&self, rule: SignalMatch) -> Result<(), TransportError> {
        let mut rules = lock(&self.match_rules);
        match rules.iter().position(|r| *r == rule) {
            Some(index) => {
                rules.remove(index);
                Ok(())
            }
            None => Err(TransportError::Connection(format!(
                "no match rule for {}.{}",
                rule.interface, rule.member
            ))),
        }
    }

    async fn export(&self, path: &ObjectPath, interface: &str) -> Result<(), TransportError> {
        lock(&self.exported).push((path.clone(), interface.to_string()));
        Ok(())
    }

    async fn unexport(&self, path: &ObjectPath, interface: &str) -> Result<(), TransportError> {
        lock(&self.exported).retain(|(p, i)| !(p == path && i == interface));
        Ok(())
    }
}
