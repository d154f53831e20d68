//! Shared fixture: a `MemoryBus` shaped like a connman daemon

#![allow(dead_code)]

use anyhow::{bail, Result};
use connoxide::{Connman, ConnmanBuilder};
use connoxide_bus::{CallError, MemoryBus, MethodError};
use connoxide_proto::names::{interface, method, signal};
use connoxide_proto::{ObjectPath, PropertyMap, Value};
use std::fmt;
use std::sync::{Arc, Mutex, Once, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// How long a test waits for the loop thread to catch up
pub const TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();
static ERRORS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Records every `error!` message for later assertions
struct ErrorLog;

impl<S: Subscriber> Layer<S> for ErrorLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = Message::default();
        event.record(&mut message);
        ERRORS.lock().unwrap().push(message.0);
    }
}

#[derive(Default)]
struct Message(String);

impl Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Install a test-writer subscriber once per process, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(EnvFilter::from_default_env()),
            )
            .with(ErrorLog.with_filter(LevelFilter::ERROR))
            .try_init();
    });
}

/// Error messages logged so far that mention `needle`
pub fn logged_errors(needle: &str) -> Vec<String> {
    ERRORS
        .lock()
        .unwrap()
        .iter()
        .filter(|message| message.contains(needle))
        .cloned()
        .collect()
}

/// `PropertyChanged` match rules the client holds for `path`
pub fn property_rules(bus: &MemoryBus, path: &ObjectPath) -> usize {
    bus.match_rules()
        .iter()
        .filter(|rule| rule.path.as_ref() == Some(path) && rule.member == signal::PROPERTY_CHANGED)
        .count()
}

/// Poll `predicate` until it holds or the timeout passes
pub fn wait_until<F: FnMut() -> bool>(what: &str, mut predicate: F) -> Result<()> {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if predicate() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(5));
    }
    bail!("timed out waiting for {}", what)
}

pub fn service_path(name: &str) -> ObjectPath {
    ObjectPath::new(format!("/net/connman/service/{}", name)).expect("valid service path")
}

pub fn technology_path(name: &str) -> ObjectPath {
    ObjectPath::new(format!("/net/connman/technology/{}", name)).expect("valid technology path")
}

/// Last path element, for readable assertions
pub fn short(path: &ObjectPath) -> String {
    path.as_str().rsplit('/').next().unwrap_or_default().to_string()
}

pub fn wifi(name: &str, strength: u8) -> PropertyMap {
    PropertyMap::new()
        .with("Name", name)
        .with("Type", "wifi")
        .with("State", "idle")
        .with("Strength", strength)
        .with("Security", Value::string_array(["psk"]))
}

/// A fake daemon with ordered service and technology lists
pub struct Daemon {
    pub bus: Arc<MemoryBus>,
    services: Arc<Mutex<Vec<ObjectPath>>>,
    technologies: Arc<Mutex<Vec<ObjectPath>>>,
}

impl Daemon {
    pub fn new() -> Self {
        init_tracing();
        let bus = Arc::new(MemoryBus::default());
        let root = ObjectPath::root();
        bus.add_object(
            root.clone(),
            interface::MANAGER,
            PropertyMap::new().with("State", "idle").with("OfflineMode", false),
        );
        bus.add_object(
            root,
            interface::CLOCK,
            PropertyMap::new()
                .with("Time", 1_700_000_000u64)
                .with("TimeUpdates", "auto")
                .with("Timezone", "Europe/Rome")
                .with("TimezoneUpdates", "auto")
                .with("Timeservers", Value::string_array(["pool.ntp.org"])),
        );

        let daemon = Self {
            bus,
            services: Arc::new(Mutex::new(Vec::new())),
            technologies: Arc::new(Mutex::new(Vec::new())),
        };
        daemon.install_handlers();
        daemon
    }

    fn install_handlers(&self) {
        let weak = Arc::downgrade(&self.bus);
        let order = Arc::clone(&self.services);
        self.bus.on_method(interface::MANAGER, method::GET_SERVICES, move |_, _| {
            list(&weak, &order, interface::SERVICE)
        });

        let weak = Arc::downgrade(&self.bus);
        let order = Arc::clone(&self.technologies);
        self.bus.on_method(interface::MANAGER, method::GET_TECHNOLOGIES, move |_, _| {
            list(&weak, &order, interface::TECHNOLOGY)
        });

        for member in [method::REGISTER_AGENT, method::UNREGISTER_AGENT] {
            self.bus.on_method(interface::MANAGER, member, |_, args| match args.first() {
                Some(Value::ObjectPath(_)) => Ok(Value::unit()),
                _ => Err(MethodError::InvalidArgs("expected (o)".to_string()).into()),
            });
        }

        for (member, state) in [(method::CONNECT, "ready"), (method::DISCONNECT, "idle")] {
            let weak = Arc::downgrade(&self.bus);
            self.bus.on_method(interface::SERVICE, member, move |call, _| {
                let bus = weak.upgrade().ok_or(CallError::Disconnected)?;
                bus.set_property_silently(&call.path, interface::SERVICE, "State", Value::str(state));
                bus.emit_signal(
                    &call.path,
                    interface::SERVICE,
                    signal::PROPERTY_CHANGED,
                    vec![Value::str("State"), Value::str(state)],
                )
                .map_err(|_| CallError::Disconnected)?;
                Ok(Value::unit())
            });
        }

        self.bus.on_method(interface::SERVICE, method::REMOVE, |_, _| Ok(Value::unit()));
        self.bus.on_method(interface::TECHNOLOGY, method::SCAN, |_, _| Ok(Value::unit()));
    }

    /// Add a service at the end of the daemon's list without signalling
    pub fn add_service(&self, name: &str, props: PropertyMap) -> ObjectPath {
        let path = service_path(name);
        self.bus.add_object(path.clone(), interface::SERVICE, props);
        self.services.lock().unwrap().push(path.clone());
        path
    }

    /// Add a technology without signalling
    pub fn add_technology(&self, name: &str, props: PropertyMap) -> ObjectPath {
        let path = technology_path(name);
        self.bus.add_object(path.clone(), interface::TECHNOLOGY, props);
        self.technologies.lock().unwrap().push(path.clone());
        path
    }

    /// Drop a service from the daemon's list without signalling
    pub fn forget_service(&self, name: &str) {
        let path = service_path(name);
        self.services.lock().unwrap().retain(|p| *p != path);
        self.bus.remove_object(&path);
    }

    /// Emit `ServicesChanged` and apply it to the daemon's own table
    pub fn services_changed(&self, changed: &[(&str, PropertyMap)], removed: &[&str]) -> Result<()> {
        let mut entries = Vec::new();
        let mut order = Vec::new();
        for (name, delta) in changed {
            let path = service_path(name);
            let mut props = self.bus.properties(&path, interface::SERVICE).unwrap_or_default();
            props.merge(delta);
            self.bus.add_object(path.clone(), interface::SERVICE, props);
            entries.push(Value::Struct(vec![Value::ObjectPath(path.clone()), Value::Dict(delta.clone())]));
            order.retain(|p| *p != path);
            order.push(path);
        }

        let removed: Vec<ObjectPath> = removed.iter().map(|name| service_path(name)).collect();
        for path in &removed {
            self.bus.remove_object(path);
        }
        *self.services.lock().unwrap() = order;

        self.bus.emit_signal(
            &ObjectPath::root(),
            interface::MANAGER,
            signal::SERVICES_CHANGED,
            vec![
                Value::Array(entries),
                Value::Array(removed.into_iter().map(Value::ObjectPath).collect()),
            ],
        )?;
        Ok(())
    }

    pub fn technology_added(&self, name: &str, props: PropertyMap) -> Result<ObjectPath> {
        let path = self.add_technology(name, props.clone());
        self.bus.emit_signal(
            &ObjectPath::root(),
            interface::MANAGER,
            signal::TECHNOLOGY_ADDED,
            vec![Value::ObjectPath(path.clone()), Value::Dict(props)],
        )?;
        Ok(path)
    }

    pub fn technology_removed(&self, name: &str) -> Result<()> {
        let path = technology_path(name);
        self.technologies.lock().unwrap().retain(|p| *p != path);
        self.bus.remove_object(&path);
        self.bus.emit_signal(
            &ObjectPath::root(),
            interface::MANAGER,
            signal::TECHNOLOGY_REMOVED,
            vec![Value::ObjectPath(path)],
        )?;
        Ok(())
    }

    /// Emit `PropertyChanged` for one object
    pub fn property_changed(&self, path: &ObjectPath, iface: &str, name: &str, value: Value) -> Result<()> {
        self.bus.set_property_silently(path, iface, name, value.clone());
        self.bus
            .emit_signal(path, iface, signal::PROPERTY_CHANGED, vec![Value::str(name), value])?;
        Ok(())
    }

    pub fn builder(&self) -> ConnmanBuilder {
        ConnmanBuilder::new().with_thread_name("connoxide-test-loop")
    }

    /// Connect with defaults and wait for the initial lists to arrive
    pub fn connect(&self) -> Result<Connman> {
        self.connect_with(self.builder())
    }

    pub fn connect_with(&self, builder: ConnmanBuilder) -> Result<Connman> {
        let connman = builder.connect(self.bus.clone())?;
        let services = self.services.lock().unwrap().len();
        let technologies = self.technologies.lock().unwrap().len();
        let manager = connman.manager().clone();
        wait_until("initial lists", || {
            manager.services().len() == services && manager.technologies().len() == technologies
        })?;
        wait_until("initial fetches", || connman.handle().pending_calls() == 0)?;
        Ok(connman)
    }
}

fn list(bus: &Weak<MemoryBus>, order: &Mutex<Vec<ObjectPath>>, iface: &str) -> Result<Value, CallError> {
    let bus = bus.upgrade().ok_or(CallError::Disconnected)?;
    let order = order.lock().unwrap().clone();
    let entries = order
        .into_iter()
        .map(|path| {
            let props = bus.properties(&path, iface).unwrap_or_default();
            Value::Struct(vec![Value::ObjectPath(path), Value::Dict(props)])
        })
        .collect();
    Ok(Value::Array(entries))
}
