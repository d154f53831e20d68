//! Generic proxy for one remote object
//!
//! A [`Proxy`] mirrors the properties of one daemon object. Reads come from a
//! cached snapshot and never touch the bus. Writes go out as async calls
//! whose completions, like every property change notification, arrive on
//! the connection's loop thread.

use connoxide_bus::{
    CallError, CallToken, CallbackRegistry, ConnectionHandle, Signal, SignalMatch, SubscriptionId, TransportError,
};
use connoxide_proto::names::{method, signal};
use connoxide_proto::{Entity, EntityKind, ObjectPath, Payload, PropertyMap, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Completion of a mutator; receives true on success
pub type Completion = Box<dyn FnOnce(bool) + Send + 'static>;

/// Receives the snapshot fetched by [`Proxy::refresh`]
pub type SnapshotCallback<P> = Box<dyn FnOnce(&P) + Send + 'static>;

type ChangeCallback<P> = Arc<dyn Fn(&P) + Send + Sync + 'static>;

pub(crate) type CallResult = Result<Payload, CallError>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ProxyInner<P: Entity> {
    path: ObjectPath,
    handle: ConnectionHandle,
    properties: Mutex<P>,
    on_change: Mutex<Option<ChangeCallback<P>>>,
    completions: CallbackRegistry<bool>,
    snapshots: CallbackRegistry<Option<P>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

/// Local stand-in for one remote entity.
///
/// Clones share the same cache; two proxies are equal when their paths are.
pub struct Proxy<P: Entity> {
    inner: Arc<ProxyInner<P>>,
}

impl<P: Entity> Proxy<P> {
    /// Bind a proxy for the object at `path` with an empty snapshot
    pub fn bind(handle: &ConnectionHandle, path: ObjectPath) -> Result<Self, TransportError> {
        Self::bind_with(handle, path, P::default())
    }

    /// Bind a proxy whose cache starts from `initial`
    pub fn bind_with(handle: &ConnectionHandle, path: ObjectPath, initial: P) -> Result<Self, TransportError> {
        if !handle.is_open() {
            return Err(TransportError::Closed);
        }

        let owner = format!("{} {}", P::KIND, path);
        let inner = Arc::new(ProxyInner {
            path: path.clone(),
            handle: handle.clone(),
            properties: Mutex::new(initial),
            on_change: Mutex::new(None),
            completions: CallbackRegistry::new(owner.clone()),
            snapshots: CallbackRegistry::new(owner),
            subscription: Mutex::new(None),
        });

        // The subscription must not keep the proxy alive
        let weak = Arc::downgrade(&inner);
        let rule = SignalMatch::new(path.clone(), P::KIND.interface(), signal::PROPERTY_CHANGED);
        let id = handle.subscribe(rule, move |signal| {
            if let Some(inner) = weak.upgrade() {
                inner.property_changed(signal);
            }
        });
        *lock(&inner.subscription) = Some(id);

        debug!("Bound {} proxy at {}", P::KIND, path);
        Ok(Self { inner })
    }

    /// Object path of the remote entity
    pub fn path(&self) -> &ObjectPath {
        &self.inner.path
    }

    /// Entity kind
    pub fn kind(&self) -> EntityKind {
        P::KIND
    }

    /// Copy of the last known properties
    pub fn properties(&self) -> P {
        lock(&self.inner.properties).clone()
    }

    /// Number of continuations still waiting for their call to complete
    pub fn outstanding(&self) -> usize {
        self.inner.completions.len() + self.inner.snapshots.len()
    }

    /// True if both handles refer to the same cached object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register the callback run on every property change, replacing any previous one.
    ///
    /// Runs on the loop thread and must not block.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_change) = Some(Arc::new(callback));
    }

    /// Fetch all properties and replace the cached snapshot.
    ///
    /// `on_snapshot` receives the new snapshot, then the change callback runs.
    /// A failed fetch keeps the old snapshot and runs neither.
    pub fn refresh(&self, on_snapshot: Option<SnapshotCallback<P>>) {
        let token = self.inner.snapshots.register(on_snapshot.map(|callback| {
            Box::new(move |snapshot: Option<P>| {
                if let Some(snapshot) = snapshot {
                    callback(&snapshot);
                }
            }) as Box<dyn FnOnce(Option<P>) + Send>
        }));

        let inner = Arc::clone(&self.inner);
        self.inner.handle.call_method(
            &self.inner.path,
            P::KIND.interface(),
            method::GET_PROPERTIES,
            vec![],
            move |result| inner.snapshot_received(token, result),
        );
    }

    /// Set one property.
    ///
    /// The cache is not updated from the reply; the change arrives through
    /// the `PropertyChanged` signal, so an immediate read may still see the
    /// old value.
    pub fn set_property(&self, name: &str, value: Value, completion: Option<Completion>) {
        self.dispatch(method::SET_PROPERTY, vec![Value::str(name), value], completion);
    }

    /// Call `member` on this object's interface
    pub(crate) fn dispatch(&self, member: &str, args: Vec<Value>, completion: Option<Completion>) {
        let token = self.inner.completions.register(completion);

        // Holds the proxy alive until the call completes
        let inner = Arc::clone(&self.inner);
        self.inner.handle.call_method(
            &self.inner.path,
            P::KIND.interface(),
            member,
            args,
            move |result| {
                let _ = inner.completions.complete(token, result.is_ok());
            },
        );
    }

    /// Merge a property delta into the cache without running the change callback
    pub(crate) fn merge_silently(&self, delta: &PropertyMap) -> bool {
        if delta.is_empty() {
            return false;
        }
        lock(&self.inner.properties).apply(delta);
        true
    }

    /// Run the change callback with the current snapshot
    pub(crate) fn announce_snapshot(&self) {
        let snapshot = self.properties();
        self.inner.notify(&snapshot);
    }
}

impl<P: Entity> ProxyInner<P> {
    fn snapshot_received(&self, token: Option<CallToken>, result: CallResult) {
        let decoded = result.and_then(|payload| Ok(P::from_map(payload.decode()?.as_dict()?)));
        let snapshot = match decoded {
            Ok(snapshot) => {
                *lock(&self.properties) = snapshot.clone();
                Some(snapshot)
            }
            Err(e) => {
                warn!("GetProperties for {} {} failed: {}", P::KIND, self.path, e);
                None
            }
        };

        let _ = self.snapshots.complete(token, snapshot.clone());
        if let Some(snapshot) = snapshot {
            self.notify(&snapshot);
        }
    }

    fn property_changed(&self, signal: &Signal) {
        let args = match signal.body.decode_args(2) {
            Ok(args) => args,
            Err(e) => {
                warn!("Malformed PropertyChanged from {}: {}", self.path, e);
                return;
            }
        };
        let name = match args[0].as_str() {
            Ok(name) => name,
            Err(e) => {
                warn!("Malformed PropertyChanged from {}: {}", self.path, e);
                return;
            }
        };

        let snapshot = {
            let mut props = lock(&self.properties);
            match props.update(name, &args[1]) {
                Ok(true) => props.clone(),
                Ok(false) => {
                    debug!("Unknown property for {}: {}", P::KIND, name);
                    return;
                }
                Err(e) => {
                    warn!("Skipping property {}.{}: {}", P::KIND, name, e);
                    return;
                }
            }
        };
        debug!("{} {} changed {}", P::KIND, self.path, name);
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &P) {
        let callback = lock(&self.on_change).clone();
        if let Some(callback) = callback {
            (*callback)(snapshot);
        }
    }
}

impl<P: Entity> Drop for ProxyInner<P> {
    fn drop(&mut self) {
        let subscription = self.subscription.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(id) = subscription {
            self.handle.unsubscribe(id);
        }
        debug!("Released {} proxy at {}", P::KIND, self.path);
    }
}

impl<P: Entity> Clone for Proxy<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Entity> PartialEq for Proxy<P> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.path == other.inner.path
    }
}

impl<P: Entity> Eq for Proxy<P> {}

impl<P: Entity> fmt::Debug for Proxy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &P::KIND)
            .field("path", &self.inner.path)
            .finish()
    }
}
