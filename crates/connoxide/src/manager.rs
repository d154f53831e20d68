//! The connman manager
//!
//! [`Manager`] owns the canonical service and technology collections. It
//! fills them with `GetServices` / `GetTechnologies` on startup and keeps them
//! current from the `ServicesChanged`, `TechnologyAdded` and
//! `TechnologyRemoved` signals, all of which arrive on the loop thread.

use crate::agent::Agent;
use crate::config::ConnmanConfig;
use crate::proxy::{lock, Completion, SnapshotCallback};
use crate::reconcile::{reconcile_locked, Collection};
use crate::{Proxy, Service, Technology};
use connoxide_bus::{CallbackRegistry, ConnectionHandle, Signal, SignalMatch, SubscriptionId, TransportError};
use connoxide_proto::names::{interface, method, signal};
use connoxide_proto::props::ManagerProperties;
use connoxide_proto::{Entity, ObjectPath, Payload, PropertyMap, ProtocolError, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

type ListCallback<T> = Arc<dyn Fn(&[T]) + Send + Sync + 'static>;

type Entries = Vec<(ObjectPath, PropertyMap)>;

struct ManagerInner {
    proxy: Proxy<ManagerProperties>,
    handle: ConnectionHandle,
    services: Arc<Mutex<Collection<Service>>>,
    technologies: Mutex<Collection<Technology>>,
    on_services: Mutex<Option<ListCallback<Service>>>,
    on_technologies: Mutex<Option<ListCallback<Technology>>>,
    agent: Arc<Agent>,
    agent_path: ObjectPath,
    completions: CallbackRegistry<bool>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// Proxy for `net.connman.Manager` plus the collections it reports.
///
/// Clones share state. The service and technology lists are reconciled in
/// place, so a [`Service`] obtained earlier keeps receiving updates for as
/// long as the daemon keeps reporting its path.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Bind the manager, export the agent and start the initial fetches.
    ///
    /// Returns once everything is dispatched; the collections fill in as the
    /// replies arrive.
    pub fn new(handle: &ConnectionHandle, config: &ConnmanConfig) -> Result<Self, TransportError> {
        let proxy = Proxy::<ManagerProperties>::bind(handle, config.manager_path.clone())?;

        let services: Arc<Mutex<Collection<Service>>> = Arc::new(Mutex::new(Collection::new()));
        let known = Arc::downgrade(&services);
        let agent = Arc::new(Agent::new(move |path| {
            known.upgrade().and_then(|services| lookup(&services, path))
        }));

        let inner = Arc::new(ManagerInner {
            proxy,
            handle: handle.clone(),
            services,
            technologies: Mutex::new(Collection::new()),
            on_services: Mutex::new(None),
            on_technologies: Mutex::new(None),
            agent: Arc::clone(&agent),
            agent_path: config.agent_path.clone(),
            completions: CallbackRegistry::new(format!("manager {}", config.manager_path)),
            subscriptions: Mutex::new(Vec::new()),
        });
        inner.subscribe_all();

        handle.register_inbound_handler(config.agent_path.clone(), interface::AGENT, agent);

        let manager = Self { inner };
        manager.refresh(None);
        manager.refresh_technologies(None);
        manager.refresh_services(None);
        if config.register_agent {
            manager.register_agent(&config.agent_path, None);
        }

        info!("Manager bound at {}", config.manager_path);
        Ok(manager)
    }

    /// Copy of the last known manager properties
    pub fn properties(&self) -> ManagerProperties {
        self.inner.proxy.properties()
    }

    /// The underlying manager proxy
    pub fn proxy(&self) -> &Proxy<ManagerProperties> {
        &self.inner.proxy
    }

    /// Fetch the manager properties again
    pub fn refresh(&self, on_snapshot: Option<SnapshotCallback<ManagerProperties>>) {
        self.inner.proxy.refresh(on_snapshot);
    }

    /// Register the callback run when a manager property changes
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&ManagerProperties) + Send + Sync + 'static,
    {
        self.inner.proxy.on_change(callback);
    }

    /// Services in daemon order
    pub fn services(&self) -> Vec<Service> {
        lock(&self.inner.services).to_vec()
    }

    /// Technologies in daemon order
    pub fn technologies(&self) -> Vec<Technology> {
        lock(&self.inner.technologies).to_vec()
    }

    /// The service at `path`, if the daemon reported one
    pub fn service(&self, path: &ObjectPath) -> Option<Service> {
        lookup(&self.inner.services, path)
    }

    /// The technology at `path`, if the daemon reported one
    pub fn technology(&self, path: &ObjectPath) -> Option<Technology> {
        let technologies = lock(&self.inner.technologies);
        technologies.get(path).cloned()
    }

    /// Register the callback receiving the full service list after each change
    pub fn on_services_changed<F>(&self, callback: F)
    where
        F: Fn(&[Service]) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_services) = Some(Arc::new(callback));
    }

    /// Register the callback receiving the full technology list after each change
    pub fn on_technologies_changed<F>(&self, callback: F)
    where
        F: Fn(&[Technology]) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_technologies) = Some(Arc::new(callback));
    }

    /// The exported agent; set its callbacks to answer input requests
    pub fn agent(&self) -> &Agent {
        &self.inner.agent
    }

    /// Path the agent is exported at
    pub fn agent_path(&self) -> &ObjectPath {
        &self.inner.agent_path
    }

    /// Number of manager-level continuations still waiting
    pub fn outstanding(&self) -> usize {
        self.inner.completions.len() + self.inner.proxy.outstanding()
    }

    /// Switch flight mode on or off
    pub fn set_offline_mode(&self, enabled: bool, completion: Option<Completion>) {
        self.inner.proxy.set_property("OfflineMode", Value::Bool(enabled), completion);
    }

    /// Ask the daemon to use the agent at `path`
    pub fn register_agent(&self, path: &ObjectPath, completion: Option<Completion>) {
        debug!("Registering agent {}", path);
        self.inner
            .proxy
            .dispatch(method::REGISTER_AGENT, vec![Value::ObjectPath(path.clone())], completion);
    }

    /// Ask the daemon to stop using the agent at `path`
    pub fn unregister_agent(&self, path: &ObjectPath, completion: Option<Completion>) {
        debug!("Unregistering agent {}", path);
        self.inner
            .proxy
            .dispatch(method::UNREGISTER_AGENT, vec![Value::ObjectPath(path.clone())], completion);
    }

    /// Replace the service list with a fresh `GetServices` snapshot
    pub fn refresh_services(&self, completion: Option<Completion>) {
        self.inner
            .fetch(method::GET_SERVICES, completion, ManagerInner::replace_services);
    }

    /// Replace the technology list with a fresh `GetTechnologies` snapshot
    pub fn refresh_technologies(&self, completion: Option<Completion>) {
        self.inner
            .fetch(method::GET_TECHNOLOGIES, completion, ManagerInner::replace_technologies);
    }
}

impl ManagerInner {
    fn subscribe_all(self: &Arc<Self>) {
        let path = self.proxy.path().clone();
        let routes: [(&str, fn(&ManagerInner, &Signal)); 3] = [
            (signal::SERVICES_CHANGED, ManagerInner::services_changed),
            (signal::TECHNOLOGY_ADDED, ManagerInner::technology_added),
            (signal::TECHNOLOGY_REMOVED, ManagerInner::technology_removed),
        ];

        let mut ids = Vec::with_capacity(routes.len());
        for (member, route) in routes {
            let weak = Arc::downgrade(self);
            let rule = SignalMatch::new(path.clone(), interface::MANAGER, member);
            ids.push(self.handle.subscribe(rule, move |signal| {
                if let Some(inner) = weak.upgrade() {
                    route(&inner, signal);
                }
            }));
        }
        *lock(&self.subscriptions) = ids;
    }

    /// Call a list method on the manager and hand the decoded entries to `apply`
    fn fetch(self: &Arc<Self>, member: &'static str, completion: Option<Completion>, apply: fn(&ManagerInner, Entries)) {
        let token = self.completions.register(completion);
        let inner = Arc::clone(self);
        self.handle
            .call_method(self.proxy.path(), interface::MANAGER, member, vec![], move |result| {
                let ok = match result.and_then(|payload| Ok(decode_entries(&payload.decode()?)?)) {
                    Ok(entries) => {
                        debug!("{} returned {} entries", member, entries.len());
                        apply(&inner, entries);
                        true
                    }
                    Err(e) => {
                        warn!("{} failed: {}", member, e);
                        false
                    }
                };
                let _ = inner.completions.complete(token, ok);
            });
    }

    fn replace_services(&self, entries: Entries) {
        reconcile_locked(
            &*self.services,
            |services| services.replace_all(entries, factory(&self.handle)),
            |list| announce(&self.on_services, list),
        );
    }

    fn replace_technologies(&self, entries: Entries) {
        reconcile_locked(
            &self.technologies,
            |technologies| technologies.replace_all(entries, factory(&self.handle)),
            |list| announce(&self.on_technologies, list),
        );
    }

    fn services_changed(&self, signal: &Signal) {
        let (changed, removed) = match decode_services_changed(&signal.body) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Malformed ServicesChanged: {}", e);
                return;
            }
        };
        debug!("ServicesChanged: {} changed, {} removed", changed.len(), removed.len());

        reconcile_locked(
            &*self.services,
            |services| services.apply_batch(changed, &removed, factory(&self.handle)),
            |list| announce(&self.on_services, list),
        );
    }

    fn technology_added(&self, signal: &Signal) {
        let decoded = signal.body.decode_args(2).and_then(|args| {
            let path = args[0].as_object_path()?.clone();
            let props = args[1].as_dict()?.clone();
            Ok((path, props))
        });
        let (path, props) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Malformed TechnologyAdded: {}", e);
                return;
            }
        };
        debug!("TechnologyAdded {}", path);

        reconcile_locked(
            &self.technologies,
            |technologies| technologies.add(path, &props, factory(&self.handle)),
            |list| announce(&self.on_technologies, list),
        );
    }

    fn technology_removed(&self, signal: &Signal) {
        let path = match signal
            .body
            .decode_args(1)
            .and_then(|args| Ok(args[0].as_object_path()?.clone()))
        {
            Ok(path) => path,
            Err(e) => {
                warn!("Malformed TechnologyRemoved: {}", e);
                return;
            }
        };
        debug!("TechnologyRemoved {}", path);

        reconcile_locked(
            &self.technologies,
            |technologies| technologies.remove(&path),
            |list| announce(&self.on_technologies, list),
        );
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let ids = std::mem::take(self.subscriptions.get_mut().unwrap_or_else(PoisonError::into_inner));
        for id in ids {
            self.handle.unsubscribe(id);
        }
        self.handle.unregister_inbound_handler(&self.agent_path);
        debug!("Released manager at {}", self.proxy.path());
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("path", self.inner.proxy.path())
            .field("services", &*lock(&self.inner.services))
            .field("technologies", &*lock(&self.inner.technologies))
            .finish()
    }
}

/// Builds proxies for paths a collection has not seen yet
fn factory<P: Entity>(
    handle: &ConnectionHandle,
) -> impl FnMut(&ObjectPath, &PropertyMap) -> Result<Proxy<P>, TransportError> + '_ {
    move |path: &ObjectPath, props: &PropertyMap| Proxy::bind_with(handle, path.clone(), P::from_map(props))
}

fn lookup(services: &Mutex<Collection<Service>>, path: &ObjectPath) -> Option<Service> {
    let services = lock(services);
    services.get(path).cloned()
}

fn announce<T>(slot: &Mutex<Option<ListCallback<T>>>, list: &[T]) {
    let callback = lock(slot).clone();
    if let Some(callback) = callback {
        (*callback)(list);
    }
}

/// Decode `a(oa{sv})`
fn decode_entries(value: &Value) -> Result<Entries, ProtocolError> {
    value
        .as_array()?
        .iter()
        .map(|entry| {
            let path = entry.field(0, "path")?.as_object_path()?.clone();
            let props = entry.field(1, "properties")?.as_dict()?.clone();
            Ok((path, props))
        })
        .collect()
}

/// Decode the `(a(oa{sv}), ao)` body of `ServicesChanged`
fn decode_services_changed(body: &Payload) -> Result<(Entries, Vec<ObjectPath>), ProtocolError> {
    let args = body.decode_args(2)?;
    let changed = decode_entries(&args[0])?;
    let removed = args[1]
        .as_array()?
        .iter()
        .map(|path| path.as_object_path().cloned())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((changed, removed))
}
