//! Agent bridge
//!
//! The daemon calls into the agent when a connection attempt needs input:
//! a passphrase, a hidden network's name, enterprise or WISPr credentials.
//! Each `RequestInput` is classified from its field descriptors and handed
//! to exactly one user callback. Requests nobody answers get an empty
//! dictionary back, so the daemon falls through to its own error handling.
//!
//! Inbound calls run on a blocking worker, not the loop thread, so the
//! callbacks may block while they ask the user.

use crate::proxy::lock;
use crate::Service;
use bytes::Bytes;
use connoxide_bus::{InboundHandler, MethodError};
use connoxide_proto::names::agent as agent_method;
use connoxide_proto::{ObjectPath, Payload, PropertyMap, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Answer to a passphrase request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// The network passphrase
    Passphrase(String),
    /// A WPS PIN; empty for push-button
    Wps(String),
}

/// Answer to a hidden network request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkName {
    /// Printable network name
    Name(String),
    /// Raw SSID bytes
    Ssid(Bytes),
}

/// Answer to a WPA enterprise or challenge-response request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterpriseCredentials {
    /// EAP identity
    pub identity: String,
    /// Passphrase or WPS alternative
    pub credential: Credential,
}

/// Answer to a WISPr login request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WisprCredentials {
    /// Hotspot username
    pub username: String,
    /// Hotspot password
    pub password: String,
}

/// One requested field of a `RequestInput` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, e.g. `Passphrase`
    pub name: String,
    /// Field `Type`, e.g. `psk` or `response`
    pub field_type: String,
    /// Field `Requirement`, e.g. `mandatory` or `alternate`
    pub requirement: String,
}

impl FieldDescriptor {
    fn is(&self, name: &str) -> bool {
        self.name == name
    }

    fn is_mandatory(&self) -> bool {
        self.requirement == "mandatory"
    }
}

/// What a `RequestInput` call asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRequest {
    /// A passphrase alone
    Passphrase,
    /// A passphrase, or WPS instead
    PassphraseOrWps,
    /// The name of a hidden network
    HiddenNetworkName,
    /// Identity plus a challenge response
    ChallengeResponse,
    /// Identity plus passphrase
    WpaEnterprise,
    /// WISPr username and password
    Wispr,
    /// Nothing this agent knows how to answer
    Unknown,
}

/// Parse the `a{sv}` field dictionary of a `RequestInput` call
pub fn parse_fields(fields: &PropertyMap) -> Vec<FieldDescriptor> {
    fields
        .iter()
        .map(|(name, value)| {
            let mut descriptor = FieldDescriptor {
                name: name.clone(),
                ..Default::default()
            };
            match value.as_dict() {
                Ok(details) => {
                    for (key, detail) in details.iter() {
                        let slot = match key.as_str() {
                            "Type" => &mut descriptor.field_type,
                            "Requirement" => &mut descriptor.requirement,
                            _ => continue,
                        };
                        match detail.as_str() {
                            Ok(text) => *slot = text.to_string(),
                            Err(e) => warn!("Field {}.{}: {}", name, key, e),
                        }
                    }
                }
                Err(e) => warn!("Field {}: {}", name, e),
            }
            descriptor
        })
        .collect()
}

/// Classify a request from its fields; the first matching rule wins
pub fn classify(fields: &[FieldDescriptor]) -> InputRequest {
    let passphrase = fields.iter().any(|f| f.is("Passphrase") && f.is_mandatory());
    let wps = fields.iter().any(|f| f.is("WPS"));
    let name = fields.iter().any(|f| f.is("Name"));
    let identity = fields.iter().any(|f| f.is("Identity"));
    let username = fields.iter().any(|f| f.is("Username"));
    let password = fields.iter().any(|f| f.is("Password"));
    let challenge = fields.iter().any(|f| f.is("Passphrase") && f.field_type == "response");

    if passphrase && !wps && !identity {
        InputRequest::Passphrase
    } else if passphrase && wps {
        InputRequest::PassphraseOrWps
    } else if name {
        InputRequest::HiddenNetworkName
    } else if identity && challenge {
        InputRequest::ChallengeResponse
    } else if identity && passphrase {
        InputRequest::WpaEnterprise
    } else if username && password {
        InputRequest::Wispr
    } else {
        InputRequest::Unknown
    }
}

type Resolver = Arc<dyn Fn(&ObjectPath) -> Option<Service> + Send + Sync>;
type Action = Arc<dyn Fn() + Send + Sync>;
type ErrorReport = Arc<dyn Fn(&ObjectPath, &str) + Send + Sync>;
type Responder<R> = Arc<dyn Fn(&Service) -> Option<R> + Send + Sync>;

#[derive(Default)]
struct Slots {
    release: Option<Action>,
    cancel: Option<Action>,
    report_error: Option<ErrorReport>,
    passphrase: Option<Responder<Credential>>,
    hidden_name: Option<Responder<NetworkName>>,
    enterprise: Option<Responder<EnterpriseCredentials>>,
    wispr: Option<Responder<WisprCredentials>>,
}

/// Local `net.connman.Agent` object.
///
/// Every callback slot is optional and can be replaced at any time.
pub struct Agent {
    resolver: Resolver,
    slots: Mutex<Slots>,
}

impl Agent {
    /// Create an agent that looks services up with `resolver`
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&ObjectPath) -> Option<Service> + Send + Sync + 'static,
    {
        Self {
            resolver: Arc::new(resolver),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Called when the daemon unregisters the agent
    pub fn on_release<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        lock(&self.slots).release = Some(Arc::new(callback));
    }

    /// Called when the daemon cancels an outstanding request
    pub fn on_cancel<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        lock(&self.slots).cancel = Some(Arc::new(callback));
    }

    /// Called with the service path and error name of a failed connection
    pub fn on_report_error<F: Fn(&ObjectPath, &str) + Send + Sync + 'static>(&self, callback: F) {
        lock(&self.slots).report_error = Some(Arc::new(callback));
    }

    /// Answers passphrase requests, with or without a WPS alternative
    pub fn on_request_passphrase<F>(&self, callback: F)
    where
        F: Fn(&Service) -> Option<Credential> + Send + Sync + 'static,
    {
        lock(&self.slots).passphrase = Some(Arc::new(callback));
    }

    /// Answers hidden network name requests
    pub fn on_request_hidden_name<F>(&self, callback: F)
    where
        F: Fn(&Service) -> Option<NetworkName> + Send + Sync + 'static,
    {
        lock(&self.slots).hidden_name = Some(Arc::new(callback));
    }

    /// Answers WPA enterprise and challenge-response requests
    pub fn on_request_enterprise<F>(&self, callback: F)
    where
        F: Fn(&Service) -> Option<EnterpriseCredentials> + Send + Sync + 'static,
    {
        lock(&self.slots).enterprise = Some(Arc::new(callback));
    }

    /// Answers WISPr login requests
    pub fn on_request_wispr<F>(&self, callback: F)
    where
        F: Fn(&Service) -> Option<WisprCredentials> + Send + Sync + 'static,
    {
        lock(&self.slots).wispr = Some(Arc::new(callback));
    }

    /// Build the reply to `RequestInput(service, fields)`
    pub fn request_input(&self, service: &ObjectPath, fields: &PropertyMap) -> PropertyMap {
        let Some(proxy) = (*self.resolver)(service) else {
            warn!("Input requested for unknown service {}", service);
            return PropertyMap::new();
        };

        let request = classify(&parse_fields(fields));
        debug!("Input request {:?} for {}", request, service);

        let reply = self.respond(request, &proxy);
        if reply.is_empty() {
            info!("Input request {:?} for {} left unanswered", request, service);
        }
        reply
    }

    fn respond(&self, request: InputRequest, service: &Service) -> PropertyMap {
        let mut reply = PropertyMap::new();
        match request {
            InputRequest::Passphrase => {
                if let Some(answer) = self.ask(|s| s.passphrase.clone(), service) {
                    let (Credential::Passphrase(text) | Credential::Wps(text)) = answer;
                    reply.insert("Passphrase", text);
                }
            }
            InputRequest::PassphraseOrWps => {
                if let Some(answer) = self.ask(|s| s.passphrase.clone(), service) {
                    insert_credential(&mut reply, answer);
                }
            }
            InputRequest::HiddenNetworkName => {
                if let Some(answer) = self.ask(|s| s.hidden_name.clone(), service) {
                    match answer {
                        NetworkName::Name(name) => reply.insert("Name", name),
                        NetworkName::Ssid(ssid) => reply.insert("SSID", Value::Bytes(ssid)),
                    };
                }
            }
            InputRequest::ChallengeResponse | InputRequest::WpaEnterprise => {
                if let Some(answer) = self.ask(|s| s.enterprise.clone(), service) {
                    reply.insert("Identity", answer.identity);
                    insert_credential(&mut reply, answer.credential);
                }
            }
            InputRequest::Wispr => {
                if let Some(answer) = self.ask(|s| s.wispr.clone(), service) {
                    reply.insert("Username", answer.username);
                    reply.insert("Password", answer.password);
                }
            }
            InputRequest::Unknown => {}
        }
        reply
    }

    /// Run one responder slot outside the slot lock
    fn ask<R>(&self, slot: impl FnOnce(&Slots) -> Option<Responder<R>>, service: &Service) -> Option<R> {
        let responder = {
            let slots = lock(&self.slots);
            slot(&slots)
        };
        match responder {
            Some(responder) => (*responder)(service),
            None => {
                debug!("No callback registered for this request");
                None
            }
        }
    }

    fn release(&self) {
        info!("Agent released by daemon");
        let callback = lock(&self.slots).release.clone();
        if let Some(callback) = callback {
            (*callback)();
        }
    }

    fn cancel(&self) {
        info!("Agent request cancelled by daemon");
        let callback = lock(&self.slots).cancel.clone();
        if let Some(callback) = callback {
            (*callback)();
        }
    }

    fn report_error(&self, service: &ObjectPath, error: &str) {
        warn!("Daemon reported error {} for {}", error, service);
        let callback = lock(&self.slots).report_error.clone();
        if let Some(callback) = callback {
            (*callback)(service, error);
        }
    }
}

fn insert_credential(reply: &mut PropertyMap, credential: Credential) {
    match credential {
        Credential::Passphrase(passphrase) => reply.insert("Passphrase", passphrase),
        Credential::Wps(pin) => reply.insert("WPS", pin),
    };
}

impl InboundHandler for Agent {
    fn handle(&self, member: &str, body: &Payload) -> Result<Payload, MethodError> {
        match member {
            agent_method::REQUEST_INPUT => {
                let args = body.decode_args(2)?;
                let service = args[0].as_object_path()?;
                let fields = args[1].as_dict()?;
                let reply = self.request_input(service, fields);
                Ok(Payload::encode(&Value::Dict(reply))?)
            }
            agent_method::REPORT_ERROR => {
                let args = body.decode_args(2)?;
                self.report_error(args[0].as_object_path()?, args[1].as_str()?);
                Ok(Payload::unit())
            }
            agent_method::RELEASE => {
                self.release();
                Ok(Payload::unit())
            }
            agent_method::CANCEL => {
                self.cancel();
                Ok(Payload::unit())
            }
            other => Err(MethodError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").finish_non_exhaustive()
    }
}
