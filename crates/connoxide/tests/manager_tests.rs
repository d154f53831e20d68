//! Manager startup and collection reconciliation against the fake daemon

mod common;

use anyhow::Result;
use common::*;
use connoxide::{Connman, ConnmanError, Service};
use connoxide_bus::TransportError;
use connoxide_proto::names::{interface, method};
use connoxide_proto::props::ManagerState;
use connoxide_proto::{ObjectPath, PropertyMap, Value};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

fn names(services: &[Service]) -> Vec<String> {
    services.iter().map(|s| short(s.path())).collect()
}

fn seeded(daemon: &Daemon, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        daemon.add_service(name, wifi(name, 10 * (i as u8 + 1)));
    }
}

#[test]
fn test_startup_sequence() -> Result<()> {
    let daemon = Daemon::new();
    seeded(&daemon, &["a", "b"]);
    daemon.add_technology("wifi", PropertyMap::new().with("Name", "WiFi").with("Powered", true));

    let connman = daemon.connect()?;
    let manager = connman.manager();

    assert_eq!(names(&manager.services()), vec!["a", "b"]);
    assert_eq!(manager.services()[1].properties().strength, 20);
    assert!(manager.technologies()[0].properties().powered);
    assert_eq!(manager.properties().state, ManagerState::Idle);
    wait_until("clock snapshot", || connman.clock().properties().timezone == "Europe/Rome")?;

    // Agent exported, then registered by path
    wait_until("agent export", || !daemon.bus.exported().is_empty())?;
    assert_eq!(
        daemon.bus.exported(),
        vec![(manager.agent_path().clone(), interface::AGENT.to_string())]
    );
    let registrations = daemon.bus.calls_to(method::REGISTER_AGENT);
    assert_eq!(registrations.len(), 1);
    assert_eq!(
        registrations[0].body.decode_args(1)?,
        vec![Value::ObjectPath(manager.agent_path().clone())]
    );

    assert_eq!(manager.outstanding(), 0);
    connman.shutdown();
    Ok(())
}

#[test]
fn test_agent_registration_can_be_disabled() -> Result<()> {
    let daemon = Daemon::new();
    let agent_path = ObjectPath::new("/org/example/agent")?;
    let connman = daemon.connect_with(
        daemon
            .builder()
            .with_register_agent(false)
            .with_agent_path(agent_path.clone()),
    )?;

    assert!(daemon.bus.calls_to(method::REGISTER_AGENT).is_empty());
    assert_eq!(connman.manager().agent_path(), &agent_path);

    let (tx, rx) = mpsc::channel();
    connman
        .manager()
        .register_agent(&agent_path, Some(Box::new(move |ok: bool| tx.send(ok).unwrap())));
    assert!(rx.recv_timeout(TIMEOUT)?);
    Ok(())
}

#[test]
fn test_handshake_failure_is_a_connection_error() {
    let daemon = Daemon::new();
    daemon.bus.set_reachable(false);

    let err = Connman::new(daemon.bus.clone()).unwrap_err();
    assert!(matches!(err, ConnmanError::Connection(TransportError::Connection(_))));

    daemon.bus.set_reachable(true);
    let err = daemon
        .builder()
        .with_destination("org.example.nobody")
        .connect(daemon.bus.clone())
        .unwrap_err();
    assert!(matches!(err, ConnmanError::Connection(TransportError::Handshake(_))));
}

#[test]
fn test_batched_change_reorders_updates_and_prunes() -> Result<()> {
    let daemon = Daemon::new();
    seeded(&daemon, &["a", "b", "c"]);
    let connman = daemon.connect()?;
    let manager = connman.manager();

    let c_before = manager.service(&service_path("c")).unwrap();
    let lists = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&lists);
    manager.on_services_changed(move |services| seen.lock().unwrap().push(names(services)));

    daemon.services_changed(
        &[
            ("c", PropertyMap::new().with("Strength", 70u8)),
            ("d", wifi("d", 40)),
        ],
        &["b"],
    )?;
    wait_until("batch announced", || !lists.lock().unwrap().is_empty())?;
    assert_eq!(names(&manager.services()), vec!["c", "d"]);

    let c = manager.service(&service_path("c")).unwrap();
    assert!(c.ptr_eq(&c_before));
    assert_eq!(c_before.properties().strength, 70);
    assert_eq!(c_before.properties().name, "c");

    let d = manager.service(&service_path("d")).unwrap();
    assert_eq!(d.properties().strength, 40);
    assert!(manager.service(&service_path("b")).is_none());

    assert_eq!(*lists.lock().unwrap(), vec![vec!["c".to_string(), "d".to_string()]]);
    Ok(())
}

#[test]
fn test_removed_services_withdraw_their_rules() -> Result<()> {
    let daemon = Daemon::new();
    let connman = daemon.connect()?;
    let manager = connman.manager();
    let baseline = daemon.bus.match_rules().len();
    let temp = service_path("temp");

    for _ in 0..20 {
        daemon.services_changed(&[("temp", wifi("temp", 50))], &[])?;
        wait_until("service listed", || manager.service(&temp).is_some())?;
        daemon.services_changed(&[], &["temp"])?;
        wait_until("service pruned", || manager.services().is_empty())?;
    }

    wait_until("rules back to baseline", || daemon.bus.match_rules().len() == baseline)?;
    assert_eq!(property_rules(&daemon.bus, &temp), 0);
    Ok(())
}

#[test]
fn test_batch_delta_fires_member_on_change() -> Result<()> {
    let daemon = Daemon::new();
    seeded(&daemon, &["a"]);
    let connman = daemon.connect()?;
    let a = connman.manager().service(&service_path("a")).unwrap();

    let (tx, rx) = mpsc::channel();
    a.on_change(move |props| tx.send(props.strength).unwrap());
    daemon.services_changed(&[("a", PropertyMap::new().with("Strength", 99u8))], &[])?;

    assert_eq!(rx.recv_timeout(TIMEOUT)?, 99);
    Ok(())
}

#[test]
fn test_full_refresh_preserves_identity() -> Result<()> {
    let daemon = Daemon::new();
    seeded(&daemon, &["a", "b", "c"]);
    let connman = daemon.connect()?;
    let manager = connman.manager();

    let a = manager.service(&service_path("a")).unwrap();
    let b = manager.service(&service_path("b")).unwrap();
    let lists = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&lists);
    manager.on_services_changed(move |services| seen.lock().unwrap().push(names(services)));

    daemon.forget_service("c");
    let (tx, rx) = mpsc::channel();
    manager.refresh_services(Some(Box::new(move |ok: bool| tx.send(ok).unwrap())));
    assert!(rx.recv_timeout(TIMEOUT)?);

    assert_eq!(*lists.lock().unwrap(), vec![vec!["a".to_string(), "b".to_string()]]);
    let services = manager.services();
    assert!(services[0].ptr_eq(&a));
    assert!(services[1].ptr_eq(&b));
    assert_eq!(manager.outstanding(), 0);
    Ok(())
}

#[test]
fn test_refresh_failure_reports_false() -> Result<()> {
    let daemon = Daemon::new();
    seeded(&daemon, &["a"]);
    let connman = daemon.connect()?;

    daemon.bus.on_method(interface::MANAGER, method::GET_SERVICES, |_, _| {
        Ok(Value::str("not a list"))
    });
    let (tx, rx) = mpsc::channel();
    connman
        .manager()
        .refresh_services(Some(Box::new(move |ok: bool| tx.send(ok).unwrap())));

    assert!(!rx.recv_timeout(TIMEOUT)?);
    assert_eq!(names(&connman.manager().services()), vec!["a"]);
    Ok(())
}

#[test]
fn test_technology_added_and_removed() -> Result<()> {
    let daemon = Daemon::new();
    daemon.add_technology("ethernet", PropertyMap::new().with("Name", "Wired"));
    let connman = daemon.connect()?;
    let manager = connman.manager();

    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    manager.on_technologies_changed(move |_| *counter.lock().unwrap() += 1);

    let wifi = daemon.technology_added("wifi", PropertyMap::new().with("Name", "WiFi").with("Powered", false))?;
    wait_until("technology added", || manager.technology(&wifi).is_some())?;
    assert_eq!(manager.technologies().len(), 2);
    assert_eq!(manager.technology(&wifi).unwrap().properties().name, "WiFi");

    // Unknown path: membership unchanged, no callback
    daemon.technology_removed("bluetooth")?;
    daemon.technology_removed("ethernet")?;
    wait_until("technology removed", || *calls.lock().unwrap() == 2)?;
    assert_eq!(manager.technologies().len(), 1);
    assert!(manager.technology(&technology_path("ethernet")).is_none());
    Ok(())
}

#[test]
fn test_offline_mode_round_trip() -> Result<()> {
    let daemon = Daemon::new();
    let connman = daemon.connect()?;
    let manager = connman.manager();

    let (changed_tx, changed_rx) = mpsc::channel();
    manager.on_change(move |props| changed_tx.send(props.offline_mode).unwrap());

    let (tx, rx) = mpsc::channel();
    manager.set_offline_mode(true, Some(Box::new(move |ok: bool| tx.send(ok).unwrap())));
    assert!(rx.recv_timeout(TIMEOUT)?);
    assert!(changed_rx.recv_timeout(TIMEOUT)?);
    assert!(manager.properties().offline_mode);
    Ok(())
}

#[test]
fn test_agent_answers_through_the_bus() -> Result<()> {
    let daemon = Daemon::new();
    let path = daemon.add_service("home", wifi("home", 80));
    let connman = daemon.connect()?;
    let manager = connman.manager();
    wait_until("agent export", || !daemon.bus.exported().is_empty())?;

    manager.agent().on_request_passphrase(|service| {
        assert_eq!(service.properties().name, "home");
        Some(connoxide::Credential::Passphrase("correct horse".to_string()))
    });

    let fields = PropertyMap::new().with(
        "Passphrase",
        PropertyMap::new().with("Type", "psk").with("Requirement", "mandatory"),
    );
    let reply = daemon.bus.call_inbound(
        manager.agent_path(),
        interface::AGENT,
        connoxide_proto::names::agent::REQUEST_INPUT,
        vec![Value::ObjectPath(path), Value::Dict(fields.clone())],
    )?;
    assert_eq!(reply, Value::Dict(PropertyMap::new().with("Passphrase", "correct horse")));

    // A service the manager has never listed gets an empty answer
    let reply = daemon.bus.call_inbound(
        manager.agent_path(),
        interface::AGENT,
        connoxide_proto::names::agent::REQUEST_INPUT,
        vec![Value::ObjectPath(service_path("elsewhere")), Value::Dict(fields)],
    )?;
    assert_eq!(reply, Value::Dict(PropertyMap::new()));
    Ok(())
}
