//! Unit tests for list reconciliation

use super::*;
use connoxide_proto::Value;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct Fake {
    path: ObjectPath,
    identity: usize,
    props: Arc<Mutex<PropertyMap>>,
    announced: Arc<AtomicUsize>,
}

impl Member for Fake {
    fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn merge(&self, delta: &PropertyMap) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.props.lock().unwrap().merge(delta);
        true
    }

    fn announce(&self) {
        self.announced.fetch_add(1, Ordering::SeqCst);
    }
}

impl Fake {
    fn get(&self, key: &str) -> Option<Value> {
        self.props.lock().unwrap().get(key).cloned()
    }
}

/// Builds members with increasing identities
#[derive(Default)]
struct Factory {
    next: usize,
}

impl Factory {
    fn make(&mut self) -> impl FnMut(&ObjectPath, &PropertyMap) -> Result<Fake, String> + '_ {
        move |path: &ObjectPath, props: &PropertyMap| {
            self.next += 1;
            Ok(Fake {
                path: path.clone(),
                identity: self.next,
                props: Arc::new(Mutex::new(props.clone())),
                announced: Arc::new(AtomicUsize::new(0)),
            })
        }
    }
}

fn path(name: &str) -> ObjectPath {
    ObjectPath::new(format!("/net/connman/service/{}", name)).unwrap()
}

fn delta(key: &str, value: i32) -> PropertyMap {
    PropertyMap::new().with(key, value)
}

fn names(collection: &Collection<Fake>) -> Vec<String> {
    collection
        .paths()
        .iter()
        .map(|p| p.as_str().rsplit('/').next().unwrap_or_default().to_string())
        .collect()
}

fn seeded(factory: &mut Factory, names: &[&str]) -> Collection<Fake> {
    let mut collection = Collection::new();
    let entries = names.iter().map(|n| (path(n), PropertyMap::new())).collect();
    collection.replace_all(entries, factory.make());
    collection
}

#[test]
fn test_batch_reorders_updates_and_prunes() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a", "b", "c"]);
    let c_before = collection.get(&path("c")).unwrap().clone();

    let outcome = collection.apply_batch(
        vec![(path("c"), delta("Strength", 70)), (path("d"), delta("Strength", 40))],
        &[path("b")],
        factory.make(),
    );

    assert!(outcome.notify);
    assert_eq!(names(&collection), vec!["c", "d"]);

    let c = collection.get(&path("c")).unwrap();
    assert_eq!(c.identity, c_before.identity);
    assert!(Arc::ptr_eq(&c.props, &c_before.props));
    assert_eq!(c_before.get("Strength"), Some(Value::Int32(70)));

    let d = collection.get(&path("d")).unwrap();
    assert!(d.identity > 3);
    assert_eq!(d.get("Strength"), Some(Value::Int32(40)));

    assert_eq!(outcome.updated.len(), 1);
    assert_eq!(outcome.updated[0].path, path("c"));
}

#[test]
fn test_full_replace_preserves_identity() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a", "b", "c"]);
    let a = collection.get(&path("a")).unwrap().identity;
    let b = collection.get(&path("b")).unwrap().identity;

    let outcome = collection.replace_all(
        vec![(path("a"), PropertyMap::new()), (path("b"), PropertyMap::new())],
        factory.make(),
    );

    assert!(outcome.notify);
    assert!(outcome.updated.is_empty());
    assert_eq!(names(&collection), vec!["a", "b"]);
    assert_eq!(collection.get(&path("a")).unwrap().identity, a);
    assert_eq!(collection.get(&path("b")).unwrap().identity, b);
    assert_eq!(factory.next, 3);
}

#[test]
fn test_repeated_path_last_occurrence_wins() {
    let mut factory = Factory::default();
    let mut collection = Collection::new();

    collection.apply_batch(
        vec![
            (path("a"), delta("Strength", 10).with("Name", "first")),
            (path("b"), PropertyMap::new()),
            (path("a"), delta("Strength", 90)),
        ],
        &[],
        factory.make(),
    );

    assert_eq!(names(&collection), vec!["b", "a"]);
    let a = collection.get(&path("a")).unwrap();
    assert_eq!(a.get("Strength"), Some(Value::Int32(90)));
    assert_eq!(a.get("Name"), None);
}

#[test]
fn test_property_only_batch_still_takes_batch_order() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a", "b"]);

    let outcome = collection.apply_batch(
        vec![(path("b"), delta("Strength", 5)), (path("a"), PropertyMap::new())],
        &[],
        factory.make(),
    );

    assert!(outcome.notify);
    assert_eq!(names(&collection), vec!["b", "a"]);
    assert_eq!(factory.next, 2);
}

#[test]
fn test_removed_then_listed_is_rebuilt() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a"]);
    let before = collection.get(&path("a")).unwrap().identity;

    collection.apply_batch(vec![(path("a"), PropertyMap::new())], &[path("a")], factory.make());

    assert_ne!(collection.get(&path("a")).unwrap().identity, before);
}

#[test]
fn test_empty_batch_on_empty_collection_is_silent() {
    let mut factory = Factory::default();
    let mut collection: Collection<Fake> = Collection::new();
    let outcome = collection.apply_batch(vec![], &[path("ghost")], factory.make());
    assert!(!outcome.notify);

    let mut collection = seeded(&mut factory, &["a"]);
    let outcome = collection.apply_batch(vec![], &[path("a")], factory.make());
    assert!(outcome.notify);
    assert!(collection.is_empty());
}

#[test]
fn test_add_existing_updates_in_place() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a", "b"]);
    let a = collection.get(&path("a")).unwrap().clone();

    let outcome = collection.add(path("a"), &delta("Strength", 33), factory.make());

    assert!(outcome.notify);
    assert_eq!(outcome.updated.len(), 1);
    assert_eq!(names(&collection), vec!["a", "b"]);
    assert_eq!(a.get("Strength"), Some(Value::Int32(33)));

    let outcome = collection.add(path("c"), &PropertyMap::new(), factory.make());
    assert!(outcome.notify);
    assert!(outcome.updated.is_empty());
    assert_eq!(names(&collection), vec!["a", "b", "c"]);
}

#[test]
fn test_remove_notifies_only_on_change() {
    let mut factory = Factory::default();
    let mut collection = seeded(&mut factory, &["a", "b"]);

    assert!(!collection.remove(&path("z")).notify);
    assert!(collection.remove(&path("a")).notify);
    assert_eq!(names(&collection), vec!["b"]);
}

#[test]
fn test_factory_failure_skips_member() {
    let mut collection: Collection<Fake> = Collection::new();
    let outcome = collection.apply_batch(
        vec![(path("a"), PropertyMap::new())],
        &[],
        |_: &ObjectPath, _: &PropertyMap| Err::<Fake, _>("bus closed"),
    );
    assert!(collection.is_empty());
    assert!(!outcome.notify);

    let outcome = collection.add(path("a"), &PropertyMap::new(), |_: &ObjectPath, _: &PropertyMap| {
        Err::<Fake, _>("bus closed")
    });
    assert!(!outcome.notify);
}

#[test]
fn test_reconcile_locked_announces_after_release() {
    let mut factory = Factory::default();
    let collection = Mutex::new(seeded(&mut factory, &["a"]));
    let seen = Mutex::new(Vec::new());

    reconcile_locked(
        &collection,
        |c| c.apply_batch(vec![(path("a"), delta("Strength", 1))], &[], factory.make()),
        |members| {
            // The collection lock is free again
            let len = collection.lock().unwrap().len();
            seen.lock().unwrap().push((members.len(), len));
        },
    );

    assert_eq!(*seen.lock().unwrap(), vec![(1, 1)]);
    let a = collection.lock().unwrap().get(&path("a")).unwrap().clone();
    assert_eq!(a.announced.load(Ordering::SeqCst), 1);
}

fn pool() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_string)
}

proptest! {
    #[test]
    fn test_batch_order_and_identity(
        initial in prop::collection::btree_set(pool(), 0..6),
        batch in prop::collection::vec(pool(), 0..10),
        removed in prop::collection::btree_set(pool(), 0..4),
    ) {
        let mut factory = Factory::default();
        let initial: Vec<&str> = initial.iter().map(String::as_str).collect();
        let mut collection = seeded(&mut factory, &initial);
        let identities: HashMap<String, usize> = initial
            .iter()
            .map(|n| (n.to_string(), collection.get(&path(n)).unwrap().identity))
            .collect();

        let removed_paths: Vec<ObjectPath> = removed.iter().map(|n| path(n)).collect();
        let entries = batch.iter().map(|n| (path(n), PropertyMap::new())).collect();
        let outcome = collection.apply_batch(entries, &removed_paths, factory.make());

        // Order is the batch order, keeping each path's last occurrence
        let mut expected: Vec<String> = Vec::new();
        for (i, name) in batch.iter().enumerate() {
            if !batch[i + 1..].contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(names(&collection), expected.clone());
        prop_assert_eq!(outcome.notify, !expected.is_empty() || !initial.is_empty());

        for name in &expected {
            let member = collection.get(&path(name)).unwrap();
            match identities.get(name) {
                Some(id) if !removed.contains(name) => prop_assert_eq!(member.identity, *id),
                _ => prop_assert!(member.identity > initial.len()),
            }
        }
    }
}
