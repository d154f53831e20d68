//! List reconciliation
//!
//! A [`Collection`] mirrors an ordered remote list of objects. Every update
//! reuses the member already cached for a path, so references handed out
//! earlier stay live and see later property changes. Members are only
//! constructed for paths the collection has not seen.
//!
//! Collections do no locking and run no user callbacks. Each operation
//! returns a [`Reconciled`] report; the owner announces the updated members
//! and the new list once its own lock is released.

use crate::proxy::{lock, Proxy};
use connoxide_proto::{Entity, ObjectPath, PropertyMap};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// An element of a [`Collection`]
pub trait Member: Clone {
    /// Identity of the member
    fn path(&self) -> &ObjectPath;

    /// Merge `delta` into the cached properties without notifying anyone.
    ///
    /// Returns whether anything was merged.
    fn merge(&self, delta: &PropertyMap) -> bool;

    /// Tell the member's observers that its properties changed
    fn announce(&self);
}

impl<P: Entity> Member for Proxy<P> {
    fn path(&self) -> &ObjectPath {
        Proxy::path(self)
    }

    fn merge(&self, delta: &PropertyMap) -> bool {
        self.merge_silently(delta)
    }

    fn announce(&self) {
        self.announce_snapshot();
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug)]
pub struct Reconciled<T> {
    /// The list observers should be told about the new contents
    pub notify: bool,
    /// Existing members whose properties were updated in place
    pub updated: Vec<T>,
}

impl<T> Reconciled<T> {
    fn unchanged() -> Self {
        Self {
            notify: false,
            updated: Vec::new(),
        }
    }
}

/// Ordered, deduplicated mirror of a remote list
#[derive(Clone)]
pub struct Collection<T> {
    members: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { members: Vec::new() }
    }
}

impl<T: Member> Collection<T> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Members in order
    pub fn members(&self) -> &[T] {
        &self.members
    }

    /// Owned copy of the members
    pub fn to_vec(&self) -> Vec<T> {
        self.members.clone()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if there are no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member with `path`, if any
    pub fn get(&self, path: &ObjectPath) -> Option<&T> {
        self.members.iter().find(|m| m.path() == path)
    }

    /// Paths in order
    pub fn paths(&self) -> Vec<ObjectPath> {
        self.members.iter().map(|m| m.path().clone()).collect()
    }

    /// Replace the contents with a complete ordered snapshot.
    ///
    /// Members whose paths survive are reused; the rest are dropped.
    pub fn replace_all<F, E>(&mut self, entries: Vec<(ObjectPath, PropertyMap)>, make: F) -> Reconciled<T>
    where
        F: FnMut(&ObjectPath, &PropertyMap) -> Result<T, E>,
        E: fmt::Display,
    {
        self.apply_batch(entries, &[], make)
    }

    /// Add one member, or update it in place if the path is already present.
    ///
    /// A present member keeps its position.
    pub fn add<F, E>(&mut self, path: ObjectPath, props: &PropertyMap, mut make: F) -> Reconciled<T>
    where
        F: FnMut(&ObjectPath, &PropertyMap) -> Result<T, E>,
        E: fmt::Display,
    {
        if let Some(existing) = self.get(&path) {
            debug!("{} already present, updating in place", path);
            let existing = existing.clone();
            let merged = existing.merge(props);
            return Reconciled {
                notify: true,
                updated: if merged { vec![existing] } else { Vec::new() },
            };
        }

        match make(&path, props) {
            Ok(member) => {
                self.members.push(member);
                Reconciled {
                    notify: true,
                    updated: Vec::new(),
                }
            }
            Err(e) => {
                warn!("Skipping new member {}: {}", path, e);
                Reconciled::unchanged()
            }
        }
    }

    /// Remove the member with `path`; notifies only if it was present
    pub fn remove(&mut self, path: &ObjectPath) -> Reconciled<T> {
        let before = self.members.len();
        self.members.retain(|m| m.path() != path);
        Reconciled {
            notify: self.members.len() != before,
            updated: Vec::new(),
        }
    }

    /// Apply a combined reorder, update and prune.
    ///
    /// Paths in `removed` are dropped first. The new order is exactly the
    /// order of `changed`; when a path repeats, its last occurrence wins for
    /// both position and properties. Observers are notified if the result is
    /// non-empty or its paths differ from before.
    pub fn apply_batch<F, E>(
        &mut self,
        changed: Vec<(ObjectPath, PropertyMap)>,
        removed: &[ObjectPath],
        mut make: F,
    ) -> Reconciled<T>
    where
        F: FnMut(&ObjectPath, &PropertyMap) -> Result<T, E>,
        E: fmt::Display,
    {
        let before = self.paths();
        self.members.retain(|m| !removed.contains(m.path()));

        let mut rebuilt = Vec::with_capacity(changed.len());
        let mut updated = Vec::new();
        for (path, delta) in last_occurrences(changed) {
            match self.get(&path) {
                Some(existing) => {
                    let existing = existing.clone();
                    if existing.merge(&delta) {
                        updated.push(existing.clone());
                    }
                    rebuilt.push(existing);
                }
                None => match make(&path, &delta) {
                    Ok(member) => rebuilt.push(member),
                    Err(e) => warn!("Skipping new member {}: {}", path, e),
                },
            }
        }
        self.members = rebuilt;

        let after = self.paths();
        debug!("Reconciled {} -> {} members", before.len(), after.len());
        Reconciled {
            notify: !after.is_empty() || after != before,
            updated,
        }
    }
}

impl<T: Member> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.iter().map(|m| m.path())).finish()
    }
}

/// Keep only the last entry for each path, at that entry's position
fn last_occurrences(entries: Vec<(ObjectPath, PropertyMap)>) -> Vec<(ObjectPath, PropertyMap)> {
    let mut last: HashMap<ObjectPath, usize> = HashMap::with_capacity(entries.len());
    for (i, (path, _)) in entries.iter().enumerate() {
        last.insert(path.clone(), i);
    }
    if last.len() != entries.len() {
        debug!("Batch repeats {} paths", entries.len() - last.len());
    }
    entries
        .into_iter()
        .enumerate()
        .filter(|(i, (path, _))| last.get(path) == Some(i))
        .map(|(_, entry)| entry)
        .collect()
}

/// Hold `mutex` only while `f` reconciles, then announce the outcome.
///
/// Updated members are announced first, then `on_list` receives the new
/// list if observers should be notified.
pub(crate) fn reconcile_locked<T, F>(
    collection: &std::sync::Mutex<Collection<T>>,
    f: F,
    on_list: impl FnOnce(&[T]),
) where
    T: Member,
    F: FnOnce(&mut Collection<T>) -> Reconciled<T>,
{
    let (outcome, members) = {
        let mut collection = lock(collection);
        let outcome = f(&mut collection);
        (outcome, collection.to_vec())
    };
    for member in &outcome.updated {
        member.announce();
    }
    if outcome.notify {
        on_list(&members);
    }
}

#[cfg(test)]
mod tests;
