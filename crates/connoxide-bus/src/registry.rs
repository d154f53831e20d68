//! One-shot continuation registry
//!
//! Each proxy owns a [`CallbackRegistry`]. A dispatched call registers its
//! continuation and carries the returned [`CallToken`]; the completion path
//! hands the token back to [`CallbackRegistry::complete`], which removes the
//! continuation and runs it outside the lock.

use crate::pending::lock;
use crate::UnknownToken;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, warn};

/// Identifies one outstanding call within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(u64);

impl CallToken {
    /// Raw token value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A boxed one-shot continuation
pub type Continuation<A> = Box<dyn FnOnce(A) + Send + 'static>;

struct Entries<A> {
    next: u64,
    slots: HashMap<CallToken, Continuation<A>>,
}

/// Token-keyed store of one-shot continuations
pub struct CallbackRegistry<A> {
    owner: String,
    entries: Mutex<Entries<A>>,
}

impl<A> CallbackRegistry<A> {
    /// Create an empty registry; `owner` names it in log lines
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Mutex::new(Entries {
                next: 1,
                slots: HashMap::new(),
            }),
        }
    }

    /// Store a continuation and allocate its token.
    ///
    /// Fire-and-forget calls pass `None` and get no token.
    pub fn register(&self, continuation: Option<Continuation<A>>) -> Option<CallToken> {
        let continuation = continuation?;
        let mut entries = lock(&self.entries);
        let token = CallToken(entries.next);
        entries.next += 1;
        entries.slots.insert(token, continuation);
        drop(entries);

        debug!("{}: registered continuation {}", self.owner, token);
        Some(token)
    }

    /// Run and drop the continuation for `token`.
    ///
    /// The continuation runs after the lock is released, so it may register
    /// further calls on this registry.
    pub fn complete(&self, token: Option<CallToken>, arg: A) -> Result<(), UnknownToken> {
        let Some(token) = token else {
            return Ok(());
        };
        let continuation = lock(&self.entries).slots.remove(&token);

        match continuation {
            Some(continuation) => {
                continuation(arg);
                Ok(())
            }
            None => {
                warn!("{}: completion for unknown token {}", self.owner, token);
                Err(UnknownToken(token))
            }
        }
    }

    /// Number of outstanding continuations
    pub fn len(&self) -> usize {
        lock(&self.entries).slots.len()
    }

    /// True if nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> fmt::Debug for CallbackRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("owner", &self.owner)
            .field("outstanding", &self.len())
            .finish()
    }
}

impl<A> Drop for CallbackRegistry<A> {
    fn drop(&mut self) {
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !entries.slots.is_empty() {
            error!(
                "{}: dropped with {} continuations never completed",
                self.owner,
                entries.slots.len()
            );
        }
    }
}
