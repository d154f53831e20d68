//! Technology proxies

use crate::proxy::{lock, Completion, Proxy};
use connoxide_proto::names::method;
use connoxide_proto::props::TechnologyProperties;
use connoxide_proto::Value;
use std::sync::{Arc, Mutex};

/// Proxy for one `net.connman.Technology` object
pub type Technology = Proxy<TechnologyProperties>;

impl Proxy<TechnologyProperties> {
    /// Power the technology on or off
    pub fn set_powered(&self, powered: bool, completion: Option<Completion>) {
        self.set_property("Powered", Value::Bool(powered), completion);
    }

    /// Trigger a scan for services
    pub fn scan(&self, completion: Option<Completion>) {
        self.dispatch(method::SCAN, vec![], completion);
    }

    /// Enable or disable tethering
    pub fn set_tethering(&self, enabled: bool, completion: Option<Completion>) {
        self.set_property("Tethering", Value::Bool(enabled), completion);
    }

    /// Set the tethering identifier and passphrase.
    ///
    /// Both writes go out together; `completion` receives true only if both
    /// succeed.
    pub fn set_tethering_credentials(&self, identifier: &str, passphrase: &str, completion: Option<Completion>) {
        let mut parts: Vec<Option<Completion>> = match completion {
            Some(completion) => join(completion, 2).into_iter().map(Some).collect(),
            None => vec![None, None],
        };
        let second = parts.pop().flatten();
        let first = parts.pop().flatten();
        self.set_property("TetheringIdentifier", Value::str(identifier), first);
        self.set_property("TetheringPassphrase", Value::str(passphrase), second);
    }
}

struct Join {
    remaining: usize,
    ok: bool,
    completion: Option<Completion>,
}

/// Split `completion` into `parts` completions; it runs once all have
fn join(completion: Completion, parts: usize) -> Vec<Completion> {
    let state = Arc::new(Mutex::new(Join {
        remaining: parts,
        ok: true,
        completion: Some(completion),
    }));

    (0..parts)
        .map(|_| {
            let state = Arc::clone(&state);
            Box::new(move |ok: bool| {
                let done = {
                    let mut join = lock(&state);
                    join.ok &= ok;
                    join.remaining -= 1;
                    if join.remaining == 0 {
                        let all = join.ok;
                        join.completion.take().map(|completion| (completion, all))
                    } else {
                        None
                    }
                };
                if let Some((completion, all)) = done {
                    completion(all);
                }
            }) as Completion
        })
        .collect()
}
