//! Clock proxy

use crate::proxy::{Completion, Proxy};
use connoxide_proto::props::{ClockProperties, UpdatePolicy};
use connoxide_proto::Value;

/// Proxy for the `net.connman.Clock` object
pub type Clock = Proxy<ClockProperties>;

impl Proxy<ClockProperties> {
    /// Set the system time, in seconds since the epoch
    pub fn set_time(&self, time: u64, completion: Option<Completion>) {
        self.set_property("Time", Value::UInt64(time), completion);
    }

    /// Set the timezone, e.g. `Europe/Rome`
    pub fn set_timezone(&self, timezone: &str, completion: Option<Completion>) {
        self.set_property("Timezone", Value::str(timezone), completion);
    }

    /// Choose how the time is kept up to date
    pub fn set_time_updates(&self, policy: UpdatePolicy, completion: Option<Completion>) {
        self.set_property("TimeUpdates", policy.into(), completion);
    }

    /// Choose how the timezone is kept up to date
    pub fn set_timezone_updates(&self, policy: UpdatePolicy, completion: Option<Completion>) {
        self.set_property("TimezoneUpdates", policy.into(), completion);
    }

    /// Replace the list of NTP servers
    pub fn set_timeservers<S: AsRef<str>>(&self, servers: &[S], completion: Option<Completion>) {
        let servers = Value::string_array(servers.iter().map(|s| s.as_ref().to_string()));
        self.set_property("Timeservers", servers, completion);
    }
}
