use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use logreceiver::prelude::*;

/// A `HostResolver` over a fixed set of hosts that remembers every lookup.
#[derive(Default)]
pub struct MockHostResolver {
    hosts: HashMap<HostId, Host>,
    lookups: Mutex<Vec<BTreeSet<HostId>>>,
    fail: bool,
}

impl MockHostResolver {
    pub fn new(hosts: Vec<Host>) -> Self {
        MockHostResolver {
            hosts: hosts.into_iter().map(|host| (host.id, host)).collect(),
            lookups: Mutex::new(vec![]),
            fail: false,
        }
    }

    /// A resolver that knows hosts `ids`; host `n` is called `host-n` and
    /// stores its messages in partition `log_entries_n`
    pub fn with_hosts(ids: &[i64]) -> Self {
        Self::new(
            ids.iter()
                .map(|id| Host::new(HostId(*id), format!("host-{}", id), format!("log_entries_{}", id)))
                .collect(),
        )
    }

    /// A resolver for which every lookup fails
    pub fn failing() -> Self {
        MockHostResolver {
            fail: true,
            ..Default::default()
        }
    }

    /// The sets of host ids that were looked up, in order
    pub fn lookups(&self) -> Vec<BTreeSet<HostId>> {
        self.lookups.lock().unwrap().clone()
    }
}

impl HostResolver for MockHostResolver {
    fn resolve_hosts(&self, ids: &BTreeSet<HostId>) -> Result<HashMap<HostId, Host>, StoreError> {
        self.lookups.lock().unwrap().push(ids.clone());
        if self.fail {
            return Err(StoreError::DatabaseUnavailable);
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.hosts.get(id).map(|host| (*id, host.clone())))
            .collect())
    }
}
