use std::collections::{BTreeSet, HashMap};

use logreceiver::prelude::*;

/// The hosts a session has looked up so far. Hosts that do not exist are
/// remembered as `None` so that we ask the resolver about every host at
/// most once per session.
pub(super) struct HostCache<'a> {
    logger: Logger,
    resolver: &'a dyn HostResolver,
    hosts: HashMap<HostId, Option<Host>>,
}

impl<'a> HostCache<'a> {
    pub fn new(logger: &Logger, resolver: &'a dyn HostResolver) -> Self {
        HostCache {
            logger: logger.clone(),
            resolver,
            hosts: HashMap::new(),
        }
    }

    /// Make sure all hosts in `ids` are in the cache, looking up the ones
    /// we have not seen yet with one call to the resolver
    pub fn resolve(&mut self, ids: impl IntoIterator<Item = HostId>) -> Result<(), StoreError> {
        let missing: BTreeSet<_> = ids
            .into_iter()
            .filter(|id| !self.hosts.contains_key(id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut found = self.resolver.resolve_hosts(&missing)?;
        for id in missing {
            let host = found.remove(&id);
            match &host {
                Some(host) => trace!(self.logger, "Resolved host";
                    "host" => id,
                    "name" => host.name.as_str()),
                None => warn!(self.logger, "Host does not exist; its matches will not be delivered";
                    "host" => id),
            }
            self.hosts.insert(id, host);
        }
        Ok(())
    }

    pub fn get(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id).and_then(Option::as_ref)
    }
}
