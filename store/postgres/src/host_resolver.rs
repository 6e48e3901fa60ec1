use std::collections::{BTreeSet, HashMap};

use diesel::{table, ExpressionMethods, QueryDsl, RunQueryDsl};

use logreceiver::prelude::*;

use crate::connection_pool::ConnectionPool;

// Maintained by the log receiver; we only read it
table! {
    log_hosts(host_id) {
        host_id -> BigInt,
        name -> Text,
        partition -> Text,
    }
}

use self::log_hosts as lh;

/// Looks up hosts in the `log_hosts` table
#[derive(Clone)]
pub struct PostgresHostResolver {
    pool: ConnectionPool,
}

impl PostgresHostResolver {
    pub fn new(pool: ConnectionPool) -> Self {
        PostgresHostResolver { pool }
    }
}

impl HostResolver for PostgresHostResolver {
    fn resolve_hosts(&self, ids: &BTreeSet<HostId>) -> Result<HashMap<HostId, Host>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<i64> = ids.iter().map(HostId::as_i64).collect();
        let mut conn = self.pool.get()?;
        let hosts = lh::table
            .select((lh::host_id, lh::name, lh::partition))
            .filter(lh::host_id.eq_any(ids))
            .load::<(i64, String, String)>(&mut conn)?
            .into_iter()
            .map(|(id, name, partition)| (HostId(id), Host::new(HostId(id), name, partition)))
            .collect();
        Ok(hosts)
    }
}
