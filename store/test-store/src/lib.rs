use std::env;
use std::sync::Mutex;

use diesel::sql_types::{BigInt, Text};
use diesel::{sql_query, RunQueryDsl};
use lazy_static::lazy_static;

use logreceiver::log;
use logreceiver::prelude::*;
use logreceiver_store_postgres::{ConnectionPool, PostgresHostResolver, PostgresMatchStore};

pub const POSTGRES_URL_VAR: &str = "LOGRECEIVER_STORE_POSTGRES_URL";

/// The database to run tests against. Tests that need one are marked
/// `#[ignore]` and run with `cargo test -- --ignored`, and they fail when
/// no database is configured.
pub fn postgres_test_url() -> String {
    require_postgres_url(env::var(POSTGRES_URL_VAR).ok())
}

fn require_postgres_url(url: Option<String>) -> String {
    url.unwrap_or_else(|| panic!("The {} environment variable is not set", POSTGRES_URL_VAR))
}

lazy_static! {
    pub static ref LOGGER: Logger = match env::var_os("LOGRECEIVER_LOG") {
        Some(_) => log::logger(false),
        None => log::discard(),
    };

    static ref POOL: ConnectionPool = {
        let pool = ConnectionPool::create(&LOGGER, &postgres_test_url(), 10);
        pool.setup().expect("failed to run migrations");
        create_hosts_table(&pool).expect("failed to create log_hosts");
        pool
    };

    // Tests share one database; run them one at a time
    static ref SEQ_LOCK: Mutex<()> = Mutex::new(());
}

/// The log receiver owns `log_hosts`, so the migrations do not create it
fn create_hosts_table(pool: &ConnectionPool) -> Result<(), StoreError> {
    let mut conn = pool.get()?;
    sql_query(
        "create table if not exists log_hosts(
             host_id   bigint primary key,
             name      text not null,
             partition text not null)",
    )
    .execute(&mut conn)?;
    Ok(())
}

pub struct TestStore {
    pub pool: ConnectionPool,
    pub store: Arc<PostgresMatchStore>,
    pub resolver: Arc<PostgresHostResolver>,
}

impl TestStore {
    /// Add hosts `(id, name, partition)` to `log_hosts`
    pub fn add_hosts(&self, hosts: &[(i64, &str, &str)]) {
        let mut conn = self.pool.get().expect("can get a connection");
        for (id, name, partition) in hosts {
            sql_query("insert into log_hosts(host_id, name, partition) values ($1, $2, $3)")
                .bind::<BigInt, _>(*id)
                .bind::<Text, _>(*name)
                .bind::<Text, _>(*partition)
                .execute(&mut conn)
                .expect("can insert host");
        }
    }

    /// Insert `(message id, host id)` pairs for `subscription` and return
    /// the match ids in insertion order
    pub fn add_matches(&self, subscription: i64, matches: &[(i64, i64)]) -> Vec<MatchId> {
        let matches: Vec<_> = matches
            .iter()
            .map(|(msg, host)| (MessageId(*msg), HostId(*host)))
            .collect();
        self.store
            .insert_matches(SubscriptionId(subscription), &matches)
            .expect("can insert matches");
        let mut cursor = self
            .store
            .stream_matches(SubscriptionId(subscription))
            .expect("can open cursor");
        let all = cursor.next_batch(usize::MAX).expect("can read matches");
        all[all.len() - matches.len()..]
            .iter()
            .map(|ptr| ptr.match_id)
            .collect()
    }
}

fn remove_all(pool: &ConnectionPool) {
    let mut conn = pool.get().expect("can get a connection");
    sql_query("truncate matched_messages, log_hosts")
        .execute(&mut conn)
        .expect("can truncate tables");
}

/// Run `test` against an empty store
pub fn run_test<F>(test: F)
where
    F: FnOnce(&TestStore),
{
    let pool = POOL.clone();
    // A failing test poisons the lock; that should not fail other tests
    let _lock = SEQ_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    remove_all(&pool);
    let store = TestStore {
        store: Arc::new(PostgresMatchStore::new(&LOGGER, pool.clone())),
        resolver: Arc::new(PostgresHostResolver::new(pool.clone())),
        pool,
    };
    test(&store);
}
