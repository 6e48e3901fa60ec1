use std::process;

use clap::Parser as _;

use logreceiver::log::logger;
use logreceiver::prelude::*;
use logreceiver_core::MatchDispatcher;
use logreceiver_node::opt::Opt;
use logreceiver_node::LoggingVisitor;
use logreceiver_store_postgres::{ConnectionPool, PostgresHostResolver, PostgresMatchStore};

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    // Set up logger
    let logger = logger(opt.debug);

    if let Err(e) = run(&logger, opt).await {
        eprintln!("notify-visit failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(logger: &Logger, opt: Opt) -> Result<(), anyhow::Error> {
    let pool_size = opt
        .pool_size
        .unwrap_or(ENV_VARS.store.connection_pool_size);
    let pool = ConnectionPool::create(logger, &opt.postgres_url, pool_size);
    pool.setup().context("failed to set up the database")?;

    let store = Arc::new(PostgresMatchStore::new(logger, pool.clone()));
    let resolver = Arc::new(PostgresHostResolver::new(pool));
    let options = opt.visit_options();
    let dispatcher = MatchDispatcher::new(logger, store, resolver).with_options(options);

    let subscriptions = opt.subscriptions();
    info!(logger, "Visiting subscriptions";
        "count" => subscriptions.len(),
        "batch_size" => options.max_batch_size,
        "unresolved_hosts" => options.unresolved_hosts.to_string());

    // Sessions are synchronous and spend their time waiting for the
    // database, so each one gets a blocking thread
    let handles: Vec<_> = subscriptions
        .iter()
        .map(|subscription| {
            let subscription = *subscription;
            let dispatcher = dispatcher.clone();
            let logger = logger.new(o!("subscription" => subscription));
            tokio::task::spawn_blocking(move || {
                let mut visitor = LoggingVisitor::new(&logger);
                dispatcher.visit(subscription, &mut visitor)
            })
        })
        .collect();

    let mut failed = 0;
    let mut transient = 0;
    for (subscription, handle) in subscriptions.iter().zip(handles) {
        match handle.await {
            Ok(Ok(stats)) => {
                if !stats.gaps.is_empty() {
                    warn!(logger, "Some matches belong to unknown hosts";
                        "subscription" => *subscription,
                        "hosts" => stats.gaps.len(),
                        "retained" => stats.retained);
                }
            }
            Ok(Err(e)) => {
                failed += 1;
                if e.is_transient() {
                    transient += 1;
                }
                error!(logger, "Visiting subscription failed";
                    "subscription" => *subscription,
                    "error" => e.to_string(),
                    "retry" => e.is_transient());
            }
            Err(e) => {
                failed += 1;
                error!(logger, "Visiting subscription panicked";
                    "subscription" => *subscription,
                    "error" => e.to_string());
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!(
            "visiting {} of {} subscriptions failed; {} of the failures may go away when retried",
            failed,
            subscriptions.len(),
            transient
        ));
    }
    Ok(())
}
