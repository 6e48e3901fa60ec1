use clap::Parser;

use logreceiver::prelude::{SubscriptionId, UnresolvedHostPolicy};
use logreceiver_core::VisitOptions;

#[derive(Clone, Debug, Parser)]
#[clap(
    name = "notify-visit",
    about = "Deliver the matched messages of subscriptions and remove them from the store",
    version
)]
pub struct Opt {
    #[clap(
        long,
        value_name = "URL",
        env = "LOGRECEIVER_POSTGRES_URL",
        help = "Location of the Postgres database that holds the matched messages"
    )]
    pub postgres_url: String,
    #[clap(
        long = "subscription",
        value_name = "ID",
        required = true,
        value_delimiter = ',',
        help = "The id of a subscription to visit. Can be repeated or given as a comma-separated list"
    )]
    pub subscriptions: Vec<i64>,
    #[clap(
        long,
        value_name = "N",
        help = "How many matches to process at once. Defaults to LOGRECEIVER_VISIT_BATCH_SIZE"
    )]
    pub batch_size: Option<usize>,
    #[clap(
        long,
        help = "Leave matches whose host is unknown in the store instead of deleting them"
    )]
    pub retain_unresolved: bool,
    #[clap(
        long,
        value_name = "N",
        help = "Maximum number of database connections. Defaults to LOGRECEIVER_STORE_CONNECTION_POOL_SIZE"
    )]
    pub pool_size: Option<u32>,
    #[clap(long, help = "Enable debug logging")]
    pub debug: bool,
}

impl Opt {
    /// The subscriptions to visit, each one only once even if it was
    /// given several times
    pub fn subscriptions(&self) -> Vec<SubscriptionId> {
        let mut ids = self.subscriptions.clone();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(SubscriptionId).collect()
    }

    pub fn visit_options(&self) -> VisitOptions {
        let mut options = VisitOptions::from_env();
        if let Some(batch_size) = self.batch_size {
            options = options.with_batch_size(batch_size);
        }
        if self.retain_unresolved {
            options = options.with_unresolved_hosts(UnresolvedHostPolicy::Retain);
        }
        options
    }
}
