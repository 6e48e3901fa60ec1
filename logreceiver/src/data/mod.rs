/// Match pointers, hosts and subscriptions.
pub mod matches;
