//! The log receiver's notification side is structured as a small set of
//! components, each with a trait defining its interface.
//!
//! At the bottom are the stores that hold match pointers and hosts; at the
//! top are the visitors supplied by callers that turn matches into
//! notifications. The visitation engine in `logreceiver-core` connects
//! the two.
//!
//! A request/response interaction between C1 and C2 is made by C1 requiring
//! an `Arc<C2>` (usually `Arc<dyn C2>`) in its constructor and then calling
//! the functions defined on C2.

/// Components dealing with storing match pointers and hosts.
pub mod store;

/// Components that consume matched messages.
pub mod visitor;
