mod resolver;
mod store;
mod visitor;

pub use self::resolver::MockHostResolver;
pub use self::store::InMemoryMatchStore;
pub use self::visitor::{RecordingVisitor, VisitorEvent};
