pub mod opt;
mod visitor;

pub use self::visitor::LoggingVisitor;
