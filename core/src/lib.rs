mod dispatch;
pub mod visitation;

pub use dispatch::MatchDispatcher;
pub use visitation::{
    HostResolutionGap, VisitOptions, VisitationError, VisitationSession, VisitationStats,
};
