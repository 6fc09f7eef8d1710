pub mod group;
pub mod merge;

pub use group::{group_by_identity, DuplicateGroup, IdentityKey};
pub use merge::{dedupe_kind, DedupeSummary};
