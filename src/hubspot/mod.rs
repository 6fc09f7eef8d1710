pub mod client;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use client::{CrmApi, HubspotClient, HubspotError};
pub use types::{ObjectKind, Record};
