pub mod associate;
pub mod config;
pub mod dedup;
pub mod fetch;
pub mod hubspot;
pub mod logging;

pub const TARGET_CRM_REQUEST: &str = "crm_request";
pub const TARGET_DEDUP: &str = "dedup";
pub const TARGET_ASSOCIATE: &str = "associate";
