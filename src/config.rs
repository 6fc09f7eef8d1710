use anyhow::{anyhow, Result};
use std::env;

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

const DEFAULT_LOOKBACK_HOURS: i64 = 24;
const DEFAULT_DEAL_STAGE: &str = "236104964";
const DEFAULT_JOB_POSTING_PROPERTY: &str = "lemlistjobpostingurl";

/// How the association pass resolves a company name for a contact whose
/// `company` property is empty. Deployments disagree on this, so both
/// behaviors exist as named modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyResolution {
    /// Skip the contact's company step when the `company` property is empty.
    RequireName,
    /// Fall back to the contact's `associatedcompanyid` and look the company
    /// up by id to obtain its name.
    AssociatedCompany,
}

impl CompanyResolution {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "require-name" => Ok(Self::RequireName),
            "associated-company" => Ok(Self::AssociatedCompany),
            other => Err(anyhow!(
                "unknown HUBLINK_COMPANY_RESOLUTION \"{}\" (expected \"require-name\" or \"associated-company\")",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub access_token: String,
    pub base_url: String,
    /// Contact creation window for the association pass, in hours.
    pub lookback_hours: i64,
    pub company_resolution: CompanyResolution,
    /// Stage id assigned to deals this tool creates.
    pub deal_stage: String,
    /// Contact property carrying the job-posting key.
    pub job_posting_property: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let access_token = env::var("HUBSPOT_ACCESS_TOKEN")
            .map_err(|_| anyhow!("HUBSPOT_ACCESS_TOKEN is not set in environment variables"))?;

        let company_resolution = match env::var("HUBLINK_COMPANY_RESOLUTION") {
            Ok(value) => CompanyResolution::parse(&value)?,
            Err(_) => CompanyResolution::RequireName,
        };

        Ok(Self {
            access_token,
            base_url: env::var("HUBSPOT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            lookback_hours: env::var("HUBLINK_LOOKBACK_HOURS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_LOOKBACK_HOURS),
            company_resolution,
            deal_stage: env::var("HUBLINK_DEAL_STAGE")
                .unwrap_or_else(|_| DEFAULT_DEAL_STAGE.to_string()),
            job_posting_property: env::var("HUBLINK_JOB_POSTING_PROPERTY")
                .unwrap_or_else(|_| DEFAULT_JOB_POSTING_PROPERTY.to_string()),
        })
    }
}
