use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

use crate::config::{AppConfig, CompanyResolution};
use crate::hubspot::client::{CrmApi, HubspotError};
use crate::hubspot::types::{
    Filter, FilterGroup, FilterOperator, ObjectKind, Record, SearchRequest,
};
use crate::TARGET_ASSOCIATE;

const SEARCH_PAGE_SIZE: u32 = 100;
const DEAL_SEARCH_PROPERTIES: &[&str] = &["dealname", "createdate", "dealstage"];

#[derive(Debug, Default)]
pub struct AssociateSummary {
    pub contacts_processed: usize,
    pub contacts_skipped: usize,
    pub unique_keys: usize,
    pub keys_processed: usize,
    pub failures: usize,
}

/// Searches deals whose name matches the job-posting key.
///
/// Exact match first. The search backend cannot do exact case-insensitive
/// matching, so when the exact tier comes back empty, a contains-token search
/// widens the net and a client-side trimmed, case-insensitive comparison
/// narrows it back to true matches.
pub async fn search_deal(api: &dyn CrmApi, key: &str) -> Result<Vec<Record>, HubspotError> {
    let trimmed = key.trim();

    let exact = api
        .search(
            ObjectKind::Deals,
            &SearchRequest {
                filter_groups: vec![FilterGroup::single(Filter::new(
                    "dealname",
                    FilterOperator::Eq,
                    trimmed,
                ))],
                properties: DEAL_SEARCH_PROPERTIES.iter().map(|p| p.to_string()).collect(),
                limit: SEARCH_PAGE_SIZE,
                after: None,
            },
        )
        .await?;
    if !exact.results.is_empty() {
        info!(
            target: TARGET_ASSOCIATE,
            "Found {} exact matches for deal \"{}\"", exact.total, trimmed
        );
        return Ok(exact.results);
    }

    let contains = api
        .search(
            ObjectKind::Deals,
            &SearchRequest {
                filter_groups: vec![FilterGroup::single(Filter::new(
                    "dealname",
                    FilterOperator::ContainsToken,
                    trimmed,
                ))],
                properties: DEAL_SEARCH_PROPERTIES.iter().map(|p| p.to_string()).collect(),
                limit: SEARCH_PAGE_SIZE,
                after: None,
            },
        )
        .await?;

    let needle = trimmed.to_lowercase();
    let matches: Vec<Record> = contains
        .results
        .into_iter()
        .filter(|deal| {
            deal.prop("dealname")
                .map(|name| name.to_lowercase() == needle)
                .unwrap_or(false)
        })
        .collect();
    if !matches.is_empty() {
        info!(
            target: TARGET_ASSOCIATE,
            "Found {} case-insensitive matches for deal \"{}\"", matches.len(), trimmed
        );
    }
    Ok(matches)
}

/// Resolves the job-posting key to a deal id, creating the deal when no
/// match exists.
///
/// The create path re-runs the full search immediately before creating, and
/// re-resolves once more if the create call itself fails — an overlapping
/// scheduled run may have created the deal in between. This narrows the race
/// window but cannot close it: that would take a server-side unique
/// constraint the CRM does not offer.
pub async fn find_or_create_deal(
    api: &dyn CrmApi,
    key: &str,
    default_stage: &str,
) -> Result<String, HubspotError> {
    let trimmed = key.trim();

    let found = search_deal(api, trimmed).await?;
    if let Some(deal) = found.first() {
        info!(target: TARGET_ASSOCIATE, "Using existing deal {} for \"{}\"", deal.id, trimmed);
        return Ok(deal.id.clone());
    }

    let double_check = search_deal(api, trimmed).await?;
    if let Some(deal) = double_check.first() {
        info!(
            target: TARGET_ASSOCIATE,
            "Found deal {} for \"{}\" in double-check", deal.id, trimmed
        );
        return Ok(deal.id.clone());
    }

    let mut properties = HashMap::new();
    properties.insert("dealname".to_string(), trimmed.to_string());
    properties.insert("dealstage".to_string(), default_stage.to_string());
    match api.create(ObjectKind::Deals, properties).await {
        Ok(deal) => {
            info!(target: TARGET_ASSOCIATE, "Created new deal {} for \"{}\"", deal.id, trimmed);
            Ok(deal.id)
        }
        Err(err) => {
            warn!(
                target: TARGET_ASSOCIATE,
                "Create failed for deal \"{}\", re-resolving by search: {}", trimmed, err
            );
            let retry = search_deal(api, trimmed).await?;
            match retry.into_iter().next() {
                Some(deal) => Ok(deal.id),
                None => Err(err),
            }
        }
    }
}

pub async fn search_company(api: &dyn CrmApi, name: &str) -> Result<Vec<Record>, HubspotError> {
    let response = api
        .search(
            ObjectKind::Companies,
            &SearchRequest {
                filter_groups: vec![FilterGroup::single(Filter::new(
                    "name",
                    FilterOperator::Eq,
                    name.trim(),
                ))],
                properties: vec!["name".to_string()],
                limit: 1,
                after: None,
            },
        )
        .await?;
    Ok(response.results)
}

/// Resolves a company name to a company id, creating the company when no
/// exact match exists. Company names are assumed unambiguous, so there is no
/// contains-token fallback here — the double-check and the on-failure
/// re-resolution mirror the deal path.
pub async fn find_or_create_company(
    api: &dyn CrmApi,
    name: &str,
) -> Result<String, HubspotError> {
    let trimmed = name.trim();

    let found = search_company(api, trimmed).await?;
    if let Some(company) = found.first() {
        info!(target: TARGET_ASSOCIATE, "Using existing company {} for \"{}\"", company.id, trimmed);
        return Ok(company.id.clone());
    }

    let double_check = search_company(api, trimmed).await?;
    if let Some(company) = double_check.first() {
        info!(
            target: TARGET_ASSOCIATE,
            "Found company {} for \"{}\" in double-check", company.id, trimmed
        );
        return Ok(company.id.clone());
    }

    let mut properties = HashMap::new();
    properties.insert("name".to_string(), trimmed.to_string());
    match api.create(ObjectKind::Companies, properties).await {
        Ok(company) => {
            info!(target: TARGET_ASSOCIATE, "Created new company {} for \"{}\"", company.id, trimmed);
            Ok(company.id)
        }
        Err(err) => {
            warn!(
                target: TARGET_ASSOCIATE,
                "Create failed for company \"{}\", re-resolving by search: {}", trimmed, err
            );
            let retry = search_company(api, trimmed).await?;
            match retry.into_iter().next() {
                Some(company) => Ok(company.id),
                None => Err(err),
            }
        }
    }
}

/// Associates a company with a deal unless the edge already exists.
///
/// The pre-check is what keeps repeated runs over the same data from
/// stacking duplicate company edges on a deal.
pub async fn ensure_company_association(
    api: &dyn CrmApi,
    deal_id: &str,
    company_id: &str,
) -> Result<(), HubspotError> {
    let existing = api
        .read_associations(ObjectKind::Deals, ObjectKind::Companies, deal_id)
        .await?;
    if existing.iter().any(|id| id == company_id) {
        info!(
            target: TARGET_ASSOCIATE,
            "Company {} is already associated with deal {}", company_id, deal_id
        );
        return Ok(());
    }

    api.create_association(ObjectKind::Deals, ObjectKind::Companies, deal_id, company_id)
        .await?;
    info!(target: TARGET_ASSOCIATE, "Associated company {} with deal {}", company_id, deal_id);
    Ok(())
}

async fn resolve_company_name(
    api: &dyn CrmApi,
    config: &AppConfig,
    contact: &Record,
) -> Result<Option<String>, HubspotError> {
    if let Some(name) = contact.prop("company") {
        return Ok(Some(name.to_string()));
    }

    match config.company_resolution {
        CompanyResolution::RequireName => Ok(None),
        CompanyResolution::AssociatedCompany => {
            let Some(company_id) = contact.prop("associatedcompanyid") else {
                return Ok(None);
            };
            let company = api
                .get_by_id(ObjectKind::Companies, company_id, &["name"])
                .await?;
            Ok(company.prop("name").map(str::to_string))
        }
    }
}

async fn link_contact(
    api: &dyn CrmApi,
    config: &AppConfig,
    contact: &Record,
    key: &str,
) -> Result<(), HubspotError> {
    let deal_id = find_or_create_deal(api, key, &config.deal_stage).await?;

    // No pre-check on the contact edge: the CRM treats an identical duplicate
    // edge as a no-op, so this stays at-least-once while the company edge
    // below is pre-checked. Asymmetric on purpose.
    if let Err(err) = api
        .create_association(ObjectKind::Deals, ObjectKind::Contacts, &deal_id, &contact.id)
        .await
    {
        error!(
            target: TARGET_ASSOCIATE,
            "Failed to associate contact {} with deal {}: {}", contact.id, deal_id, err
        );
    }

    match resolve_company_name(api, config, contact).await? {
        Some(name) => {
            let company_id = find_or_create_company(api, &name).await?;
            if let Err(err) = ensure_company_association(api, &deal_id, &company_id).await {
                error!(
                    target: TARGET_ASSOCIATE,
                    "Failed to associate company {} with deal {}: {}", company_id, deal_id, err
                );
            }
        }
        None => {
            warn!(
                target: TARGET_ASSOCIATE,
                "Skipping company association for contact {}: no company name", contact.id
            );
        }
    }
    Ok(())
}

async fn recent_contacts_page(
    api: &dyn CrmApi,
    config: &AppConfig,
    after: u32,
) -> Result<crate::hubspot::types::SearchResponse, HubspotError> {
    let since = Utc::now() - Duration::hours(config.lookback_hours);

    let mut properties = vec![
        config.job_posting_property.clone(),
        "company".to_string(),
        "createdate".to_string(),
    ];
    if config.company_resolution == CompanyResolution::AssociatedCompany {
        properties.push("associatedcompanyid".to_string());
    }

    api.search(
        ObjectKind::Contacts,
        &SearchRequest {
            filter_groups: vec![FilterGroup::single(Filter::new(
                "createdate",
                FilterOperator::Gte,
                since.timestamp_millis().to_string(),
            ))],
            properties,
            limit: SEARCH_PAGE_SIZE,
            after: Some(after),
        },
    )
    .await
}

/// Links every contact created within the lookback window to a deal derived
/// from its job-posting key, and to its company.
///
/// Contacts are processed strictly in fetch order; each contact's
/// search → create → associate chain completes before the next contact
/// starts. A failure on one contact is logged and the pass moves on.
pub async fn process_recent_contacts(
    api: &dyn CrmApi,
    config: &AppConfig,
) -> Result<AssociateSummary> {
    let mut summary = AssociateSummary::default();
    let mut unique_keys = HashSet::new();
    let mut processed_keys = HashSet::new();
    let mut offset = 0u32;

    let mut page = recent_contacts_page(api, config, offset)
        .await
        .context("searching recent contacts")?;
    info!(
        target: TARGET_ASSOCIATE,
        "Found {} contacts created in the last {} hours", page.total, config.lookback_hours
    );

    loop {
        if page.results.is_empty() {
            break;
        }
        info!(
            target: TARGET_ASSOCIATE,
            "Processing batch of {} contacts starting from offset {}",
            page.results.len(),
            offset
        );

        for contact in &page.results {
            summary.contacts_processed += 1;

            let Some(key) = contact.prop(&config.job_posting_property).map(str::to_string) else {
                warn!(
                    target: TARGET_ASSOCIATE,
                    "Skipping contact {}: missing {}", contact.id, config.job_posting_property
                );
                summary.contacts_skipped += 1;
                continue;
            };
            unique_keys.insert(key.clone());

            if let Err(err) = link_contact(api, config, contact, &key).await {
                error!(
                    target: TARGET_ASSOCIATE,
                    "Failed to process contact {}: {}", contact.id, err
                );
                summary.failures += 1;
                continue;
            }
            processed_keys.insert(key);
        }

        offset += page.results.len() as u32;
        if u64::from(offset) >= page.total {
            break;
        }
        page = recent_contacts_page(api, config, offset)
            .await
            .context("searching recent contacts")?;
    }

    summary.unique_keys = unique_keys.len();
    summary.keys_processed = processed_keys.len();
    info!(
        target: TARGET_ASSOCIATE,
        "Processed {} contacts ({} skipped, {} failed), {} of {} unique job posting keys",
        summary.contacts_processed,
        summary.contacts_skipped,
        summary.failures,
        summary.keys_processed,
        summary.unique_keys
    );
    Ok(summary)
}
