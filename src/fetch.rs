use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::hubspot::client::CrmApi;
use crate::hubspot::types::{ObjectKind, Record};
use crate::TARGET_CRM_REQUEST;

const PAGE_SIZE: u32 = 100;

/// Fetches every record of a collection, one 100-record page at a time,
/// requesting only the named properties.
///
/// Any page failure aborts the whole fetch: a duplicate scan over a partial
/// snapshot could select the wrong survivor, so partial results are never
/// returned.
pub async fn fetch_all(
    api: &dyn CrmApi,
    kind: ObjectKind,
    properties: &[&str],
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut after: Option<String> = None;

    loop {
        let page = api
            .get_page(kind, properties, PAGE_SIZE, after.as_deref())
            .await
            .with_context(|| format!("fetching {} page", kind))?;
        records.extend(page.results);
        debug!(target: TARGET_CRM_REQUEST, "Fetched {} {} so far", records.len(), kind);

        match page.paging.and_then(|paging| paging.next) {
            Some(next) => after = Some(next.after),
            None => break,
        }
    }

    info!(target: TARGET_CRM_REQUEST, "Fetched {} total {}", records.len(), kind);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hubspot::fake::{record, FakeCrm};

    #[tokio::test]
    async fn test_fetch_all_accumulates_pages() {
        let crm = FakeCrm::new();
        for i in 0..250 {
            crm.insert(
                ObjectKind::Contacts,
                record(&format!("c{}", i), "2024-01-01T00:00:00Z", &[]),
            );
        }

        let records = fetch_all(&crm, ObjectKind::Contacts, &["email"])
            .await
            .unwrap();
        assert_eq!(records.len(), 250);
        assert_eq!(records[0].id, "c0");
        assert_eq!(records[249].id, "c249");
    }

    #[tokio::test]
    async fn test_fetch_all_aborts_on_page_error() {
        let crm = FakeCrm::new();
        for i in 0..150 {
            crm.insert(
                ObjectKind::Deals,
                record(&format!("d{}", i), "2024-01-01T00:00:00Z", &[]),
            );
        }
        crm.fail_page_at(1);

        let result = fetch_all(&crm, ObjectKind::Deals, &["dealname"]).await;
        assert!(result.is_err());
    }
}
