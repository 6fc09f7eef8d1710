use anyhow::Result;
use tracing::{error, info};

use crate::dedup::group::{company_key, contact_groups, deal_key, group_by_identity, DuplicateGroup};
use crate::fetch::fetch_all;
use crate::hubspot::client::CrmApi;
use crate::hubspot::types::{ObjectKind, Record};
use crate::TARGET_DEDUP;

pub const CONTACT_PROPERTIES: &[&str] = &["email", "firstname", "lastname", "phone", "mobilephone"];
pub const COMPANY_PROPERTIES: &[&str] = &["name", "domain"];
pub const DEAL_PROPERTIES: &[&str] = &["dealname", "pipeline", "amount", "dealstage", "createdate"];

#[derive(Debug, Default)]
pub struct DedupeSummary {
    pub records: usize,
    pub groups: usize,
    pub merged: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub merged: usize,
    pub failed: usize,
}

fn deal_amount(record: &Record) -> f64 {
    record
        .prop("amount")
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Orders a duplicate group so that the survivor comes first.
///
/// Contacts and companies keep the oldest record: sorted ascending by
/// creation time. Deals keep the most valuable record: amount descending,
/// then the lexicographically greatest stage string, then the oldest
/// creation time. A final id comparison makes every ordering total, so the
/// same snapshot always elects the same survivor.
pub fn sorted_for_merge<'a>(kind: ObjectKind, members: &[&'a Record]) -> Vec<&'a Record> {
    let mut sorted = members.to_vec();
    match kind {
        ObjectKind::Contacts | ObjectKind::Companies => {
            sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        }
        ObjectKind::Deals => {
            sorted.sort_by(|a, b| {
                deal_amount(b)
                    .total_cmp(&deal_amount(a))
                    .then_with(|| {
                        b.prop("dealstage")
                            .unwrap_or("")
                            .cmp(a.prop("dealstage").unwrap_or(""))
                    })
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
    }
    sorted
}

/// Copies every contact and company association from one deal onto another.
///
/// Runs before the source deal is merged away, since merging drops its
/// edges. Each edge is copied independently: a failed read or create is
/// logged and the remaining edges still transfer.
pub async fn transfer_associations(api: &dyn CrmApi, from_deal: &str, to_deal: &str) {
    for target_kind in [ObjectKind::Contacts, ObjectKind::Companies] {
        let targets = match api
            .read_associations(ObjectKind::Deals, target_kind, from_deal)
            .await
        {
            Ok(targets) => targets,
            Err(err) => {
                error!(
                    target: TARGET_DEDUP,
                    "Failed to read {} associations of deal {}: {}", target_kind, from_deal, err
                );
                continue;
            }
        };

        for target_id in targets {
            if let Err(err) = api
                .create_association(ObjectKind::Deals, target_kind, to_deal, &target_id)
                .await
            {
                error!(
                    target: TARGET_DEDUP,
                    "Failed to transfer {} {} from deal {} to {}: {}",
                    target_kind, target_id, from_deal, to_deal, err
                );
            }
        }
    }
}

/// Merges every non-survivor of a group into its survivor, one request per
/// duplicate. A failed merge is logged and the rest of the group still
/// proceeds. Deal duplicates get their associations transferred onto the
/// survivor before the merge erases them.
pub async fn merge_group(
    api: &dyn CrmApi,
    kind: ObjectKind,
    group: &DuplicateGroup<'_>,
) -> MergeOutcome {
    let ordered = sorted_for_merge(kind, &group.members);
    let survivor = ordered[0];
    info!(
        target: TARGET_DEDUP,
        "Merging {} duplicate {} into {} for \"{}\"",
        ordered.len() - 1,
        kind,
        survivor.id,
        group.key
    );

    let mut outcome = MergeOutcome::default();
    for duplicate in &ordered[1..] {
        if kind == ObjectKind::Deals {
            transfer_associations(api, &duplicate.id, &survivor.id).await;
        }

        match api.merge(kind, &survivor.id, &duplicate.id).await {
            Ok(()) => {
                info!(
                    target: TARGET_DEDUP,
                    "Merged {} {} into {}", kind, duplicate.id, survivor.id
                );
                outcome.merged += 1;
            }
            Err(err) => {
                error!(
                    target: TARGET_DEDUP,
                    "Failed to merge {} {} into {}: {}", kind, duplicate.id, survivor.id, err
                );
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Full dedupe pass for one record kind: fetch everything, group by identity
/// key, merge each group best-effort.
pub async fn dedupe_kind(api: &dyn CrmApi, kind: ObjectKind) -> Result<DedupeSummary> {
    let properties = match kind {
        ObjectKind::Contacts => CONTACT_PROPERTIES,
        ObjectKind::Companies => COMPANY_PROPERTIES,
        ObjectKind::Deals => DEAL_PROPERTIES,
    };

    info!(target: TARGET_DEDUP, "Fetching all {}...", kind);
    let records = fetch_all(api, kind, properties).await?;

    let groups = match kind {
        ObjectKind::Contacts => contact_groups(&records),
        ObjectKind::Companies => group_by_identity(records.iter(), company_key),
        ObjectKind::Deals => group_by_identity(records.iter(), deal_key),
    };
    info!(target: TARGET_DEDUP, "Found {} groups of duplicate {}", groups.len(), kind);

    let mut summary = DedupeSummary {
        records: records.len(),
        groups: groups.len(),
        ..Default::default()
    };
    for group in &groups {
        let outcome = merge_group(api, kind, group).await;
        summary.merged += outcome.merged;
        summary.failed += outcome.failed;
    }

    info!(
        target: TARGET_DEDUP,
        "Dedupe of {} complete: {} records, {} groups, {} merged, {} failed",
        kind, summary.records, summary.groups, summary.merged, summary.failed
    );
    Ok(summary)
}
