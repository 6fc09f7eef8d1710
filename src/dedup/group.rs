use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::hubspot::types::Record;
use crate::TARGET_DEDUP;

/// Normalized string a record is grouped under when hunting duplicates.
/// Construction goes through [`IdentityKey::normalize`] so every comparison
/// sees the same trimming and casing — ad hoc string keys invite collisions
/// from inconsistent normalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Trims and lower-cases `raw`; an empty result means the record has no
    /// usable identity and must stay out of grouping.
    pub fn normalize(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two or more records of one kind sharing one identity key.
#[derive(Debug)]
pub struct DuplicateGroup<'a> {
    pub key: IdentityKey,
    pub members: Vec<&'a Record>,
}

/// Identity key for a contact: the email address.
pub fn contact_email_key(record: &Record) -> Option<IdentityKey> {
    record.prop("email").and_then(IdentityKey::normalize)
}

/// Fallback identity key for a contact without an email: "first last", only
/// when both name parts are present.
pub fn contact_name_key(record: &Record) -> Option<IdentityKey> {
    let first = record.prop("firstname")?;
    let last = record.prop("lastname")?;
    IdentityKey::normalize(&format!("{} {}", first, last))
}

/// Identity key for a company: the name.
pub fn company_key(record: &Record) -> Option<IdentityKey> {
    record.prop("name").and_then(IdentityKey::normalize)
}

/// Identity key for a deal: "name|pipeline", so same-named deals in different
/// pipelines never collapse into one group.
pub fn deal_key(record: &Record) -> Option<IdentityKey> {
    let name = record.prop("dealname")?;
    let pipeline = record.prop("pipeline").unwrap_or("");
    IdentityKey::normalize(&format!("{}|{}", name, pipeline))
}

/// Partitions records into duplicate groups by exact identity-key equality.
///
/// Records whose key function yields nothing are logged and excluded — they
/// never land in a singleton or catch-all bucket. Only groups with at least
/// two members are returned. Output depends solely on record content, never
/// on arrival order: groups come out keyed through an ordered map and members
/// are sorted by creation time then id.
pub fn group_by_identity<'a, I, F>(records: I, key_fn: F) -> Vec<DuplicateGroup<'a>>
where
    I: IntoIterator<Item = &'a Record>,
    F: Fn(&Record) -> Option<IdentityKey>,
{
    let mut grouped: BTreeMap<IdentityKey, Vec<&Record>> = BTreeMap::new();
    for record in records {
        match key_fn(record) {
            Some(key) => grouped.entry(key).or_default().push(record),
            None => {
                debug!(target: TARGET_DEDUP, "Record {} has no identity key, excluded from grouping", record.id)
            }
        }
    }

    grouped
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, mut members)| {
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            DuplicateGroup { key, members }
        })
        .collect()
}

/// Duplicate groups for contacts: grouped by email first, then by full name
/// for the contacts that have no email at all. A contact with an email never
/// joins a name group, so the two passes cannot double-merge a record.
pub fn contact_groups(records: &[Record]) -> Vec<DuplicateGroup<'_>> {
    let mut groups = group_by_identity(records.iter(), contact_email_key);
    let email_less = records.iter().filter(|record| record.prop("email").is_none());
    groups.extend(group_by_identity(email_less, contact_name_key));
    groups
}
