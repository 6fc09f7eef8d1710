//! In-memory [`CrmApi`] double for unit tests. Behaves like the hosted CRM
//! where the decision logic depends on it: exact-match search is
//! case-sensitive (the reason the contains-token fallback exists), merges
//! drop the merged record's associations, and unsupported association
//! directions fail before any simulated network traffic is counted.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use crate::hubspot::client::{CrmApi, HubspotError};
use crate::hubspot::types::{
    association_type_id, Filter, FilterOperator, ObjectKind, Paging, PagingNext, Record,
    RecordPage, SearchRequest, SearchResponse,
};

type Edge = (&'static str, &'static str, String, String);

#[derive(Default)]
struct FakeState {
    records: HashMap<ObjectKind, Vec<Record>>,
    associations: BTreeSet<Edge>,
    merges: Vec<(ObjectKind, String, String)>,
    next_id: u64,
    network_calls: usize,
    search_calls: usize,
    association_creates: usize,
    fail_merge_ids: HashSet<String>,
    fail_page_at: Option<usize>,
    create_conflicts: HashMap<ObjectKind, Record>,
}

#[derive(Default)]
pub struct FakeCrm {
    state: Mutex<FakeState>,
}

/// Builds a record snapshot for tests.
pub fn record(id: &str, created_at: &str, props: &[(&str, &str)]) -> Record {
    Record {
        id: id.to_string(),
        created_at: created_at.parse().expect("valid RFC 3339 timestamp"),
        properties: props
            .iter()
            .map(|(name, value)| (name.to_string(), Some(value.to_string())))
            .collect(),
    }
}

impl FakeCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ObjectKind, record: Record) {
        self.state
            .lock()
            .unwrap()
            .records
            .entry(kind)
            .or_default()
            .push(record);
    }

    pub fn insert_association(&self, from: ObjectKind, to: ObjectKind, from_id: &str, to_id: &str) {
        self.state.lock().unwrap().associations.insert((
            from.path(),
            to.path(),
            from_id.to_string(),
            to_id.to_string(),
        ));
    }

    pub fn records_of(&self, kind: ObjectKind) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn associations_of(&self, from: ObjectKind, to: ObjectKind, from_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .associations
            .iter()
            .filter(|(f, t, fid, _)| *f == from.path() && *t == to.path() && fid == from_id)
            .map(|(_, _, _, tid)| tid.clone())
            .collect()
    }

    pub fn merges(&self) -> Vec<(ObjectKind, String, String)> {
        self.state.lock().unwrap().merges.clone()
    }

    pub fn network_calls(&self) -> usize {
        self.state.lock().unwrap().network_calls
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn association_creates(&self) -> usize {
        self.state.lock().unwrap().association_creates
    }

    /// Makes every merge request naming `merge_id` fail with an API error.
    pub fn fail_merge_of(&self, merge_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_merge_ids
            .insert(merge_id.to_string());
    }

    /// Makes the page fetch with the given zero-based index fail.
    pub fn fail_page_at(&self, page_index: usize) {
        self.state.lock().unwrap().fail_page_at = Some(page_index);
    }

    /// Makes the next create for `kind` fail as if a concurrent run had won
    /// the race with `record`; the record becomes visible to searches at the
    /// moment the create fails.
    pub fn conflict_on_create(&self, kind: ObjectKind, record: Record) {
        self.state
            .lock()
            .unwrap()
            .create_conflicts
            .insert(kind, record);
    }

    fn api_error(context: &str) -> HubspotError {
        HubspotError::Api {
            context: context.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "{\"message\":\"injected failure\"}".to_string(),
        }
    }
}

fn filter_matches(record: &Record, filter: &Filter) -> bool {
    let raw = record
        .properties
        .get(&filter.property_name)
        .and_then(|value| value.as_deref());
    match filter.operator {
        FilterOperator::Eq => raw == Some(filter.value.as_str()),
        FilterOperator::ContainsToken => raw
            .map(|value| value.to_lowercase().contains(&filter.value.to_lowercase()))
            .unwrap_or(false),
        FilterOperator::Gte => {
            let actual = if filter.property_name == "createdate" {
                Some(record.created_at.timestamp_millis())
            } else {
                raw.and_then(|value| value.parse::<i64>().ok())
            };
            match (actual, filter.value.parse::<i64>()) {
                (Some(actual), Ok(threshold)) => actual >= threshold,
                _ => false,
            }
        }
    }
}

fn request_matches(record: &Record, request: &SearchRequest) -> bool {
    request
        .filter_groups
        .iter()
        .any(|group| group.filters.iter().all(|f| filter_matches(record, f)))
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn get_page(
        &self,
        kind: ObjectKind,
        _properties: &[&str],
        limit: u32,
        after: Option<&str>,
    ) -> Result<RecordPage, HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;

        let offset: usize = after.map(|a| a.parse().unwrap_or(0)).unwrap_or(0);
        let page_index = offset / limit.max(1) as usize;
        if state.fail_page_at == Some(page_index) {
            return Err(Self::api_error(&format!("{} page", kind)));
        }

        let records = state.records.get(&kind).cloned().unwrap_or_default();
        let end = (offset + limit as usize).min(records.len());
        let results = records[offset.min(records.len())..end].to_vec();
        let paging = (end < records.len()).then(|| Paging {
            next: Some(PagingNext {
                after: end.to_string(),
            }),
        });
        Ok(RecordPage { results, paging })
    }

    async fn get_by_id(
        &self,
        kind: ObjectKind,
        id: &str,
        _properties: &[&str],
    ) -> Result<Record, HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        state
            .records
            .get(&kind)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned()
            .ok_or_else(|| Self::api_error(&format!("{} {}", kind, id)))
    }

    async fn search(
        &self,
        kind: ObjectKind,
        request: &SearchRequest,
    ) -> Result<SearchResponse, HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        state.search_calls += 1;

        let matched: Vec<Record> = state
            .records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| request_matches(record, request))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let offset = request.after.unwrap_or(0) as usize;
        let end = (offset + request.limit as usize).min(matched.len());
        Ok(SearchResponse {
            total: matched.len() as u64,
            results: matched[offset.min(matched.len())..end].to_vec(),
        })
    }

    async fn create(
        &self,
        kind: ObjectKind,
        properties: HashMap<String, String>,
    ) -> Result<Record, HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;

        if let Some(raced) = state.create_conflicts.remove(&kind) {
            state.records.entry(kind).or_default().push(raced);
            return Err(Self::api_error(&format!("{} create", kind)));
        }

        state.next_id += 1;

        let record = Record {
            id: format!("fake-{}", state.next_id),
            created_at: Utc::now(),
            properties: properties
                .into_iter()
                .map(|(name, value)| (name, Some(value)))
                .collect(),
        };
        state.records.entry(kind).or_default().push(record.clone());
        Ok(record)
    }

    async fn merge(
        &self,
        kind: ObjectKind,
        primary_id: &str,
        merge_id: &str,
    ) -> Result<(), HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;

        if state.fail_merge_ids.contains(merge_id) {
            return Err(Self::api_error(&format!("{} merge", kind)));
        }

        state
            .merges
            .push((kind, primary_id.to_string(), merge_id.to_string()));
        if let Some(records) = state.records.get_mut(&kind) {
            records.retain(|record| record.id != merge_id);
        }
        // The CRM drops the merged record's edges.
        state
            .associations
            .retain(|(_, _, from_id, to_id)| from_id != merge_id && to_id != merge_id);
        Ok(())
    }

    async fn read_associations(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
    ) -> Result<Vec<String>, HubspotError> {
        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        Ok(state
            .associations
            .iter()
            .filter(|(f, t, fid, _)| *f == from.path() && *t == to.path() && fid == from_id)
            .map(|(_, _, _, tid)| tid.clone())
            .collect())
    }

    async fn create_association(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
        to_id: &str,
    ) -> Result<(), HubspotError> {
        association_type_id(from, to)?;

        let mut state = self.state.lock().unwrap();
        state.network_calls += 1;
        state.association_creates += 1;
        state.associations.insert((
            from.path(),
            to.path(),
            from_id.to_string(),
            to_id.to_string(),
        ));
        Ok(())
    }
}
