use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::hubspot::client::HubspotError;

/// CRM object collections this tool operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Contacts,
    Companies,
    Deals,
}

impl ObjectKind {
    /// Collection name as it appears in CRM endpoint paths.
    pub fn path(&self) -> &'static str {
        match self {
            ObjectKind::Contacts => "contacts",
            ObjectKind::Companies => "companies",
            ObjectKind::Deals => "deals",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

pub const ASSOCIATION_CATEGORY: &str = "HUBSPOT_DEFINED";
pub const DEAL_TO_CONTACT_TYPE_ID: u32 = 3;
pub const DEAL_TO_COMPANY_TYPE_ID: u32 = 341;

/// Resolves the CRM-defined association type id for a directed pair.
///
/// Only deal→contact and deal→company edges exist in this portal; any other
/// direction is a configuration error and is rejected before any request is
/// built.
pub fn association_type_id(from: ObjectKind, to: ObjectKind) -> Result<u32, HubspotError> {
    match (from, to) {
        (ObjectKind::Deals, ObjectKind::Contacts) => Ok(DEAL_TO_CONTACT_TYPE_ID),
        (ObjectKind::Deals, ObjectKind::Companies) => Ok(DEAL_TO_COMPANY_TYPE_ID),
        _ => Err(HubspotError::UnsupportedAssociation { from, to }),
    }
}

/// A read-only snapshot of a CRM record. Never mutated locally; all writes go
/// back through the API referencing `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
}

impl Record {
    /// Returns a property value, trimmed, or `None` when the property is
    /// missing, null, or blank.
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|value| value.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Eq,
    ContainsToken,
    Gte,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    pub fn new(property_name: &str, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

impl FilterGroup {
    pub fn single(filter: Filter) -> Self {
        Self {
            filters: vec![filter],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub properties: Vec<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub results: Vec<Record>,
}

/// One page of an object collection, with the cursor for the next page when
/// more records remain.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    pub results: Vec<Record>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub next: Option<PagingNext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingNext {
    pub after: String,
}

#[derive(Debug, Serialize)]
pub struct CreateRequest {
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub primary_object_id: String,
    pub object_id_to_merge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: String,
    pub association_type_id: u32,
}

#[derive(Debug, Serialize)]
pub struct AssociationCreateInput {
    pub types: Vec<AssociationSpec>,
    pub from: ObjectRef,
    pub to: ObjectRef,
}

#[derive(Debug, Serialize)]
pub struct AssociationBatchCreate {
    pub inputs: Vec<AssociationCreateInput>,
}

#[derive(Debug, Serialize)]
pub struct AssociationBatchRead {
    pub inputs: Vec<ObjectRef>,
}

#[derive(Debug, Deserialize)]
pub struct AssociationBatchReadResponse {
    #[serde(default)]
    pub results: Vec<AssociationReadResult>,
}

#[derive(Debug, Deserialize)]
pub struct AssociationReadResult {
    pub from: ObjectRef,
    #[serde(default)]
    pub to: Vec<AssociationTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationTarget {
    pub to_object_id: i64,
}
