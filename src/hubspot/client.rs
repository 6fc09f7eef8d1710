use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::hubspot::types::{
    association_type_id, AssociationBatchCreate, AssociationBatchRead,
    AssociationBatchReadResponse, AssociationCreateInput, AssociationSpec, CreateRequest,
    MergeRequest, ObjectKind, ObjectRef, Record, RecordPage, SearchRequest, SearchResponse,
    ASSOCIATION_CATEGORY,
};
use crate::TARGET_CRM_REQUEST;

#[derive(Debug, Error)]
pub enum HubspotError {
    #[error("request to CRM failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CRM returned {status} for {context}: {body}")]
    Api {
        context: String,
        status: StatusCode,
        body: String,
    },

    #[error("unsupported association between {from} and {to}")]
    UnsupportedAssociation { from: ObjectKind, to: ObjectKind },
}

/// The CRM surface the rest of the crate is written against. The production
/// implementation is [`HubspotClient`]; tests substitute an in-memory double.
/// A handle is passed explicitly into every component — there is no global
/// client.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// One page of an object collection, requesting only the named properties.
    async fn get_page(
        &self,
        kind: ObjectKind,
        properties: &[&str],
        limit: u32,
        after: Option<&str>,
    ) -> Result<RecordPage, HubspotError>;

    async fn get_by_id(
        &self,
        kind: ObjectKind,
        id: &str,
        properties: &[&str],
    ) -> Result<Record, HubspotError>;

    async fn search(
        &self,
        kind: ObjectKind,
        request: &SearchRequest,
    ) -> Result<SearchResponse, HubspotError>;

    async fn create(
        &self,
        kind: ObjectKind,
        properties: HashMap<String, String>,
    ) -> Result<Record, HubspotError>;

    /// Folds `merge_id` into `primary_id`. The merged record ceases to exist
    /// and its associations are dropped by the CRM.
    async fn merge(
        &self,
        kind: ObjectKind,
        primary_id: &str,
        merge_id: &str,
    ) -> Result<(), HubspotError>;

    /// Ids of all records of `to` kind associated with `from_id`.
    async fn read_associations(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
    ) -> Result<Vec<String>, HubspotError>;

    /// Creates one association edge. Fails with
    /// [`HubspotError::UnsupportedAssociation`] before any request is issued
    /// when the direction is not in the fixed type table.
    async fn create_association(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
        to_id: &str,
    ) -> Result<(), HubspotError>;
}

pub struct HubspotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HubspotClient {
    pub fn new(token: &str, base_url: &str) -> Result<Self, HubspotError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_success(
        context: String,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, HubspotError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HubspotError::Api {
            context,
            status,
            body,
        })
    }
}

#[async_trait]
impl CrmApi for HubspotClient {
    async fn get_page(
        &self,
        kind: ObjectKind,
        properties: &[&str],
        limit: u32,
        after: Option<&str>,
    ) -> Result<RecordPage, HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "GET {} page (after={:?})", kind, after);
        let mut request = self
            .http
            .get(self.url(&format!("/crm/v3/objects/{}", kind.path())))
            .bearer_auth(&self.token)
            .query(&[
                ("limit", limit.to_string()),
                ("properties", properties.join(",")),
            ]);
        if let Some(after) = after {
            request = request.query(&[("after", after)]);
        }

        let response = request.send().await?;
        let response = Self::expect_success(format!("{} page", kind), response).await?;
        Ok(response.json().await?)
    }

    async fn get_by_id(
        &self,
        kind: ObjectKind,
        id: &str,
        properties: &[&str],
    ) -> Result<Record, HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "GET {} {}", kind, id);
        let response = self
            .http
            .get(self.url(&format!("/crm/v3/objects/{}/{}", kind.path(), id)))
            .bearer_auth(&self.token)
            .query(&[("properties", properties.join(","))])
            .send()
            .await?;
        let response = Self::expect_success(format!("{} {}", kind, id), response).await?;
        Ok(response.json().await?)
    }

    async fn search(
        &self,
        kind: ObjectKind,
        request: &SearchRequest,
    ) -> Result<SearchResponse, HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "POST {} search", kind);
        let response = self
            .http
            .post(self.url(&format!("/crm/v3/objects/{}/search", kind.path())))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let response = Self::expect_success(format!("{} search", kind), response).await?;
        Ok(response.json().await?)
    }

    async fn create(
        &self,
        kind: ObjectKind,
        properties: HashMap<String, String>,
    ) -> Result<Record, HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "POST {} create", kind);
        let response = self
            .http
            .post(self.url(&format!("/crm/v3/objects/{}", kind.path())))
            .bearer_auth(&self.token)
            .json(&CreateRequest { properties })
            .send()
            .await?;
        let response = Self::expect_success(format!("{} create", kind), response).await?;
        Ok(response.json().await?)
    }

    async fn merge(
        &self,
        kind: ObjectKind,
        primary_id: &str,
        merge_id: &str,
    ) -> Result<(), HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "POST {} merge {} <- {}", kind, primary_id, merge_id);
        let response = self
            .http
            .post(self.url(&format!("/crm/v3/objects/{}/merge", kind.path())))
            .bearer_auth(&self.token)
            .json(&MergeRequest {
                primary_object_id: primary_id.to_string(),
                object_id_to_merge: merge_id.to_string(),
            })
            .send()
            .await?;
        Self::expect_success(format!("{} merge", kind), response).await?;
        Ok(())
    }

    async fn read_associations(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
    ) -> Result<Vec<String>, HubspotError> {
        debug!(target: TARGET_CRM_REQUEST, "POST associations read {}/{} for {}", from, to, from_id);
        let response = self
            .http
            .post(self.url(&format!(
                "/crm/v4/associations/{}/{}/batch/read",
                from.path(),
                to.path()
            )))
            .bearer_auth(&self.token)
            .json(&AssociationBatchRead {
                inputs: vec![ObjectRef {
                    id: from_id.to_string(),
                }],
            })
            .send()
            .await?;
        let response =
            Self::expect_success(format!("{}/{} association read", from, to), response).await?;
        let body: AssociationBatchReadResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .flat_map(|result| result.to)
            .map(|target| target.to_object_id.to_string())
            .collect())
    }

    async fn create_association(
        &self,
        from: ObjectKind,
        to: ObjectKind,
        from_id: &str,
        to_id: &str,
    ) -> Result<(), HubspotError> {
        let type_id = association_type_id(from, to)?;

        debug!(target: TARGET_CRM_REQUEST, "POST associations create {}/{} {} -> {}", from, to, from_id, to_id);
        let response = self
            .http
            .post(self.url(&format!(
                "/crm/v4/associations/{}/{}/batch/create",
                from.path(),
                to.path()
            )))
            .bearer_auth(&self.token)
            .json(&AssociationBatchCreate {
                inputs: vec![AssociationCreateInput {
                    types: vec![AssociationSpec {
                        association_category: ASSOCIATION_CATEGORY.to_string(),
                        association_type_id: type_id,
                    }],
                    from: ObjectRef {
                        id: from_id.to_string(),
                    },
                    to: ObjectRef {
                        id: to_id.to_string(),
                    },
                }],
            })
            .send()
            .await?;
        Self::expect_success(format!("{}/{} association create", from, to), response).await?;
        Ok(())
    }
}
