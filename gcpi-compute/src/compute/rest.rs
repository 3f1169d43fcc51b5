//! REST client for the Compute Engine v1 API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{
    AccessConfig, ApiError, ApiResult, ComputeApi, Instance, Metadata, Operation, Tags, TargetPool,
};
use crate::operation::OperationScope;

pub const DEFAULT_ENDPOINT: &str = "https://compute.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Compute Engine client authenticated with a caller-supplied bearer token.
pub struct RestCompute {
    http: Client,
    endpoint: String,
    access_token: String,
}

impl RestCompute {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, project: &str, path: &str) -> String {
        format!("{}/compute/v1/projects/{}/{}", self.endpoint, project, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: error_message(&body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> ApiResult<T> {
        debug!(%url, "GET");
        self.send(self.http.get(url)).await
    }

    async fn post(&self, request: RequestBuilder) -> ApiResult<Operation> {
        self.send(request).await
    }

    /// Walks every page of an aggregated listing.
    async fn aggregated(
        &self,
        project: &str,
        collection: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<ScopedList>> {
        let url = self.url(project, &format!("aggregated/{}", collection));
        let filter = format!("name eq .*{}", name_filter);
        debug!(%url, %filter, "GET aggregated");

        let mut scoped = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).query(&[("filter", filter.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: AggregatedList = self.send(request).await?;
            scoped.extend(page.items.into_values());

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(scoped)
    }
}

#[async_trait]
impl ComputeApi for RestCompute {
    async fn get_instance(&self, project: &str, zone: &str, name: &str) -> ApiResult<Instance> {
        self.get(self.url(project, &format!("zones/{}/instances/{}", zone, name)))
            .await
    }

    async fn list_instances_aggregated(
        &self,
        project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<Instance>> {
        let scoped = self.aggregated(project, "instances", name_filter).await?;
        Ok(scoped.into_iter().flat_map(|s| s.instances).collect())
    }

    async fn set_tags(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        tags: &Tags,
    ) -> ApiResult<Operation> {
        let url = self.url(project, &format!("zones/{}/instances/{}/setTags", zone, name));
        debug!(%url, "POST");
        self.post(self.http.post(url).json(tags)).await
    }

    async fn set_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> ApiResult<Operation> {
        let url = self.url(
            project,
            &format!("zones/{}/instances/{}/setMetadata", zone, name),
        );
        debug!(%url, "POST");
        self.post(self.http.post(url).json(metadata)).await
    }

    async fn add_access_config(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &AccessConfig,
    ) -> ApiResult<Operation> {
        let url = self.url(
            project,
            &format!("zones/{}/instances/{}/addAccessConfig", zone, name),
        );
        debug!(%url, "POST");
        let request = self
            .http
            .post(url)
            .query(&[("networkInterface", network_interface)])
            .json(access_config);
        self.post(request).await
    }

    async fn delete_access_config(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        network_interface: &str,
        access_config: &str,
    ) -> ApiResult<Operation> {
        let url = self.url(
            project,
            &format!("zones/{}/instances/{}/deleteAccessConfig", zone, name),
        );
        debug!(%url, "POST");
        let request = self.http.post(url).query(&[
            ("accessConfig", access_config),
            ("networkInterface", network_interface),
        ]);
        self.post(request).await
    }

    async fn get_target_pool(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> ApiResult<TargetPool> {
        self.get(self.url(project, &format!("regions/{}/targetPools/{}", region, name)))
            .await
    }

    async fn list_target_pools_aggregated(
        &self,
        project: &str,
        name_filter: &str,
    ) -> ApiResult<Vec<TargetPool>> {
        let scoped = self.aggregated(project, "targetPools", name_filter).await?;
        Ok(scoped.into_iter().flat_map(|s| s.target_pools).collect())
    }

    async fn add_instance_to_target_pool(
        &self,
        project: &str,
        region: &str,
        target_pool: &str,
        instance_self_link: &str,
    ) -> ApiResult<Operation> {
        let url = self.url(
            project,
            &format!("regions/{}/targetPools/{}/addInstance", region, target_pool),
        );
        debug!(%url, "POST");
        let body = json!({ "instances": [{ "instance": instance_self_link }] });
        self.post(self.http.post(url).json(&body)).await
    }

    async fn get_operation(
        &self,
        project: &str,
        scope: &OperationScope,
        operation: &str,
    ) -> ApiResult<Operation> {
        self.get(self.url(project, &operation_path(scope, operation)))
            .await
    }
}

fn operation_path(scope: &OperationScope, operation: &str) -> String {
    match scope {
        OperationScope::Zone(zone) => format!("zones/{}/operations/{}", zone, operation),
        OperationScope::Region(region) => format!("regions/{}/operations/{}", region, operation),
        OperationScope::Global => format!("global/operations/{}", operation),
    }
}

/// Extracts `error.message` from a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedList {
    #[serde(default)]
    items: BTreeMap<String, ScopedList>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopedList {
    #[serde(default)]
    instances: Vec<Instance>,
    #[serde(default)]
    target_pools: Vec<TargetPool>,
}
