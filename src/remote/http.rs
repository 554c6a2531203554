//! REST implementation of [`StateSource`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Envelope, Scope, StateSource, SystemStatus};
use crate::config::Config;
use crate::model::{JobId, NodeDetail, SummaryResponse, TaskListPayload, TaskQueue, TreeNode, TreeStats};
use crate::{clog_debug, clog_trace, Error, Result};

pub struct HttpStateSource {
    client: Client,
    base: String,
    timeout: Duration,
}

impl HttpStateSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base, config.request_timeout())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn transport_error(&self, endpoint: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::network(endpoint, e)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, endpoint: &str) -> Result<Value> {
        clog_trace!("HTTP {}", endpoint);
        let resp = request
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::network(endpoint, format!("HTTP {}", status.as_u16())));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| Error::MalformedPayload(format!("{}: {}", endpoint, e)))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = self.client.get(self.url(path)).query(query);
        self.send(request, path).await
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let body = self.get(path, query).await?;
        let envelope: Envelope<T> = serde_json::from_value(body)
            .map_err(|e| Error::MalformedPayload(format!("{}: {}", path, e)))?;
        if envelope.data.is_none() {
            clog_debug!(
                "{}: no data ({})",
                path,
                envelope.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(envelope.data)
    }
}

fn job_query(scope: &Scope) -> Vec<(&'static str, &str)> {
    match scope.job() {
        Some(id) => vec![("job_id", id.as_str())],
        None => Vec::new(),
    }
}

#[async_trait]
impl StateSource for HttpStateSource {
    async fn fetch_tree(&self, scope: &Scope) -> Result<Option<TreeNode>> {
        let tree: Option<TreeNode> = self.get_data(&scope.tree_path(), &[]).await?;
        Ok(tree.filter(|root| {
            if !root.is_valid() {
                clog_debug!("{}: root without id, treating as empty", scope);
            }
            root.is_valid()
        }))
    }

    async fn fetch_tree_stats(&self, scope: &Scope) -> Result<Option<TreeStats>> {
        self.get_data(&scope.stats_path(), &[]).await
    }

    async fn fetch_tasks(&self, scope: &Scope) -> Result<Option<TaskQueue>> {
        let payload: Option<TaskListPayload> = self.get_data("/tasks", &job_query(scope)).await?;
        Ok(payload.map(TaskQueue::from_payload))
    }

    async fn fetch_summary(&self, job: &JobId) -> Result<SummaryResponse> {
        let body = self
            .get("/analysis/summary", &[("job_id", job.as_str())])
            .await?;
        serde_json::from_value(body)
            .map_err(|e| Error::MalformedPayload(format!("/analysis/summary: {}", e)))
    }

    async fn fetch_node(&self, id: &str) -> Result<Option<NodeDetail>> {
        self.get_data(&format!("/tree/node/{}", id), &[]).await
    }

    async fn fetch_status(&self) -> Result<SystemStatus> {
        self.get_data("/status", &[])
            .await?
            .ok_or_else(|| Error::NoData("/status".to_string()))
    }

    async fn refresh(&self) -> Result<()> {
        let request = self.client.post(self.url("/refresh"));
        self.send(request, "/refresh").await.map(|_| ())
    }
}
