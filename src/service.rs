//! HTTP client for the consulting-periods service.
//!
//! This module provides:
//!
//! - `SubmissionRequest`: the certification request body (`periodo` as DD/MM/YYYY)
//! - `Budget`: an entry of the selectable code list
//! - `CertificationService`: the seam the screen uses to reach the backend
//! - `ServiceClient`: the `reqwest` implementation
//!
//! A certification request only says "accepted" or "failed"; the outcome of the
//! processing itself arrives later on the status topic.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;

/// User agent for API requests
const USER_AGENT: &str = concat!("periodcert/", env!("CARGO_PKG_VERSION"));

/// Body of a certification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Period formatted as DD/MM/YYYY
    pub periodo: String,
    pub codigo: String,
}

/// A selectable budget code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub codigo: String,
    #[serde(default)]
    pub descripcion: Option<String>,
}

/// Errors returned by the service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Backend operations used by the screen
pub trait CertificationService: Clone + Send + Sync + 'static {
    /// Submit a certification request. Resolves once the service accepted or rejected it.
    fn certify(
        &self,
        request: SubmissionRequest,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Fetch the list of selectable codes
    fn budgets(&self) -> impl Future<Output = Result<Vec<Budget>, ServiceError>> + Send;
}

/// Consulting-periods API client
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    certify_url: String,
    codes_url: String,
}

impl ServiceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            certify_url: join_url(&config.base_url, &config.certify_path),
            codes_url: join_url(&config.base_url, &config.codes_path),
        })
    }

    /// Turn a non-success response into a `ServiceError::Status`
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl CertificationService for ServiceClient {
    async fn certify(&self, request: SubmissionRequest) -> Result<(), ServiceError> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.certify_url)
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!(
            "Certification request for {} {} accepted in {:.1}s",
            request.codigo,
            request.periodo,
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }

    async fn budgets(&self) -> Result<Vec<Budget>, ServiceError> {
        let response = self.client.get(&self.codes_url).send().await?;
        let budgets: Vec<Budget> = Self::check(response).await?.json().await?;
        tracing::info!("Fetched {} budget codes", budgets.len());
        Ok(budgets)
    }
}

/// Join a base URL and a path without doubling or dropping the slash
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8080/api/", "/cert"),
            "http://localhost:8080/api/cert"
        );
        assert_eq!(join_url("http://host", "codigo"), "http://host/codigo");
    }

    #[test]
    fn test_submission_request_wire_format() {
        let request = SubmissionRequest {
            periodo: "01/01/2024".to_string(),
            codigo: "A1".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "periodo": "01/01/2024", "codigo": "A1" }));
    }

    #[test]
    fn test_budget_ignores_unknown_fields() {
        let budgets: Vec<Budget> = serde_json::from_str(
            r#"[{"codigo":"A1","descripcion":"Obra A","importe":10},{"codigo":"B2"}]"#,
        )
        .unwrap();
        assert_eq!(budgets.len(), 2);
        assert_eq!(budgets[0].descripcion.as_deref(), Some("Obra A"));
        assert_eq!(budgets[1].descripcion, None);
    }

    #[test]
    fn test_client_builds_urls_from_config() {
        let config = ServiceConfig::default();
        let client = ServiceClient::new(&config).unwrap();
        assert!(client.certify_url.ends_with(&config.certify_path));
        assert!(client.codes_url.starts_with(config.base_url.trim_end_matches('/')));
    }
}
