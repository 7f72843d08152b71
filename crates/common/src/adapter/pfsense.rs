//! pfSense firewall adapter
//!
//! Installs the mesh client package, then starts its service, through the
//! pfSense REST API. Every step needs a 2xx status and a success marker in
//! the JSON reply. A package that is already installed or a service that is
//! already running counts as success.

use super::{base_url, http_client, truncate_body, DeviceAdapter};
use crate::config::PfSenseConfig;
use crate::credentials::Credential;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::types::DeviceKind;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const ALREADY_MARKERS: &[&str] = &[
    "already installed",
    "already running",
    "already started",
    "already exists",
];

/// pfSense REST API adapter
#[derive(Debug, Clone)]
pub struct PfSenseAdapter {
    config: PfSenseConfig,
}

/// Envelope returned by the pfSense REST API
#[derive(Debug, Default, Deserialize)]
struct ApiReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiReply {
    fn failed(&self) -> bool {
        let bad_status = self
            .status
            .as_deref()
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "error" | "fail" | "failed"))
            .unwrap_or(false);
        let bad_code = self.code.map(|c| c >= 400).unwrap_or(false);
        bad_status || bad_code
    }

    /// Positive success marker: `status` ok/success or a 2xx `code`
    fn succeeded(&self) -> bool {
        let ok_status = self
            .status
            .as_deref()
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "ok" | "success"))
            .unwrap_or(false);
        let ok_code = self.code.map(|c| (200..300).contains(&c)).unwrap_or(false);
        (ok_status || ok_code) && !self.failed()
    }

    fn client_error(&self) -> bool {
        self.code.map(|c| (400..500).contains(&c)).unwrap_or(false)
    }
}

/// What a single API step concluded
#[derive(Debug, PartialEq, Eq)]
enum StepResult {
    Applied,
    AlreadyInState,
}

impl PfSenseAdapter {
    pub fn new(config: PfSenseConfig) -> Self {
        Self { config }
    }

    async fn step(
        &self,
        client: &reqwest::Client,
        target: &str,
        step: &str,
        url: String,
        payload: serde_json::Value,
        authorization: &str,
    ) -> Result<StepResult, ConfigError> {
        let timeout_secs = self.config.timeout_secs;
        debug!("pfSense {} on {}: POST {}", step, target, url);

        let response = client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ConfigError::from_http(target, &e, timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConfigError::from_http(target, &e, timeout_secs))?;

        classify(target, step, status, &body)
    }
}

fn classify(target: &str, step: &str, status: StatusCode, body: &str) -> Result<StepResult, ConfigError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ConfigError::new(
            target,
            ConfigErrorKind::Auth(format!("HTTP {}: {}", status.as_u16(), truncate_body(body))),
        ));
    }

    if status == StatusCode::CONFLICT {
        return Ok(StepResult::AlreadyInState);
    }

    let reply: Option<ApiReply> = serde_json::from_str(body).ok();
    let message = reply
        .as_ref()
        .and_then(|r| r.message.clone())
        .unwrap_or_else(|| body.to_string());
    let already = {
        let lower = message.to_ascii_lowercase();
        ALREADY_MARKERS.iter().any(|m| lower.contains(m))
    };

    // "Already" only excuses a client error; a 5xx saying so is still a failure.
    let client_error = status.is_client_error() || reply.as_ref().is_some_and(ApiReply::client_error);
    if already && client_error {
        return Ok(StepResult::AlreadyInState);
    }

    if !status.is_success() {
        return Err(ConfigError::rejected(
            target,
            step,
            format!("HTTP {}: {}", status.as_u16(), truncate_body(&message)),
        ));
    }

    match reply {
        Some(r) if r.succeeded() => Ok(StepResult::Applied),
        Some(r) if r.failed() => Err(ConfigError::rejected(target, step, truncate_body(&message))),
        _ => Err(ConfigError::rejected(
            target,
            step,
            format!("no success marker in response: {}", truncate_body(body)),
        )),
    }
}

#[async_trait]
impl DeviceAdapter for PfSenseAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::PfSenseFirewall
    }

    async fn configure(
        &self,
        descriptor: &DeviceDescriptor,
        credential: &Credential,
    ) -> Result<(), ConfigError> {
        let target = descriptor.target.as_str();
        let (key, secret) = credential
            .api_key_pair(&descriptor.credential)
            .map_err(|e| ConfigError::new(target, ConfigErrorKind::Credential(e)))?;
        let authorization = format!("Bearer {key}:{secret}");

        let client = http_client(
            Duration::from_secs(self.config.timeout_secs),
            self.config.accept_invalid_certs,
        )
        .map_err(|e| ConfigError::transport(target, e))?;
        let base = base_url(target);

        let install = self
            .step(
                &client,
                target,
                "install package",
                format!("{base}/packages/install"),
                serde_json::json!({ "name": self.config.package }),
                &authorization,
            )
            .await?;
        debug!("pfSense {} package on {}: {:?}", self.config.package, target, install);

        let start = self
            .step(
                &client,
                target,
                "start service",
                format!("{base}/services/{}", self.config.service),
                serde_json::json!({ "action": "start" }),
                &authorization,
            )
            .await?;

        info!(
            "pfSense {} running on {} (install: {:?}, start: {:?})",
            self.config.service, target, install, start
        );
        Ok(())
    }
}
