//! Mesh registrar
//!
//! Client for the coordination service's device endpoints:
//! - `POST {api_url}/devices` with `{hostname, tags}` registers a device
//! - `GET {api_url}/devices` returns `{"devices": [...]}` for idempotency checks
//!
//! Registering a hostname twice never creates a second record: an existing
//! record that already carries the requested tags comes back as
//! [`RegistrationStatus::AlreadyRegistered`].

use crate::adapter::truncate_body;
use crate::config::RegistrarConfig;
use crate::credentials::CredentialResolver;
use crate::descriptor::CredentialReference;
use crate::error::RegistrationError;
use crate::types::{MeshDevice, Registration, RegistrationStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registers and looks up devices in the mesh
#[async_trait]
pub trait MeshRegistrar: Send + Sync {
    /// Register `hostname` with `tags`. Safe to call repeatedly.
    async fn register(&self, hostname: &str, tags: &[String]) -> std::result::Result<Registration, RegistrationError>;

    /// Find the record for `hostname`, if any
    async fn lookup(&self, hostname: &str) -> std::result::Result<Option<MeshDevice>, RegistrationError>;

    /// All device records
    async fn list(&self) -> std::result::Result<Vec<MeshDevice>, RegistrationError>;
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    tags: &'a [String],
}

/// Device as returned by the service. Fields are optional because the
/// service is inconsistent about what it echoes back.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

impl DeviceRecord {
    /// Short hostname, falling back to the first label of the FQDN
    fn short_hostname(&self) -> Option<String> {
        self.hostname
            .clone()
            .filter(|h| !h.is_empty())
            .or_else(|| self.name.as_deref().and_then(|n| n.split('.').next()).map(str::to_string))
    }

    fn matches(&self, hostname: &str) -> bool {
        self.short_hostname()
            .map(|h| h.eq_ignore_ascii_case(hostname))
            .unwrap_or(false)
    }

    fn into_mesh_device(self, fallback_hostname: &str, fallback_tags: &[String]) -> MeshDevice {
        let hostname = self.short_hostname().unwrap_or_else(|| fallback_hostname.to_string());
        let created = self
            .created
            .as_deref()
            .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
            .map(|c| c.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        MeshDevice {
            id: self.id.or(self.node_id),
            hostname,
            tags: self.tags.unwrap_or_else(|| fallback_tags.to_vec()),
            created,
        }
    }
}

/// HTTP registrar for a Tailscale-style coordination API
#[derive(Clone)]
pub struct HttpRegistrar {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for HttpRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistrar")
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl HttpRegistrar {
    pub fn new(config: &RegistrarConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build from config, resolving the API key credential
    pub fn from_config(config: &RegistrarConfig, credentials: &dyn CredentialResolver) -> Result<Self> {
        let reference = CredentialReference::new(config.api_key_credential.clone());
        let credential = credentials.resolve(&reference)?;
        let key = credential.api_key(&reference)?.to_string();
        Self::new(config, key)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn devices_url(&self) -> String {
        format!("{}/devices", self.api_url)
    }

    fn reuse_existing(
        &self,
        existing: MeshDevice,
        hostname: &str,
        tags: &[String],
    ) -> std::result::Result<Registration, RegistrationError> {
        if existing.covers_tags(tags) {
            info!("{} already registered in mesh, nothing to do", hostname);
            Ok(Registration {
                device: existing,
                status: RegistrationStatus::AlreadyRegistered,
            })
        } else {
            warn!(
                "{} already registered with tags {:?}, requested {:?}",
                hostname, existing.tags, tags
            );
            Err(RegistrationError::AlreadyRegistered {
                hostname: hostname.to_string(),
                existing_tags: existing.tags,
            })
        }
    }

    async fn fetch_devices(&self, context: &str) -> std::result::Result<Vec<DeviceRecord>, RegistrationError> {
        let response = self
            .client
            .get(self.devices_url())
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RegistrationError::from_http(context, &e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RegistrationError::from_http(context, &e, self.timeout_secs))?;
        check_status(context, status, &body)?;

        let list: DeviceList = serde_json::from_str(&body).map_err(|e| RegistrationError::InvalidResponse {
            hostname: context.to_string(),
            detail: format!("device list: {e}"),
        })?;
        Ok(list.devices)
    }
}

/// Map non-success statuses onto the error taxonomy
fn check_status(hostname: &str, status: StatusCode, body: &str) -> std::result::Result<(), RegistrationError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RegistrationError::Auth {
            hostname: hostname.to_string(),
            status: status.as_u16(),
        });
    }
    Err(RegistrationError::Rejected {
        hostname: hostname.to_string(),
        status: status.as_u16(),
        body: truncate_body(body),
    })
}

/// Parse a 2xx registration reply; `None` when it carries no usable record
fn parse_record(hostname: &str, body: &str) -> Option<DeviceRecord> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(
                "Unparseable registration response for {}: {} (body: {})",
                hostname,
                e,
                truncate_body(body)
            );
            None
        }
    }
}

#[async_trait]
impl MeshRegistrar for HttpRegistrar {
    async fn register(&self, hostname: &str, tags: &[String]) -> std::result::Result<Registration, RegistrationError> {
        if let Some(existing) = self.lookup(hostname).await? {
            return self.reuse_existing(existing, hostname, tags);
        }

        debug!("POST {} hostname={} tags={:?}", self.devices_url(), hostname, tags);
        let response = self
            .client
            .post(self.devices_url())
            .bearer_auth(&self.api_key)
            .json(&RegisterRequest { hostname, tags })
            .send()
            .await
            .map_err(|e| RegistrationError::from_http(hostname, &e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RegistrationError::from_http(hostname, &e, self.timeout_secs))?;

        if status == StatusCode::CONFLICT {
            // Registered concurrently between our lookup and the POST.
            return match self.lookup(hostname).await? {
                Some(existing) => self.reuse_existing(existing, hostname, tags),
                None => Err(RegistrationError::Rejected {
                    hostname: hostname.to_string(),
                    status: status.as_u16(),
                    body: truncate_body(&body),
                }),
            };
        }
        check_status(hostname, status, &body)?;

        let device = match parse_record(hostname, &body) {
            Some(record) if record.created.is_some() => record.into_mesh_device(hostname, tags),
            // Incomplete echo: the service's own record is the one later lookups return.
            partial => match self.lookup(hostname).await {
                Ok(Some(device)) => device,
                Ok(None) => partial.unwrap_or_default().into_mesh_device(hostname, tags),
                Err(e) => {
                    warn!("Lookup after registering {} failed: {}", hostname, e);
                    partial.unwrap_or_default().into_mesh_device(hostname, tags)
                }
            },
        };
        info!("Registered {} in mesh with tags {:?}", device.hostname, device.tags);

        Ok(Registration {
            device,
            status: RegistrationStatus::Created,
        })
    }

    async fn lookup(&self, hostname: &str) -> std::result::Result<Option<MeshDevice>, RegistrationError> {
        let devices = self.fetch_devices(hostname).await?;
        Ok(devices
            .into_iter()
            .find(|d| d.matches(hostname))
            .map(|d| d.into_mesh_device(hostname, &[])))
    }

    async fn list(&self) -> std::result::Result<Vec<MeshDevice>, RegistrationError> {
        let devices = self.fetch_devices("*").await?;
        Ok(devices
            .into_iter()
            .filter_map(|d| {
                let hostname = d.short_hostname()?;
                Some(d.into_mesh_device(&hostname, &[]))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hostname_fallback() {
        let record = DeviceRecord {
            name: Some("sw-01.example-tailnet.ts.net".into()),
            ..Default::default()
        };
        assert!(record.matches("sw-01"));
        assert!(record.matches("SW-01"));
        assert!(!record.matches("sw-02"));
    }

    #[test]
    fn test_record_into_mesh_device() {
        let record: DeviceRecord = serde_json::from_str(
            r#"{"id":"n123","hostname":"fw-01","tags":["tag:pfsense-firewall"],"created":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let device = record.into_mesh_device("ignored", &[]);
        assert_eq!(device.id.as_deref(), Some("n123"));
        assert_eq!(device.hostname, "fw-01");
        assert_eq!(device.created.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_record_empty_created_uses_now() {
        let record: DeviceRecord = serde_json::from_str(r#"{"hostname":"fw-01","created":""}"#).unwrap();
        let before = Utc::now();
        let device = record.into_mesh_device("fw-01", &["tag:x".into()]);
        assert!(device.created >= before);
        assert_eq!(device.tags, vec!["tag:x"]);
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("h", StatusCode::CREATED, "").is_ok());
        assert!(matches!(
            check_status("h", StatusCode::UNAUTHORIZED, ""),
            Err(RegistrationError::Auth { status: 401, .. })
        ));
        assert!(matches!(
            check_status("h", StatusCode::UNPROCESSABLE_ENTITY, "bad tags"),
            Err(RegistrationError::Rejected { status: 422, ref body, .. }) if body == "bad tags"
        ));
    }
}
