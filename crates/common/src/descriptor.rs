//! Device descriptors and their validation
//!
//! A descriptor is checked before anything touches the network:
//! - target, hostname and credential reference must be non-empty
//! - hostname is a single DNS label: 1-63 characters of [A-Za-z0-9-],
//!   no leading or trailing hyphen
//! - every extra tag starts with `tag:` and has a name after it

use crate::error::ValidationError;
use crate::types::{merge_tags, DeviceKind, TAG_PREFIX};
use serde::{Deserialize, Serialize};

/// Maximum length of a DNS label
pub const MAX_HOSTNAME_LEN: usize = 63;

/// Name of a secret held elsewhere. Never the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialReference(String);

impl CredentialReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for CredentialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One device to onboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Optional display name; defaults to the target in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Adapter selection
    pub kind: DeviceKind,

    /// Management address (IP/host for SSH and XML API, base URL for REST)
    pub target: String,

    /// Reference to the device management credential
    pub credential: CredentialReference,

    /// Hostname requested in the mesh
    pub hostname: String,

    /// Tags added on top of the device-class default tag
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DeviceDescriptor {
    pub fn new(
        kind: DeviceKind,
        target: impl Into<String>,
        credential: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            kind,
            target: target.into(),
            credential: CredentialReference::new(credential),
            hostname: hostname.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Identifier used in logs and outcome reports
    pub fn device_id(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.target)
    }

    /// Effective tag set sent to the mesh service
    pub fn effective_tags(&self) -> Vec<String> {
        merge_tags(self.kind.default_tag(), &self.tags)
    }

    /// Check the descriptor without contacting anything
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target.trim().is_empty() {
            return Err(ValidationError::EmptyField("target"));
        }
        if self.credential.is_empty() {
            return Err(ValidationError::EmptyField("credential reference"));
        }
        validate_hostname(&self.hostname)?;
        for tag in &self.tags {
            validate_tag(tag)?;
        }
        Ok(())
    }
}

/// Validate a mesh hostname as a single DNS label
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    if hostname.is_empty() {
        return Err(ValidationError::EmptyField("hostname"));
    }

    let len = hostname.chars().count();
    if len > MAX_HOSTNAME_LEN {
        return Err(ValidationError::HostnameTooLong {
            hostname: hostname.to_string(),
            max: MAX_HOSTNAME_LEN,
            got: len,
        });
    }

    for (position, c) in hostname.chars().enumerate() {
        if !(c.is_ascii_alphanumeric() || c == '-') {
            return Err(ValidationError::HostnameInvalidCharacter {
                hostname: hostname.to_string(),
                position,
                char: c,
            });
        }
    }

    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err(ValidationError::HostnameHyphen(hostname.to_string()));
    }

    Ok(())
}

/// Validate an ACL tag (`tag:<name>`)
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    match tag.strip_prefix(TAG_PREFIX) {
        Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => Ok(()),
        _ => Err(ValidationError::InvalidTag(tag.to_string())),
    }
}
