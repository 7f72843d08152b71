//! Error types for Meshboard
//!
//! Onboarding failures are split by the phase that produced them so a caller
//! can tell a device that was never touched from one that is configured but
//! not yet registered.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the Meshboard [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside of a single onboarding attempt (config, inventory, I/O)
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid inventory: {0}")]
    InvalidInventory(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Phase of the onboarding workflow that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPhase {
    Validating,
    Configuring,
    Registering,
}

impl std::fmt::Display for FailedPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedPhase::Validating => write!(f, "validating"),
            FailedPhase::Configuring => write!(f, "configuring"),
            FailedPhase::Registering => write!(f, "registering"),
        }
    }
}

/// Rejected device descriptor. Never involves the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("hostname '{hostname}' is too long ({got} > {max} characters)")]
    HostnameTooLong { hostname: String, max: usize, got: usize },

    #[error("hostname '{hostname}' contains invalid character '{char}' at position {position}")]
    HostnameInvalidCharacter {
        hostname: String,
        position: usize,
        char: char,
    },

    #[error("hostname '{0}' must not start or end with a hyphen")]
    HostnameHyphen(String),

    #[error("tag '{0}' must start with 'tag:' and have a non-empty name")]
    InvalidTag(String),
}

/// Failure to turn a credential reference into a usable secret
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential '{reference}' not found (expected {source_hint})")]
    NotFound {
        reference: String,
        source_hint: String,
    },

    #[error("credential '{reference}' is a {found} credential, expected {expected}")]
    WrongKind {
        reference: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Device-side failure, carrying the target that failed
#[derive(Error, Debug, Clone)]
#[error("configuration of {target} failed: {kind}")]
pub struct ConfigError {
    pub target: String,
    pub kind: ConfigErrorKind,
}

/// What went wrong while configuring a device
#[derive(Error, Debug, Clone)]
pub enum ConfigErrorKind {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("step '{step}' rejected: {detail}")]
    CommandRejected { step: String, detail: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl ConfigError {
    pub fn new(target: impl Into<String>, kind: ConfigErrorKind) -> Self {
        Self {
            target: target.into(),
            kind,
        }
    }

    pub fn transport(target: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::new(target, ConfigErrorKind::Transport(detail.to_string()))
    }

    pub fn rejected(
        target: impl Into<String>,
        step: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(
            target,
            ConfigErrorKind::CommandRejected {
                step: step.into(),
                detail: detail.into(),
            },
        )
    }

    /// Map a reqwest failure onto the transport/timeout split
    pub fn from_http(target: impl Into<String>, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::new(target, ConfigErrorKind::Timeout { seconds: timeout_secs })
        } else {
            Self::transport(target, err)
        }
    }

    /// Transport failures and timeouts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ConfigErrorKind::Transport(_) | ConfigErrorKind::Timeout { .. }
        )
    }
}

/// Mesh-side failure, carrying the hostname being registered
#[derive(Error, Debug, Clone)]
pub enum RegistrationError {
    #[error("mesh service unreachable while registering {hostname}: {detail}")]
    Transport { hostname: String, detail: String },

    #[error("mesh service timed out after {seconds}s while registering {hostname}")]
    Timeout { hostname: String, seconds: u64 },

    #[error("mesh service rejected credentials for {hostname} (HTTP {status})")]
    Auth { hostname: String, status: u16 },

    #[error("hostname {hostname} is already registered with tags {existing_tags:?}")]
    AlreadyRegistered {
        hostname: String,
        existing_tags: Vec<String>,
    },

    #[error("mesh service rejected {hostname} (HTTP {status}): {body}")]
    Rejected {
        hostname: String,
        status: u16,
        body: String,
    },

    #[error("unexpected mesh service response for {hostname}: {detail}")]
    InvalidResponse { hostname: String, detail: String },
}

impl RegistrationError {
    pub fn from_http(hostname: impl Into<String>, err: &reqwest::Error, timeout_secs: u64) -> Self {
        let hostname = hostname.into();
        if err.is_timeout() {
            Self::Timeout {
                hostname,
                seconds: timeout_secs,
            }
        } else {
            Self::Transport {
                hostname,
                detail: err.to_string(),
            }
        }
    }

    /// Transport failures, timeouts, rate limiting and server errors are
    /// retryable. Auth and validation-style rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistrationError::Transport { .. } | RegistrationError::Timeout { .. } => true,
            RegistrationError::Rejected { status, .. } => *status == 429 || *status >= 500,
            RegistrationError::Auth { .. }
            | RegistrationError::AlreadyRegistered { .. }
            | RegistrationError::InvalidResponse { .. } => false,
        }
    }

    /// Short classification label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::Transport { .. } => "transport",
            RegistrationError::Timeout { .. } => "timeout",
            RegistrationError::Auth { .. } => "auth",
            RegistrationError::AlreadyRegistered { .. } => "already_registered",
            RegistrationError::Rejected { .. } => "rejected",
            RegistrationError::InvalidResponse { .. } => "invalid_response",
        }
    }
}

/// Any failure that can end an onboarding attempt
#[derive(Error, Debug, Clone)]
pub enum OnboardingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl OnboardingError {
    /// Phase the error belongs to
    pub fn phase(&self) -> FailedPhase {
        match self {
            OnboardingError::Validation(_) => FailedPhase::Validating,
            OnboardingError::Config(_) => FailedPhase::Configuring,
            OnboardingError::Registration(_) => FailedPhase::Registering,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            OnboardingError::Validation(_) => false,
            OnboardingError::Config(e) => e.is_retryable(),
            OnboardingError::Registration(e) => e.is_retryable(),
        }
    }

    /// Short classification label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            OnboardingError::Validation(_) => "validation",
            OnboardingError::Config(e) => match e.kind {
                ConfigErrorKind::Transport(_) => "transport",
                ConfigErrorKind::Timeout { .. } => "timeout",
                ConfigErrorKind::Auth(_) => "auth",
                ConfigErrorKind::CommandRejected { .. } => "command_rejected",
                ConfigErrorKind::Credential(_) => "credential",
            },
            OnboardingError::Registration(e) => e.kind(),
        }
    }
}
