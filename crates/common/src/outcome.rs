//! Onboarding phases and per-device outcomes

use crate::error::{Error, FailedPhase, OnboardingError, Result};
use crate::types::{DeviceKind, MeshDevice, Registration, RegistrationStatus};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Progress of one onboarding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    Configuring,
    Configured,
    Registering,
    Registered,
}

impl Phase {
    /// Legal forward moves of the workflow.
    ///
    /// `NotStarted -> Configured` is only taken when resuming a device that a
    /// previous attempt already configured.
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::NotStarted, Phase::Configuring)
                | (Phase::NotStarted, Phase::Configured)
                | (Phase::Configuring, Phase::Configured)
                | (Phase::Configured, Phase::Registering)
                | (Phase::Registering, Phase::Registered)
        )
    }

    /// Checked transition, rejecting moves the workflow never makes
    pub fn advance(self, next: Phase) -> Result<Phase> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Phases that count as "reached" in an outcome
    pub fn settled(self) -> Phase {
        match self {
            Phase::NotStarted | Phase::Configuring => Phase::NotStarted,
            Phase::Configured | Phase::Registering => Phase::Configured,
            Phase::Registered => Phase::Registered,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::NotStarted => write!(f, "not started"),
            Phase::Configuring => write!(f, "configuring"),
            Phase::Configured => write!(f, "configured"),
            Phase::Registering => write!(f, "registering"),
            Phase::Registered => write!(f, "registered"),
        }
    }
}

/// Terminal result of an attempt
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OutcomeResult {
    Registered {
        registration: Registration,
    },
    Failed {
        phase: FailedPhase,
        #[serde(serialize_with = "serialize_error")]
        error: OnboardingError,
    },
}

fn serialize_error<S: Serializer>(error: &OnboardingError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeStruct;
    let mut s = serializer.serialize_struct("OnboardingError", 3)?;
    s.serialize_field("kind", error.kind())?;
    s.serialize_field("message", &error.to_string())?;
    s.serialize_field("retryable", &error.is_retryable())?;
    s.end()
}

/// Record returned for one device
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingOutcome {
    pub device: String,
    pub kind: DeviceKind,
    pub hostname: String,
    /// Tags sent (or that would have been sent) to the mesh service
    pub tags: Vec<String>,
    /// NotStarted, Configured or Registered
    pub phase_reached: Phase,
    #[serde(flatten)]
    pub result: OutcomeResult,
    /// Whether the device adapter was invoked in this attempt
    pub configure_attempted: bool,
    /// Attempts made, including retries by the fleet driver
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OnboardingOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self.result, OutcomeResult::Registered { .. })
    }

    pub fn registration(&self) -> Option<&Registration> {
        match &self.result {
            OutcomeResult::Registered { registration } => Some(registration),
            OutcomeResult::Failed { .. } => None,
        }
    }

    pub fn mesh_device(&self) -> Option<&MeshDevice> {
        self.registration().map(|r| &r.device)
    }

    pub fn registration_status(&self) -> Option<RegistrationStatus> {
        self.registration().map(|r| r.status)
    }

    pub fn error(&self) -> Option<&OnboardingError> {
        match &self.result {
            OutcomeResult::Failed { error, .. } => Some(error),
            OutcomeResult::Registered { .. } => None,
        }
    }

    pub fn failed_phase(&self) -> Option<FailedPhase> {
        match &self.result {
            OutcomeResult::Failed { phase, .. } => Some(*phase),
            OutcomeResult::Registered { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.error().map(OnboardingError::is_retryable).unwrap_or(false)
    }

    /// Device carries mesh configuration but is not registered. Configuration
    /// is never rolled back, so an operator has to know this.
    pub fn configured_but_unregistered(&self) -> bool {
        self.phase_reached == Phase::Configured && !self.is_registered()
    }

    /// Human summary for logs and plain output
    pub fn summary(&self) -> String {
        match &self.result {
            OutcomeResult::Registered { registration } => format!(
                "{} registered as {} ({})",
                self.device, registration.device.hostname, registration.status
            ),
            OutcomeResult::Failed { phase, error } if self.configured_but_unregistered() => format!(
                "{} failed while {}: {} (device is configured but NOT registered; retry registration)",
                self.device, phase, error
            ),
            OutcomeResult::Failed { phase, error } => {
                format!("{} failed while {}: {}", self.device, phase, error)
            }
        }
    }
}
