//! Onboarding orchestrator
//!
//! Drives one device through validate -> configure -> register:
//!
//! ```text
//! NotStarted -> Configuring -> Configured -> Registering -> Registered
//!      |             |                           |
//!      +-> Failed(validating)  Failed(configuring)  Failed(registering)
//! ```
//!
//! The registrar is only called once the adapter reported success. A
//! registration failure leaves the device configuration in place; the outcome
//! says so and [`Orchestrator::resume_registration`] retries just that phase.
//! The orchestrator never retries on its own and holds no per-device state
//! between calls.

use crate::adapter::AdapterSet;
use crate::credentials::CredentialResolver;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ConfigError, ConfigErrorKind, FailedPhase, OnboardingError};
use crate::outcome::{OnboardingOutcome, OutcomeResult, Phase};
use crate::registrar::MeshRegistrar;
use crate::types::Registration;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vendor-agnostic onboarding workflow
#[derive(Clone)]
pub struct Orchestrator {
    adapters: AdapterSet,
    registrar: Arc<dyn MeshRegistrar>,
    credentials: Arc<dyn CredentialResolver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

/// Tracks the phase of a single call and enforces legal transitions
struct OnboardingRun<'a> {
    descriptor: &'a DeviceDescriptor,
    tags: Vec<String>,
    phase: Phase,
    configure_attempted: bool,
    started_at: DateTime<Utc>,
}

impl<'a> OnboardingRun<'a> {
    fn new(descriptor: &'a DeviceDescriptor) -> Self {
        Self {
            descriptor,
            tags: descriptor.effective_tags(),
            phase: Phase::NotStarted,
            configure_attempted: false,
            started_at: Utc::now(),
        }
    }

    fn advance(&mut self, next: Phase) {
        let checked = self.phase.advance(next);
        debug_assert!(checked.is_ok(), "{:?}", checked);
        debug!("{}: {} -> {}", self.descriptor.device_id(), self.phase, next);
        self.phase = next;
    }

    fn finish(self, result: OutcomeResult) -> OnboardingOutcome {
        OnboardingOutcome {
            device: self.descriptor.device_id().to_string(),
            kind: self.descriptor.kind,
            hostname: self.descriptor.hostname.clone(),
            tags: self.tags,
            phase_reached: self.phase.settled(),
            result,
            configure_attempted: self.configure_attempted,
            attempts: 1,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn fail(self, error: impl Into<OnboardingError>) -> OnboardingOutcome {
        let error = error.into();
        let phase = match self.phase {
            Phase::NotStarted => FailedPhase::Validating,
            Phase::Configuring => FailedPhase::Configuring,
            _ => FailedPhase::Registering,
        };
        debug_assert_eq!(phase, error.phase(), "error raised outside its phase");
        warn!(
            "Onboarding {} failed while {} ({}): {}",
            self.descriptor.device_id(),
            phase,
            if error.is_retryable() { "retryable" } else { "not retryable" },
            error
        );
        self.finish(OutcomeResult::Failed { phase, error })
    }

    fn succeed(mut self, registration: Registration) -> OnboardingOutcome {
        self.advance(Phase::Registered);
        info!(
            "Onboarded {} as {} ({})",
            self.descriptor.device_id(),
            registration.device.hostname,
            registration.status
        );
        self.finish(OutcomeResult::Registered { registration })
    }
}

impl Orchestrator {
    pub fn new(
        adapters: AdapterSet,
        registrar: Arc<dyn MeshRegistrar>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            adapters,
            registrar,
            credentials,
        }
    }

    /// Onboard one device: configure it, then register it.
    ///
    /// Never panics on device or service failures; every failure comes back
    /// in the outcome with the phase it happened in.
    pub async fn onboard(&self, descriptor: &DeviceDescriptor) -> OnboardingOutcome {
        let mut run = OnboardingRun::new(descriptor);

        if let Err(e) = descriptor.validate() {
            return run.fail(e);
        }

        info!(
            "Onboarding {} ({}) at {} as {}",
            descriptor.device_id(),
            descriptor.kind,
            descriptor.target,
            descriptor.hostname
        );

        run.advance(Phase::Configuring);
        run.configure_attempted = true;
        if let Err(e) = self.configure(descriptor).await {
            return run.fail(e);
        }
        run.advance(Phase::Configured);

        self.register(run).await
    }

    /// Re-run only the registration phase for a device an earlier attempt
    /// already configured (outcome `Failed(registering, _)`).
    pub async fn resume_registration(&self, descriptor: &DeviceDescriptor) -> OnboardingOutcome {
        let mut run = OnboardingRun::new(descriptor);

        if let Err(e) = descriptor.validate() {
            return run.fail(e);
        }

        info!("Resuming registration of {} as {}", descriptor.device_id(), descriptor.hostname);
        run.advance(Phase::Configured);
        self.register(run).await
    }

    async fn configure(&self, descriptor: &DeviceDescriptor) -> Result<(), ConfigError> {
        let target = descriptor.target.as_str();
        let adapter = self.adapters.get(descriptor.kind).ok_or_else(|| {
            ConfigError::rejected(
                target,
                "select adapter",
                format!("no adapter registered for {}", descriptor.kind),
            )
        })?;

        let credential = self
            .credentials
            .resolve(&descriptor.credential)
            .map_err(|e| ConfigError::new(target, ConfigErrorKind::Credential(e)))?;

        adapter.configure(descriptor, &credential).await
    }

    async fn register(&self, mut run: OnboardingRun<'_>) -> OnboardingOutcome {
        run.advance(Phase::Registering);
        match self.registrar.register(&run.descriptor.hostname, &run.tags).await {
            Ok(registration) => run.succeed(registration),
            Err(e) => run.fail(e),
        }
    }
}
