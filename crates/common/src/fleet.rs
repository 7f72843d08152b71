//! Fleet driver
//!
//! Runs the orchestrator over an inventory with a bounded number of devices in
//! flight. One device failing never stops the others. Retryable failures can
//! be retried: a registration failure resumes from registration, anything
//! else re-runs the whole onboarding.

use crate::config::FleetConfig;
use crate::descriptor::DeviceDescriptor;
use crate::error::FailedPhase;
use crate::orchestrator::Orchestrator;
use crate::outcome::OnboardingOutcome;
use crate::types::RegistrationStatus;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Default number of devices onboarded at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How the driver retries retryable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Fixed wait before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }
}

/// Onboards many devices through one [`Orchestrator`]
#[derive(Debug, Clone)]
pub struct FleetDriver {
    orchestrator: Orchestrator,
    concurrency: usize,
    retry: RetryPolicy,
}

impl FleetDriver {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(orchestrator: Orchestrator, config: &FleetConfig) -> Self {
        Self::new(orchestrator)
            .with_concurrency(config.concurrency)
            .with_retry_policy(RetryPolicy::from_config(config))
    }

    /// At least one device is always in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Onboard every device. Outcomes come back in inventory order.
    pub async fn run(&self, devices: &[DeviceDescriptor]) -> FleetReport {
        let started_at = Utc::now();
        info!(
            "Onboarding {} devices ({} at a time, {} retries)",
            devices.len(),
            self.concurrency,
            self.retry.max_retries
        );

        let mut indexed: Vec<(usize, OnboardingOutcome)> = stream::iter(devices.iter().enumerate())
            .map(|(idx, descriptor)| async move { (idx, self.onboard_with_retry(descriptor).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let report = FleetReport {
            outcomes: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
            started_at,
            finished_at: Utc::now(),
        };
        let summary = report.summary();
        info!(
            "Fleet run finished: {} registered, {} failed of {}",
            summary.registered, summary.failed, summary.total
        );
        report
    }

    async fn onboard_with_retry(&self, descriptor: &DeviceDescriptor) -> OnboardingOutcome {
        let started_at = Utc::now();
        let mut outcome = self.orchestrator.onboard(descriptor).await;
        let mut attempts = 1u32;
        let mut configure_attempted = outcome.configure_attempted;

        while attempts <= self.retry.max_retries && outcome.is_retryable() {
            let resume = outcome.failed_phase() == Some(FailedPhase::Registering);
            warn!(
                "Retrying {} ({}/{}) from {} in {:?}",
                descriptor.device_id(),
                attempts,
                self.retry.max_retries,
                if resume { "registration" } else { "configuration" },
                self.retry.backoff
            );
            if !self.retry.backoff.is_zero() {
                tokio::time::sleep(self.retry.backoff).await;
            }

            outcome = if resume {
                self.orchestrator.resume_registration(descriptor).await
            } else {
                self.orchestrator.onboard(descriptor).await
            };
            configure_attempted |= outcome.configure_attempted;
            attempts += 1;
        }

        outcome.attempts = attempts;
        outcome.configure_attempted = configure_attempted;
        outcome.started_at = started_at;
        outcome
    }
}

/// Result of a fleet run
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub outcomes: Vec<OnboardingOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Counts over a [`FleetReport`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub registered: usize,
    pub created: usize,
    pub already_registered: usize,
    pub failed: usize,
    /// Failed after the device was configured
    pub configured_unregistered: usize,
    /// Failed with an error a later run may clear
    pub retryable: usize,
}

impl FleetReport {
    pub fn registered(&self) -> impl Iterator<Item = &OnboardingOutcome> {
        self.outcomes.iter().filter(|o| o.is_registered())
    }

    pub fn failed(&self) -> impl Iterator<Item = &OnboardingOutcome> {
        self.outcomes.iter().filter(|o| !o.is_registered())
    }

    pub fn all_registered(&self) -> bool {
        self.outcomes.iter().all(OnboardingOutcome::is_registered)
    }

    pub fn summary(&self) -> FleetSummary {
        let mut summary = FleetSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for outcome in &self.outcomes {
            match outcome.registration_status() {
                Some(RegistrationStatus::Created) => {
                    summary.registered += 1;
                    summary.created += 1;
                }
                Some(RegistrationStatus::AlreadyRegistered) => {
                    summary.registered += 1;
                    summary.already_registered += 1;
                }
                None => {
                    summary.failed += 1;
                    if outcome.configured_but_unregistered() {
                        summary.configured_unregistered += 1;
                    }
                    if outcome.is_retryable() {
                        summary.retryable += 1;
                    }
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterSet;
    use crate::credentials::{Credential, StaticCredentialResolver};
    use crate::error::{ConfigError, ConfigErrorKind, RegistrationError};
    use crate::outcome::Phase;
    use crate::testing::{MockAdapter, MockRegistrar};
    use crate::types::DeviceKind;
    use std::sync::Arc;

    fn driver(adapter: MockAdapter, registrar: MockRegistrar) -> (FleetDriver, Arc<MockAdapter>, Arc<MockRegistrar>) {
        let adapter = Arc::new(adapter);
        let registrar = Arc::new(registrar);
        let mut adapters = AdapterSet::new();
        adapters.insert(adapter.clone());
        let credentials = StaticCredentialResolver::new().with(
            "lab",
            Credential::Password {
                username: "admin".into(),
                password: "secret".into(),
            },
        );
        let orchestrator = Orchestrator::new(adapters, registrar.clone(), Arc::new(credentials));
        (FleetDriver::new(orchestrator), adapter, registrar)
    }

    fn switch(n: usize) -> DeviceDescriptor {
        DeviceDescriptor::new(DeviceKind::CiscoSwitch, format!("10.0.0.{n}"), "lab", format!("sw-{n:02}"))
    }

    fn no_wait(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_outcomes_keep_inventory_order() {
        let (driver, _, _) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch).with_delay(Duration::from_millis(5)),
            MockRegistrar::new(),
        );
        let devices: Vec<_> = (1..=6).map(switch).collect();

        let report = driver.with_concurrency(3).run(&devices).await;

        let hostnames: Vec<_> = report.outcomes.iter().map(|o| o.hostname.as_str()).collect();
        assert_eq!(hostnames, vec!["sw-01", "sw-02", "sw-03", "sw-04", "sw-05", "sw-06"]);
        assert!(report.all_registered());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (driver, adapter, _) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch).with_delay(Duration::from_millis(20)),
            MockRegistrar::new(),
        );
        let devices: Vec<_> = (1..=8).map(switch).collect();

        driver.with_concurrency(2).run(&devices).await;

        assert_eq!(adapter.configure_calls(), 8);
        assert_eq!(adapter.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort_run() {
        let (driver, _, registrar) = driver(MockAdapter::new(DeviceKind::CiscoSwitch), MockRegistrar::new());
        let mut bad = switch(2);
        bad.hostname = "sw_02".into();
        let devices = vec![switch(1), bad, switch(3)];

        let report = driver.run(&devices).await;
        let summary = report.summary();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.registered, 2);
        assert_eq!(summary.failed, 1);
        let failed = report.failed().next().unwrap();
        assert_eq!(failed.hostname, "sw_02");
        assert_eq!(failed.failed_phase(), Some(FailedPhase::Validating));
        assert_eq!(registrar.register_calls(), 2);
    }

    #[tokio::test]
    async fn test_registration_retry_resumes_without_reconfiguring() {
        let (driver, adapter, registrar) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch),
            MockRegistrar::new().fail_next(RegistrationError::Rejected {
                hostname: "sw-01".into(),
                status: 503,
                body: "maintenance".into(),
            }),
        );

        let report = driver.with_retry_policy(no_wait(2)).run(&[switch(1)]).await;
        let outcome = &report.outcomes[0];

        assert!(outcome.is_registered(), "{}", outcome.summary());
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.configure_attempted);
        assert_eq!(adapter.configure_calls(), 1);
        assert_eq!(registrar.register_calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_never_retried() {
        let (driver, adapter, registrar) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch),
            MockRegistrar::new().fail_next(RegistrationError::Auth {
                hostname: "sw-01".into(),
                status: 401,
            }),
        );

        let report = driver.with_retry_policy(no_wait(3)).run(&[switch(1)]).await;
        let outcome = &report.outcomes[0];

        assert_eq!(outcome.failed_phase(), Some(FailedPhase::Registering));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(adapter.configure_calls(), 1);
        assert_eq!(registrar.register_calls(), 1);
        assert_eq!(report.summary().configured_unregistered, 1);
    }

    #[tokio::test]
    async fn test_configure_timeout_retries_full_onboarding() {
        let (driver, adapter, registrar) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch)
                .fail_next(ConfigError::new("10.0.0.1", ConfigErrorKind::Timeout { seconds: 30 })),
            MockRegistrar::new(),
        );

        let report = driver.with_retry_policy(no_wait(1)).run(&[switch(1)]).await;
        let outcome = &report.outcomes[0];

        assert!(outcome.is_registered());
        assert_eq!(outcome.phase_reached, Phase::Registered);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(adapter.configure_calls(), 2);
        assert_eq!(registrar.register_calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let (driver, adapter, _) = driver(
            MockAdapter::new(DeviceKind::CiscoSwitch).fail_with(ConfigError::transport("10.0.0.1", "no route to host")),
            MockRegistrar::new(),
        );

        let report = driver.with_retry_policy(no_wait(2)).run(&[switch(1)]).await;

        assert_eq!(report.outcomes[0].attempts, 3);
        assert_eq!(adapter.configure_calls(), 3);
        assert_eq!(report.summary().retryable, 1);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = FleetConfig {
            concurrency: 8,
            max_retries: 2,
            retry_backoff_secs: 1,
        };
        assert_eq!(RetryPolicy::from_config(&config), RetryPolicy::new(2, Duration::from_secs(1)));
        assert_eq!(RetryPolicy::default().max_retries, 0);
    }
}
