//! Full onboarding runs with real adapters and registrar over mock HTTP

use std::sync::Arc;
use std::time::Duration;

use meshboard_common::config::{PfSenseConfig, RegistrarConfig};
use meshboard_common::{
    AdapterSet, Credential, DeviceDescriptor, DeviceKind, FailedPhase, FleetDriver, HttpRegistrar,
    OnboardingError, Orchestrator, Phase, RegistrationError, RegistrationStatus, RetryPolicy,
    StaticCredentialResolver,
};
use meshboard_common::adapter::PfSenseAdapter;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    firewall: MockServer,
    mesh: MockServer,
}

impl Harness {
    async fn start() -> Self {
        let harness = Self {
            firewall: MockServer::start().await,
            mesh: MockServer::start().await,
        };
        Mock::given(method("POST"))
            .and(path("/packages/install"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "code": 200 })))
            .expect(1)
            .mount(&harness.firewall)
            .await;
        Mock::given(method("POST"))
            .and(path("/services/tailscale"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok", "code": 200 })))
            .expect(1)
            .mount(&harness.firewall)
            .await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
            .mount(&harness.mesh)
            .await;
        harness
    }

    fn orchestrator(&self) -> Orchestrator {
        let adapters = AdapterSet::new().with(PfSenseAdapter::new(PfSenseConfig {
            timeout_secs: 5,
            ..Default::default()
        }));
        let registrar = HttpRegistrar::new(
            &RegistrarConfig {
                api_url: self.mesh.uri(),
                timeout_secs: 5,
                ..Default::default()
            },
            "mesh-key",
        )
        .unwrap();
        let credentials = StaticCredentialResolver::new().with(
            "pfsense-api",
            Credential::ApiKeyPair {
                key: "client".into(),
                secret: "token".into(),
            },
        );
        Orchestrator::new(adapters, Arc::new(registrar), Arc::new(credentials))
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(DeviceKind::PfSenseFirewall, self.firewall.uri(), "pfsense-api", "fw-01")
            .with_name("edge-fw")
            .with_tags(vec!["tag:site-a".into()])
    }
}

#[tokio::test]
async fn test_pfsense_device_is_configured_and_registered() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/devices"))
        .and(body_json(json!({ "hostname": "fw-01", "tags": ["tag:pfsense-firewall", "tag:site-a"] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "n42",
            "hostname": "fw-01",
            "tags": ["tag:pfsense-firewall", "tag:site-a"],
            "created": "2024-05-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&harness.mesh)
        .await;

    let outcome = harness.orchestrator().onboard(&harness.descriptor()).await;

    assert!(outcome.is_registered(), "{}", outcome.summary());
    assert_eq!(outcome.device, "edge-fw");
    assert_eq!(outcome.phase_reached, Phase::Registered);
    assert_eq!(outcome.registration_status(), Some(RegistrationStatus::Created));
    assert_eq!(outcome.mesh_device().and_then(|d| d.id.clone()), Some("n42".into()));
}

#[tokio::test]
async fn test_rejected_mesh_key_leaves_device_configured() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.mesh)
        .await;

    let outcome = harness.orchestrator().onboard(&harness.descriptor()).await;

    assert_eq!(outcome.failed_phase(), Some(FailedPhase::Registering));
    assert!(matches!(
        outcome.error(),
        Some(OnboardingError::Registration(RegistrationError::Auth { status: 401, .. }))
    ));
    assert!(outcome.configured_but_unregistered());
    assert!(outcome.configure_attempted);
}

#[tokio::test]
async fn test_fleet_retry_resumes_registration_only() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .up_to_n_times(1)
        .mount(&harness.mesh)
        .await;
    Mock::given(method("POST"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "hostname": "fw-01",
            "tags": ["tag:pfsense-firewall", "tag:site-a"],
            "created": "2024-05-01T10:00:00Z"
        })))
        .mount(&harness.mesh)
        .await;

    let driver = FleetDriver::new(harness.orchestrator())
        .with_retry_policy(RetryPolicy::new(1, Duration::from_millis(10)));
    let report = driver.run(&[harness.descriptor()]).await;

    let outcome = &report.outcomes[0];
    assert!(outcome.is_registered(), "{}", outcome.summary());
    assert_eq!(outcome.attempts, 2);
    assert!(report.all_registered());
    // The firewall mocks expect exactly one install and one start.
}
