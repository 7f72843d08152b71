//! In-memory doubles for adapters, shells and the mesh registrar

use crate::adapter::{CommandOutput, DeviceAdapter, ShellSession, ShellTransport};
use crate::credentials::Credential;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ConfigError, RegistrationError};
use crate::registrar::MeshRegistrar;
use crate::types::{DeviceKind, MeshDevice, Registration, RegistrationStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Adapter that records calls and fails on demand
pub struct MockAdapter {
    kind: DeviceKind,
    failures: Mutex<VecDeque<ConfigError>>,
    always_fail: Option<ConfigError>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl MockAdapter {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            failures: Mutex::new(VecDeque::new()),
            always_fail: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with `error`
    pub fn fail_with(mut self, error: ConfigError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Fail the next call with `error`; queued failures are used in order
    pub fn fail_next(mut self, error: ConfigError) -> Self {
        self.failures.get_mut().push_back(error);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn configure_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `configure` calls seen
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Targets in call order
    pub async fn targets(&self) -> Vec<String> {
        self.targets.lock().await.clone()
    }
}

#[async_trait]
impl DeviceAdapter for MockAdapter {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn configure(&self, descriptor: &DeviceDescriptor, _credential: &Credential) -> Result<(), ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.targets.lock().await.push(descriptor.target.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self.failures.lock().await.pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match queued.or_else(|| self.always_fail.clone()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// In-memory registrar with the same idempotency rules as the HTTP one
#[derive(Default)]
pub struct MockRegistrar {
    devices: Mutex<HashMap<String, MeshDevice>>,
    failures: Mutex<VecDeque<RegistrationError>>,
    calls: AtomicUsize,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record
    pub fn with_device(mut self, device: MeshDevice) -> Self {
        self.devices.get_mut().insert(device.hostname.clone(), device);
        self
    }

    /// Fail the next `register` call with `error`
    pub fn fail_next(mut self, error: RegistrationError) -> Self {
        self.failures.get_mut().push_back(error);
        self
    }

    pub fn register_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn device_count(&self) -> usize {
        self.devices.lock().await.len()
    }
}

#[async_trait]
impl MeshRegistrar for MockRegistrar {
    async fn register(&self, hostname: &str, tags: &[String]) -> Result<Registration, RegistrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let mut devices = self.devices.lock().await;
        if let Some(existing) = devices.get(hostname) {
            if existing.covers_tags(tags) {
                return Ok(Registration {
                    device: existing.clone(),
                    status: RegistrationStatus::AlreadyRegistered,
                });
            }
            return Err(RegistrationError::AlreadyRegistered {
                hostname: hostname.to_string(),
                existing_tags: existing.tags.clone(),
            });
        }

        let device = MeshDevice {
            id: Some(format!("node-{}", devices.len() + 1)),
            hostname: hostname.to_string(),
            tags: tags.to_vec(),
            created: Utc::now(),
        };
        devices.insert(hostname.to_string(), device.clone());
        Ok(Registration {
            device,
            status: RegistrationStatus::Created,
        })
    }

    async fn lookup(&self, hostname: &str) -> Result<Option<MeshDevice>, RegistrationError> {
        Ok(self.devices.lock().await.get(hostname).cloned())
    }

    async fn list(&self) -> Result<Vec<MeshDevice>, RegistrationError> {
        let mut devices: Vec<MeshDevice> = self.devices.lock().await.values().cloned().collect();
        devices.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(devices)
    }
}

/// Scripted answer to one command
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Output(CommandOutput),
    Error(ConfigError),
}

/// Shell transport that answers commands from a script. Commands without a
/// scripted reply succeed with empty output.
#[derive(Default)]
pub struct ScriptedShell {
    replies: Arc<HashMap<String, ScriptedReply>>,
    open_error: Option<ConfigError>,
    sent: Arc<Mutex<Vec<String>>>,
    last_login: Mutex<Option<String>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: impl Into<String>, reply: ScriptedReply) -> Self {
        Arc::make_mut(&mut self.replies).insert(command.into(), reply);
        self
    }

    /// Refuse to open sessions
    pub fn fail_open(mut self, error: ConfigError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Commands sent across all sessions, in order
    pub async fn sent(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn last_login(&self) -> Option<String> {
        self.last_login.lock().await.clone()
    }
}

struct ScriptedSession {
    replies: Arc<HashMap<String, ScriptedReply>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ShellTransport for ScriptedShell {
    async fn open(&self, _target: &str, username: &str, _password: &str) -> Result<Box<dyn ShellSession>, ConfigError> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_login.lock().await = Some(username.to_string());
        Ok(Box::new(ScriptedSession {
            replies: self.replies.clone(),
            sent: self.sent.clone(),
            closed: self.closed.clone(),
        }))
    }
}

#[async_trait]
impl ShellSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, ConfigError> {
        self.sent.lock().await.push(command.to_string());
        match self.replies.get(command) {
            Some(ScriptedReply::Output(output)) => Ok(output.clone()),
            Some(ScriptedReply::Error(error)) => Err(error.clone()),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
