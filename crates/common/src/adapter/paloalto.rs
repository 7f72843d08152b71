//! Palo Alto firewall adapter
//!
//! One XML API `set` call inserting a static route for the mesh address
//! range. `set` merges into the candidate config, so repeating it is a no-op.
//! Success needs a 2xx status and a `<response status="success">` root;
//! the body is parsed, not substring-matched.

use super::{base_url, http_client, truncate_body, DeviceAdapter};
use crate::config::PaloAltoConfig;
use crate::credentials::Credential;
use crate::descriptor::DeviceDescriptor;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::types::DeviceKind;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::time::Duration;
use tracing::{debug, info};

const STEP: &str = "set static route";

/// PAN-OS error code for invalid credentials
const PAN_CODE_FORBIDDEN: &str = "403";

/// Palo Alto XML API adapter
#[derive(Debug, Clone)]
pub struct PaloAltoAdapter {
    config: PaloAltoConfig,
}

/// Parsed `<response>` envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanResponse {
    pub status: String,
    pub code: Option<String>,
    pub messages: Vec<String>,
}

impl PanResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    pub fn message(&self) -> String {
        if self.messages.is_empty() {
            format!("status={}", self.status)
        } else {
            self.messages.join("; ")
        }
    }
}

impl PaloAltoAdapter {
    pub fn new(config: PaloAltoConfig) -> Self {
        Self { config }
    }

    /// Config-tree location of the route entry
    pub fn xpath(&self) -> String {
        format!(
            "/config/devices/entry[@name='{}']/network/virtual-router/entry[@name='{}']/routing-table/ip/static-route/entry[@name='{}']",
            self.config.device_entry, self.config.virtual_router, self.config.route_name
        )
    }

    /// Route element body
    pub fn element(&self) -> String {
        format!(
            "<destination>{}</destination><nexthop><ip-address>{}</ip-address></nexthop><interface>{}</interface><metric>{}</metric>",
            self.config.destination, self.config.nexthop, self.config.interface, self.config.metric
        )
    }
}

#[async_trait]
impl DeviceAdapter for PaloAltoAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::PaloAltoFirewall
    }

    async fn configure(
        &self,
        descriptor: &DeviceDescriptor,
        credential: &Credential,
    ) -> Result<(), ConfigError> {
        let target = descriptor.target.as_str();
        let key = credential
            .api_key(&descriptor.credential)
            .map_err(|e| ConfigError::new(target, ConfigErrorKind::Credential(e)))?;

        let timeout_secs = self.config.timeout_secs;
        let client = http_client(Duration::from_secs(timeout_secs), self.config.accept_invalid_certs)
            .map_err(|e| ConfigError::transport(target, e))?;

        let url = format!("{}/api/", base_url(target));
        let xpath = self.xpath();
        let element = self.element();
        debug!("PAN-OS set {} on {}", xpath, url);

        // The key rides in the query string; strip URLs from transport errors.
        let response = client
            .get(&url)
            .query(&[
                ("type", "config"),
                ("action", "set"),
                ("xpath", xpath.as_str()),
                ("element", element.as_str()),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| ConfigError::from_http(target, &e.without_url(), timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConfigError::from_http(target, &e.without_url(), timeout_secs))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ConfigError::new(
                target,
                ConfigErrorKind::Auth(format!("HTTP {}", status.as_u16())),
            ));
        }

        let parsed = parse_response(&body);
        if !status.is_success() {
            let detail = match &parsed {
                Ok(r) => r.message(),
                Err(_) => truncate_body(&body),
            };
            return Err(ConfigError::rejected(target, STEP, format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        match parsed {
            Ok(r) if r.is_success() => {
                info!("Static route {} present on Palo Alto firewall {}", self.config.route_name, target);
                Ok(())
            }
            Ok(r) if r.code.as_deref() == Some(PAN_CODE_FORBIDDEN) => {
                Err(ConfigError::new(target, ConfigErrorKind::Auth(r.message())))
            }
            Ok(r) => Err(ConfigError::rejected(target, STEP, r.message())),
            Err(e) => Err(ConfigError::rejected(target, STEP, format!("unreadable response: {e}"))),
        }
    }
}

/// Parse a PAN-OS `<response>` envelope, collecting all `<msg>` text
pub fn parse_response(body: &str) -> Result<PanResponse, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut response: Option<PanResponse> = None;
    let mut msg_depth = 0usize;
    let mut messages = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"response" && response.is_none() {
                    response = Some(envelope(&e)?);
                } else if e.name().as_ref() == b"msg" {
                    msg_depth += 1;
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"response" && response.is_none() {
                    response = Some(envelope(&e)?);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"msg" {
                    msg_depth = msg_depth.saturating_sub(1);
                }
            }
            Ok(Event::Text(t)) if msg_depth > 0 => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                if !text.trim().is_empty() {
                    messages.push(text.trim().to_string());
                }
            }
            Ok(Event::CData(c)) if msg_depth > 0 => {
                let text = String::from_utf8_lossy(&c.into_inner()).trim().to_string();
                if !text.is_empty() {
                    messages.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed XML at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }

    let mut response = response.ok_or_else(|| "no <response> element".to_string())?;
    response.messages = messages;
    Ok(response)
}

fn envelope(e: &BytesStart) -> Result<PanResponse, String> {
    let status = attribute(e, "status")?.ok_or_else(|| "<response> has no status attribute".to_string())?;
    Ok(PanResponse {
        status,
        code: attribute(e, "code")?,
        messages: Vec::new(),
    })
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, String> {
    match e.try_get_attribute(name) {
        Ok(Some(attr)) => attr
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|err| err.to_string()),
        Ok(None) => Ok(None),
        Err(err) => Err(err.to_string()),
    }
}
