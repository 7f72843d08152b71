//! Core types for Meshboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix every mesh ACL tag carries
pub const TAG_PREFIX: &str = "tag:";

/// Device family, which also selects the adapter used to configure it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "cisco-switch")]
    CiscoSwitch,
    #[serde(rename = "paloalto-firewall")]
    PaloAltoFirewall,
    #[serde(rename = "pfsense-firewall")]
    PfSenseFirewall,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [
        DeviceKind::CiscoSwitch,
        DeviceKind::PaloAltoFirewall,
        DeviceKind::PfSenseFirewall,
    ];

    /// Tag identifying the device class in the mesh
    pub fn default_tag(&self) -> &'static str {
        match self {
            DeviceKind::CiscoSwitch => "tag:cisco-switch",
            DeviceKind::PaloAltoFirewall => "tag:paloalto-firewall",
            DeviceKind::PfSenseFirewall => "tag:pfsense-firewall",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::CiscoSwitch => write!(f, "cisco-switch"),
            DeviceKind::PaloAltoFirewall => write!(f, "paloalto-firewall"),
            DeviceKind::PfSenseFirewall => write!(f, "pfsense-firewall"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cisco-switch" | "cisco_switch" | "cisco" => Ok(DeviceKind::CiscoSwitch),
            "paloalto-firewall" | "paloalto_firewall" | "paloalto" | "palo-alto" => {
                Ok(DeviceKind::PaloAltoFirewall)
            }
            "pfsense-firewall" | "pfsense_firewall" | "pfsense" => Ok(DeviceKind::PfSenseFirewall),
            other => Err(format!(
                "unknown device kind '{}' (expected cisco-switch, paloalto-firewall or pfsense-firewall)",
                other
            )),
        }
    }
}

/// Device record held by the mesh coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshDevice {
    /// Service-assigned identifier, when the service returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Service-assigned creation time
    pub created: DateTime<Utc>,
}

impl MeshDevice {
    /// True if every requested tag is already present on this record
    pub fn covers_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// Whether a registration created a record or found an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Created,
    AlreadyRegistered,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStatus::Created => write!(f, "created"),
            RegistrationStatus::AlreadyRegistered => write!(f, "already registered"),
        }
    }
}

/// Successful result of a registrar call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub device: MeshDevice,
    pub status: RegistrationStatus,
}

/// Union a device-class default tag with caller-supplied tags.
///
/// The default tag always comes first; extra tags keep their order and
/// duplicates are dropped.
pub fn merge_tags(default_tag: &str, extra: &[String]) -> Vec<String> {
    let mut tags = Vec::with_capacity(extra.len() + 1);
    tags.push(default_tag.to_string());
    for tag in extra {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tags() {
        assert_eq!(DeviceKind::CiscoSwitch.default_tag(), "tag:cisco-switch");
        assert_eq!(DeviceKind::PaloAltoFirewall.default_tag(), "tag:paloalto-firewall");
        assert_eq!(DeviceKind::PfSenseFirewall.default_tag(), "tag:pfsense-firewall");
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in DeviceKind::ALL {
            assert_eq!(kind.to_string().parse::<DeviceKind>().unwrap(), kind);
        }
        assert_eq!("pfsense".parse::<DeviceKind>().unwrap(), DeviceKind::PfSenseFirewall);
        assert!("juniper".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn test_kind_serde_matches_display() {
        for kind in DeviceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_merge_tags_union() {
        let extra = vec![
            "tag:site-a".to_string(),
            "tag:cisco-switch".to_string(),
            "tag:site-a".to_string(),
            "tag:core".to_string(),
        ];
        let tags = merge_tags("tag:cisco-switch", &extra);
        assert_eq!(tags, vec!["tag:cisco-switch", "tag:site-a", "tag:core"]);
    }

    #[test]
    fn test_merge_tags_empty_extra() {
        assert_eq!(merge_tags("tag:pfsense-firewall", &[]), vec!["tag:pfsense-firewall"]);
    }

    #[test]
    fn test_covers_tags() {
        let device = MeshDevice {
            id: None,
            hostname: "fw-01".into(),
            tags: vec!["tag:pfsense-firewall".into(), "tag:edge".into()],
            created: Utc::now(),
        };
        assert!(device.covers_tags(&["tag:edge".into()]));
        assert!(!device.covers_tags(&["tag:core".into()]));
    }
}
