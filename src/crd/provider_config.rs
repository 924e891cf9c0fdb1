//! # Provider Configuration
//!
//! The rsyslog RELP configuration carried in an Extension's `providerConfig`.

use crate::bundle::BuildError;
use serde::{Deserialize, Serialize};

/// Highest syslog severity value (debug)
const MAX_SEVERITY: u8 = 7;

/// Configuration of the node-level rsyslog RELP forwarder
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RsyslogRelpConfig {
    /// Host of the RELP receiver
    pub target: String,
    /// Port of the RELP receiver
    pub port: u16,
    /// Ordered logging rules, the first matching rule forwards the record
    #[serde(default)]
    pub logging_rules: Vec<LoggingRule>,
    /// TLS settings for the RELP connection
    #[serde(default)]
    pub tls: Option<Tls>,
    /// Number of messages after which the RELP connection is re-established
    #[serde(default)]
    pub rebind_interval: Option<u32>,
    /// RELP session timeout in seconds
    #[serde(default)]
    pub timeout: Option<u32>,
    /// Number of retries before the action is suspended (-1 retries forever)
    #[serde(default)]
    pub resume_retry_count: Option<i32>,
    /// Whether rsyslog reports continuation of action suspension
    #[serde(default)]
    pub report_suspension_continuation: Option<bool>,
    /// auditd rule management on the nodes
    #[serde(default)]
    pub audit_config: Option<AuditConfig>,
}

/// A single logging rule
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggingRule {
    /// Records with this severity or a more urgent one match
    pub severity: u8,
    /// Program names to match, empty matches every program
    #[serde(default)]
    pub program_names: Vec<String>,
}

/// TLS settings for the RELP connection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    pub enabled: bool,
    /// Name of the shoot resource reference pointing at the TLS secret
    #[serde(default)]
    pub secret_reference_name: Option<String>,
    #[serde(default)]
    pub auth_mode: Option<AuthMode>,
    #[serde(default)]
    pub tls_lib: Option<TlsLib>,
    /// Peers accepted by the client when authenticating the server
    #[serde(default)]
    pub permitted_peer: Vec<String>,
}

/// Peer authentication mode of librelp
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Name,
    Fingerprint,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Name => "name",
            AuthMode::Fingerprint => "fingerprint",
        }
    }
}

/// TLS library used by librelp
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TlsLib {
    Openssl,
    Gnutls,
}

impl TlsLib {
    pub fn as_str(self) -> &'static str {
        match self {
            TlsLib::Openssl => "openssl",
            TlsLib::Gnutls => "gnutls",
        }
    }
}

/// auditd rule management
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    pub enabled: bool,
}

impl RsyslogRelpConfig {
    /// TLS settings, only when enabled
    pub fn enabled_tls(&self) -> Option<&Tls> {
        self.tls.as_ref().filter(|t| t.enabled)
    }

    /// auditd rules are managed unless explicitly disabled
    pub fn audit_enabled(&self) -> bool {
        self.audit_config.as_ref().is_none_or(|a| a.enabled)
    }

    /// Validate the configuration, reporting the first offending field
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.target.trim().is_empty() {
            return Err(BuildError::invalid("providerConfig.target", "must not be empty"));
        }
        if self.port == 0 {
            return Err(BuildError::invalid("providerConfig.port", "must be greater than 0"));
        }

        for (i, rule) in self.logging_rules.iter().enumerate() {
            if rule.severity > MAX_SEVERITY {
                return Err(BuildError::invalid(
                    format!("providerConfig.loggingRules[{i}].severity"),
                    format!("must be between 0 and {MAX_SEVERITY}, got {}", rule.severity),
                ));
            }
            for (j, program) in rule.program_names.iter().enumerate() {
                if program.is_empty() || program.contains(['"', ',']) {
                    return Err(BuildError::invalid(
                        format!("providerConfig.loggingRules[{i}].programNames[{j}]"),
                        "must be a non-empty name without quotes or commas",
                    ));
                }
            }
        }

        if let Some(tls) = self.enabled_tls() {
            if tls
                .secret_reference_name
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
            {
                return Err(BuildError::invalid(
                    "providerConfig.tls.secretReferenceName",
                    "must be set when TLS is enabled",
                ));
            }
            for (i, peer) in tls.permitted_peer.iter().enumerate() {
                if peer.is_empty() || peer.contains('"') {
                    return Err(BuildError::invalid(
                        format!("providerConfig.tls.permittedPeer[{i}]"),
                        "must be a non-empty name without quotes",
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RsyslogRelpConfig {
        serde_json::from_value(serde_json::json!({
            "target": "localhost",
            "port": 10250,
            "loggingRules": [
                {"severity": 5, "programNames": ["systemd", "audisp-syslog"]},
                {"severity": 2}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_deserialize_defaults() {
        let config = config();
        assert_eq!(config.logging_rules[1].program_names.len(), 0);
        assert!(config.enabled_tls().is_none());
        assert!(config.audit_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_severity_reports_field_path() {
        let mut config = config();
        config.logging_rules[1].severity = 8;
        let err = config.validate().unwrap_err();
        assert_eq!(err.path(), "providerConfig.loggingRules[1].severity");
    }

    #[test]
    fn test_validate_program_name_with_quote() {
        let mut config = config();
        config.logging_rules[0].program_names.push("bad\"name".to_string());
        let err = config.validate().unwrap_err();
        assert_eq!(err.path(), "providerConfig.loggingRules[0].programNames[2]");
    }

    #[test]
    fn test_validate_tls_requires_secret_reference() {
        let mut config = config();
        config.tls = Some(Tls {
            enabled: true,
            secret_reference_name: None,
            auth_mode: Some(AuthMode::Name),
            tls_lib: None,
            permitted_peer: vec![],
        });
        let err = config.validate().unwrap_err();
        assert_eq!(err.path(), "providerConfig.tls.secretReferenceName");

        // Disabled TLS does not need a reference
        config.tls.as_mut().unwrap().enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_target() {
        let mut config = config();
        config.target = "  ".to_string();
        assert_eq!(config.validate().unwrap_err().path(), "providerConfig.target");
    }

    #[test]
    fn test_auth_mode_and_tls_lib_wire_names() {
        let tls: Tls = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "secretReferenceName": "rsyslog-tls",
            "authMode": "fingerprint",
            "tlsLib": "gnutls"
        }))
        .unwrap();
        assert_eq!(tls.auth_mode.unwrap().as_str(), "fingerprint");
        assert_eq!(tls.tls_lib.unwrap().as_str(), "gnutls");
    }
}
