//! # rsyslog configuration
//!
//! A small typed model of the RainerScript statements written to
//! `/etc/rsyslog.d/60-audit.conf`. Conditional parts are added or left out as
//! whole statements and parameters; the text is produced once by [`fmt::Display`].

use crate::bundle::ClusterContext;
use crate::constants::HOST_CONFIG_DIR;
use crate::crd::{LoggingRule, RsyslogRelpConfig, TlsLib};
use std::fmt;

const TEMPLATE_NAME: &str = "SyslogForwarderTemplate";
const RELP_RULESET: &str = "relp_action_ruleset";
const STATS_RULESET: &str = "process_stats";
const JOURNAL_SOCKET: &str = "/run/systemd/journal/syslog";
const NODE_EXPORTER_TEXTFILE_DIR: &str = "/var/lib/node-exporter/textfile-collector";
const INDENT: &str = "  ";

/// A parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    List(Vec<String>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{}\"", escape(s)),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "\"{}\"", escape(item))?;
                }
                f.write_str("]")
            }
        }
    }
}

/// `key="value"` pair of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: &'static str,
    pub value: Value,
}

impl Param {
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: Value::Str(value.into()),
        }
    }

    pub fn list(key: &'static str, values: Vec<String>) -> Self {
        Self {
            key,
            value: Value::List(values),
        }
    }
}

/// Entry of a list template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateEntry {
    Constant(String),
    Property {
        name: &'static str,
        date_format: Option<&'static str>,
    },
}

/// Selector of a forwarding rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub programs: Vec<String>,
    pub max_severity: u8,
}

impl From<&LoggingRule> for Filter {
    fn from(rule: &LoggingRule) -> Self {
        Self {
            programs: rule.program_names.clone(),
            max_severity: rule.severity,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.programs.is_empty() {
            write!(f, "$programname == {} and ", Value::List(self.programs.clone()))?;
        }
        write!(f, "$syslogseverity <= {}", self.max_severity)
    }
}

/// A RainerScript statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `module(...)`, `action(...)`, `input(...)`
    Object {
        kind: &'static str,
        params: Vec<Param>,
        inline: bool,
    },
    Template {
        params: Vec<Param>,
        entries: Vec<TemplateEntry>,
    },
    Ruleset {
        name: &'static str,
        body: Vec<Statement>,
    },
    If {
        filter: Filter,
        body: Vec<Statement>,
    },
    Call(&'static str),
    Stop,
}

impl Statement {
    fn object(kind: &'static str, params: Vec<Param>) -> Self {
        Statement::Object {
            kind,
            params,
            inline: false,
        }
    }

    fn inline(kind: &'static str, params: Vec<Param>) -> Self {
        Statement::Object {
            kind,
            params,
            inline: true,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = INDENT.repeat(depth);
        match self {
            Statement::Object {
                kind,
                params,
                inline: true,
            } => {
                write!(f, "{pad}{kind}(")?;
                write_inline(f, params)?;
                writeln!(f, ")")
            }
            Statement::Object { kind, params, .. } => {
                writeln!(f, "{pad}{kind}(")?;
                for param in params {
                    writeln!(f, "{pad}{INDENT}{}={}", param.key, param.value)?;
                }
                writeln!(f, "{pad})")
            }
            Statement::Template { params, entries } => {
                write!(f, "{pad}template(")?;
                write_inline(f, params)?;
                writeln!(f, ") {{")?;
                for entry in entries {
                    match entry {
                        TemplateEntry::Constant(value) => {
                            writeln!(f, "{pad}{INDENT}constant(value={})", Value::Str(value.clone()))?;
                        }
                        TemplateEntry::Property { name, date_format } => {
                            write!(f, "{pad}{INDENT}property(name=\"{name}\"")?;
                            if let Some(format) = date_format {
                                write!(f, " dateFormat=\"{format}\"")?;
                            }
                            writeln!(f, ")")?;
                        }
                    }
                }
                writeln!(f, "{pad}}}")
            }
            Statement::Ruleset { name, body } => {
                writeln!(f, "{pad}ruleset(name=\"{name}\") {{")?;
                for statement in body {
                    statement.write(f, depth + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Statement::If { filter, body } => {
                writeln!(f, "{pad}if {filter} then {{")?;
                for statement in body {
                    statement.write(f, depth + 1)?;
                }
                writeln!(f, "{pad}}}")
            }
            Statement::Call(ruleset) => writeln!(f, "{pad}call {ruleset}"),
            Statement::Stop => writeln!(f, "{pad}stop"),
        }
    }

    /// Rule cascades and one-line module loads are not separated by a blank line
    fn groups_with(&self, next: &Statement) -> bool {
        matches!(
            (self, next),
            (Statement::If { .. }, Statement::If { .. })
                | (
                    Statement::Object {
                        kind: "module",
                        inline: true,
                        ..
                    },
                    Statement::Object { kind: "module", .. }
                )
        )
    }
}

fn write_inline(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}={}", param.key, param.value)?;
    }
    Ok(())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A complete rsyslog configuration file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RsyslogConfig {
    pub statements: Vec<Statement>,
}

impl fmt::Display for RsyslogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.statements.iter().peekable();
        while let Some(statement) = iter.next() {
            statement.write(f, 0)?;
            if let Some(next) = iter.peek() {
                if !statement.groups_with(next) {
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

impl RsyslogConfig {
    /// Build the forwarder configuration
    ///
    /// Rules are emitted in configuration order and each matching rule stops
    /// processing, so the first matching rule wins.
    pub fn forwarder(config: &RsyslogRelpConfig, cluster: &ClusterContext) -> Self {
        let tls = config.enabled_tls();

        let mut omrelp = vec![Param::new("load", "omrelp")];
        if let Some(tls) = tls {
            omrelp.push(Param::new(
                "tls.tlslib",
                tls.tls_lib.unwrap_or(TlsLib::Openssl).as_str(),
            ));
        }

        let mut statements = vec![
            provenance_template(cluster),
            Statement::object("module", omrelp),
            Statement::inline("module", vec![Param::new("load", "omprog")]),
            Statement::object(
                "module",
                vec![
                    Param::new("load", "impstats"),
                    Param::new("interval", "60"),
                    Param::new("format", "json"),
                    Param::new("resetCounters", "off"),
                    Param::new("ruleset", STATS_RULESET),
                    Param::new("bracketing", "on"),
                ],
            ),
            Statement::Ruleset {
                name: STATS_RULESET,
                body: vec![Statement::object(
                    "action",
                    vec![
                        Param::new("type", "omprog"),
                        Param::new("name", "to_pstats_processor"),
                        Param::new(
                            "binary",
                            format!(
                                "{HOST_CONFIG_DIR}/process_rsyslog_pstats.sh -o {NODE_EXPORTER_TEXTFILE_DIR}"
                            ),
                        ),
                    ],
                )],
            },
            Statement::Ruleset {
                name: RELP_RULESET,
                body: vec![Statement::object("action", relp_action(config))],
            },
        ];

        statements.extend(config.logging_rules.iter().map(|rule| Statement::If {
            filter: Filter::from(rule),
            body: vec![Statement::Call(RELP_RULESET), Statement::Stop],
        }));

        statements.push(Statement::inline(
            "input",
            vec![
                Param::new("type", "imuxsock"),
                Param::new("Socket", JOURNAL_SOCKET),
            ],
        ));

        Self { statements }
    }
}

/// Template prefixing every record with the cluster's provenance
fn provenance_template(cluster: &ClusterContext) -> Statement {
    let separator = || TemplateEntry::Constant(" ".to_string());
    let property = |name| TemplateEntry::Property {
        name,
        date_format: None,
    };

    let mut entries = vec![separator()];
    for value in [&cluster.project_name, &cluster.shoot_name, &cluster.shoot_uid] {
        entries.push(TemplateEntry::Constant(value.clone()));
        entries.push(separator());
    }
    for name in ["hostname", "pri", "syslogtag"] {
        entries.push(property(name));
        entries.push(separator());
    }
    entries.push(TemplateEntry::Property {
        name: "timestamp",
        date_format: Some("rfc3339"),
    });
    entries.push(separator());
    for name in ["procid", "msgid", "msg"] {
        entries.push(property(name));
        entries.push(separator());
    }

    Statement::Template {
        params: vec![Param::new("name", TEMPLATE_NAME), Param::new("type", "list")],
        entries,
    }
}

fn relp_action(config: &RsyslogRelpConfig) -> Vec<Param> {
    let mut params = vec![
        Param::new("name", "rsyslog-relp"),
        Param::new("type", "omrelp"),
        Param::new("target", config.target.as_str()),
        Param::new("port", config.port.to_string()),
        Param::new("Template", TEMPLATE_NAME),
    ];

    if let Some(interval) = config.rebind_interval {
        params.push(Param::new("rebindInterval", interval.to_string()));
    }
    if let Some(timeout) = config.timeout {
        params.push(Param::new("timeout", timeout.to_string()));
    }
    if let Some(count) = config.resume_retry_count {
        params.push(Param::new("action.resumeRetryCount", count.to_string()));
    }
    if let Some(report) = config.report_suspension_continuation {
        params.push(Param::new(
            "action.reportSuspensionContinuation",
            if report { "on" } else { "off" },
        ));
    }

    if let Some(tls) = config.enabled_tls() {
        let tls_dir = format!("{HOST_CONFIG_DIR}/tls");
        params.push(Param::new("tls", "on"));
        params.push(Param::new("tls.caCert", format!("{tls_dir}/ca.crt")));
        params.push(Param::new("tls.myCert", format!("{tls_dir}/tls.crt")));
        params.push(Param::new("tls.myPrivKey", format!("{tls_dir}/tls.key")));
        if let Some(mode) = tls.auth_mode {
            params.push(Param::new("tls.authmode", mode.as_str()));
        }
        if !tls.permitted_peer.is_empty() {
            params.push(Param::list("tls.permittedpeer", tls.permitted_peer.clone()));
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AuthMode, Tls};

    fn cluster() -> ClusterContext {
        ClusterContext {
            kubernetes_version: semver::Version::new(1, 27, 2),
            project_name: "test".to_string(),
            shoot_name: "shoot--test--foo".to_string(),
            shoot_uid: "4c4a3ba7-7b3c-4d5d-9c8b-a7e1e3d3f4aa".to_string(),
            psp_admission_disabled: false,
        }
    }

    fn config() -> RsyslogRelpConfig {
        serde_json::from_value(serde_json::json!({
            "target": "localhost",
            "port": 10250,
            "loggingRules": [
                {"severity": 5, "programNames": ["systemd", "audisp-syslog"]},
                {"severity": 7, "programNames": ["kubelet"]},
                {"severity": 2}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_filter_rendering() {
        let with_programs = Filter {
            programs: vec!["systemd".to_string(), "audisp-syslog".to_string()],
            max_severity: 5,
        };
        assert_eq!(
            with_programs.to_string(),
            r#"$programname == ["systemd","audisp-syslog"] and $syslogseverity <= 5"#
        );

        let any_program = Filter {
            programs: vec![],
            max_severity: 2,
        };
        assert_eq!(any_program.to_string(), "$syslogseverity <= 2");
    }

    #[test]
    fn test_rule_cascade_preserves_order() {
        let text = RsyslogConfig::forwarder(&config(), &cluster()).to_string();
        let expected = r#"if $programname == ["systemd","audisp-syslog"] and $syslogseverity <= 5 then {
  call relp_action_ruleset
  stop
}
if $programname == ["kubelet"] and $syslogseverity <= 7 then {
  call relp_action_ruleset
  stop
}
if $syslogseverity <= 2 then {
  call relp_action_ruleset
  stop
}

input(type="imuxsock" Socket="/run/systemd/journal/syslog")
"#;
        assert!(text.ends_with(expected), "unexpected tail:\n{text}");
    }

    #[test]
    fn test_modules_and_template_layout() {
        let text = RsyslogConfig::forwarder(&config(), &cluster()).to_string();
        assert!(text.starts_with(
            "template(name=\"SyslogForwarderTemplate\" type=\"list\") {\n  constant(value=\" \")\n  constant(value=\"test\")\n"
        ));
        assert!(text.contains("  property(name=\"timestamp\" dateFormat=\"rfc3339\")\n"));
        assert!(text.contains("module(\n  load=\"omrelp\"\n)\n\nmodule(load=\"omprog\")\nmodule(\n  load=\"impstats\"\n"));
        assert!(text.contains(
            "ruleset(name=\"process_stats\") {\n  action(\n    type=\"omprog\"\n    name=\"to_pstats_processor\"\n"
        ));
        assert!(!text.contains("tls"));
    }

    #[test]
    fn test_tls_stanza() {
        let mut config = config();
        config.tls = Some(Tls {
            enabled: true,
            secret_reference_name: Some("rsyslog-tls".to_string()),
            auth_mode: Some(AuthMode::Name),
            tls_lib: None,
            permitted_peer: vec!["rsyslog-server.foo".to_string(), "rsyslog-server.foo.bar".to_string()],
        });
        let text = RsyslogConfig::forwarder(&config, &cluster()).to_string();

        assert!(text.contains("module(\n  load=\"omrelp\"\n  tls.tlslib=\"openssl\"\n)\n"));
        let expected = r#"    Template="SyslogForwarderTemplate"
    tls="on"
    tls.caCert="/var/lib/rsyslog-relp-configurator/tls/ca.crt"
    tls.myCert="/var/lib/rsyslog-relp-configurator/tls/tls.crt"
    tls.myPrivKey="/var/lib/rsyslog-relp-configurator/tls/tls.key"
    tls.authmode="name"
    tls.permittedpeer=["rsyslog-server.foo","rsyslog-server.foo.bar"]
  )
"#;
        assert!(text.contains(expected), "unexpected action:\n{text}");
    }

    #[test]
    fn test_tuning_knobs_only_when_set() {
        let mut config = config();
        let text = RsyslogConfig::forwarder(&config, &cluster()).to_string();
        assert!(!text.contains("rebindInterval"));

        config.rebind_interval = Some(1000);
        config.resume_retry_count = Some(-1);
        config.report_suspension_continuation = Some(true);
        let text = RsyslogConfig::forwarder(&config, &cluster()).to_string();
        assert!(text.contains("    rebindInterval=\"1000\"\n"));
        assert!(text.contains("    action.resumeRetryCount=\"-1\"\n"));
        assert!(text.contains("    action.reportSuspensionContinuation=\"on\"\n"));
        assert!(!text.contains("timeout="));
    }

    #[test]
    fn test_provenance_values_are_escaped() {
        let mut cluster = cluster();
        cluster.shoot_name = "we\"ird".to_string();
        let text = RsyslogConfig::forwarder(&config(), &cluster).to_string();
        assert!(text.contains(r#"constant(value="we\"ird")"#));
    }
}
