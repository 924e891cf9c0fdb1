//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Extension type handled by this controller (`spec.type` of the Extension)
pub const DEFAULT_EXTENSION_TYPE: &str = "shoot-rsyslog-relp";

/// Finalizer guarding removal of the Extension until host cleanup is verified
pub const FINALIZER: &str = "extensions.gardener.cloud/shoot-rsyslog-relp";

/// Field manager used for status and metadata patches
pub const FIELD_MANAGER: &str = "rsyslog-relp-controller";

/// Namespace on the target cluster where all node-level workloads run
pub const TARGET_NAMESPACE: &str = "kube-system";

/// Component name of the configuration bundle
pub const CONFIGURATOR_NAME: &str = "rsyslog-relp-configurator";

/// Component name of the cleanup bundle
pub const CLEANER_NAME: &str = "rsyslog-relp-configuration-cleaner";

/// Name of the published configuration bundle handle
pub const CONFIGURATION_HANDLE_NAME: &str = "extension-shoot-rsyslog-relp-shoot";

/// Name of the published cleanup bundle handle
pub const CLEANUP_HANDLE_NAME: &str = "extension-shoot-rsyslog-relp-configuration-cleaner-shoot";

/// Label carrying the bundle kind on published handles
pub const BUNDLE_KIND_LABEL: &str = "rsyslog-relp.extensions.gardener.cloud/bundle-kind";

/// Prefix of the secret that holds a published bundle's manifests
pub const BUNDLE_SECRET_PREFIX: &str = "managedresource-";

/// Prefix under which referenced shoot resources are copied into the extension namespace
pub const REFERENCED_RESOURCE_PREFIX: &str = "ref-";

/// First Kubernetes minor version (1.x) without the PodSecurityPolicy API
pub const PSP_REMOVED_MINOR_VERSION: u64 = 25;

/// Priority class of the node-level DaemonSets
pub const PRIORITY_CLASS_NAME: &str = "gardener-shoot-system-700";

/// Image of the init containers copying configuration onto the host
pub const ALPINE_IMAGE: &str = "eu.gcr.io/gardener-project/3rd/alpine:3.18.4";

/// Image of the long-running pause containers
pub const PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.9";

/// Host directory holding the configurator's files
pub const HOST_CONFIG_DIR: &str = "/var/lib/rsyslog-relp-configurator";

/// Default interval between health gate evaluations (seconds)
pub const DEFAULT_HEALTH_POLL_INTERVAL_SECS: u64 = 5;

/// Default time after which a non-healthy cleanup bundle is reported as overdue (seconds)
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 600;

/// Default resync interval for active extensions (seconds)
/// Every pass re-renders and re-publishes, so drift is repaired at this cadence
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Default number of re-read attempts when a publish hits an optimistic-concurrency conflict
pub const DEFAULT_STORE_CONFLICT_RETRIES: u32 = 5;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default delay before restarting watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default maximum number of concurrent reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;
