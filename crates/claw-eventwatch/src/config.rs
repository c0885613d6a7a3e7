//! Watcher configuration.
//!
//! All settings come from command-line flags or their environment variable
//! fallbacks and are read exactly once at startup:
//! - Deployment environment label and severity threshold for messages
//! - Slack channel, token and API endpoint
//! - Classifier rules (noisy components, backoff escalation count)
//! - Cluster API discovery (in-cluster service account or explicit server)
//!
//! [`ConfigArgs`] is the raw clap surface; [`WatcherConfig`] is the validated
//! value handed to the notifier, classifier and event source constructors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use claw_events::{
    ClassifierConfig, DEFAULT_BACKOFF_ESCALATION_COUNT, Severity, parse_component_list,
};

use crate::error::{Result, WatchError};

/// Default Slack Web API base URL.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Default in-cluster service account token path.
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default in-cluster service account CA bundle path.
pub const DEFAULT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Default bound on a single notification attempt, in seconds.
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;

/// Command-line and environment settings.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Deployment environment label shown in every message.
    #[arg(long = "env", env = "APP_ENV", default_value = "")]
    pub environment: String,

    /// Slack channel ID to post to.
    #[arg(long, env = "SLACK_CHANNEL")]
    pub slack_channel: Option<String>,

    /// Slack bot token.
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Slack Web API base URL.
    #[arg(long, env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API_URL)]
    pub slack_api_url: String,

    /// Severity threshold; `error` drops good-severity messages.
    #[arg(long, env = "EVENT_LEVEL", default_value = "")]
    pub event_level: String,

    /// Comma separated source components to suppress.
    #[arg(long, env = "NOISY_COMPONENTS")]
    pub noisy_components: Option<String>,

    /// `BackOff` recurrence count that forces a danger notification.
    #[arg(long, env = "BACKOFF_ESCALATION_COUNT", default_value_t = DEFAULT_BACKOFF_ESCALATION_COUNT)]
    pub backoff_escalation_count: u32,

    /// Upper bound on a single notification attempt, in seconds.
    #[arg(long, env = "NOTIFY_TIMEOUT_SECS", default_value_t = DEFAULT_NOTIFY_TIMEOUT_SECS)]
    pub notify_timeout_secs: u64,

    /// Cluster API server URL; overrides in-cluster discovery.
    #[arg(long, env = "KUBE_API_SERVER")]
    pub kube_api_server: Option<String>,

    /// In-cluster API service host.
    #[arg(long, env = "KUBERNETES_SERVICE_HOST", hide = true)]
    pub kube_service_host: Option<String>,

    /// In-cluster API service port.
    #[arg(long, env = "KUBERNETES_SERVICE_PORT", default_value_t = 443, hide = true)]
    pub kube_service_port: u16,

    /// Service account token file.
    #[arg(long, env = "KUBE_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    pub kube_token_file: PathBuf,

    /// Cluster CA bundle file.
    #[arg(long, env = "KUBE_CA_FILE", default_value = DEFAULT_CA_FILE)]
    pub kube_ca_file: PathBuf,
}

impl ConfigArgs {
    /// Builds the classifier configuration from these arguments.
    ///
    /// Without `--noisy-components` the default noisy set is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn classifier_config(&self) -> Result<ClassifierConfig> {
        let mut config = ClassifierConfig::default()
            .with_backoff_escalation_count(self.backoff_escalation_count);
        if let Some(list) = &self.noisy_components {
            config.noisy_components = parse_component_list(list);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Minimum severity gate applied at the notifier boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeverityThreshold {
    /// Every notification is transmitted.
    #[default]
    All,
    /// Good-severity notifications are skipped.
    ErrorOnly,
}

impl SeverityThreshold {
    /// Parses the `EVENT_LEVEL` setting. Only `error` (any case) enables the gate.
    #[must_use]
    pub fn from_level(level: &str) -> Self {
        if level.trim().eq_ignore_ascii_case("error") {
            Self::ErrorOnly
        } else {
            Self::All
        }
    }

    /// Returns true if a message of this severity may be transmitted.
    #[must_use]
    pub fn admits(&self, severity: Severity) -> bool {
        !(*self == Self::ErrorOnly && severity == Severity::Good)
    }
}

/// Settings shared by every notifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Deployment environment label.
    pub environment: String,
    /// Severity gate.
    pub threshold: SeverityThreshold,
}

impl NotifierConfig {
    /// Creates a notifier configuration.
    #[must_use]
    pub fn new(environment: impl Into<String>, threshold: SeverityThreshold) -> Self {
        Self {
            environment: environment.into(),
            threshold,
        }
    }
}

/// Slack transport settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SlackConfig {
    /// Channel ID to post to.
    pub channel: String,
    /// Bot token.
    pub token: String,
    /// Web API base URL.
    pub api_url: String,
}

impl SlackConfig {
    /// Creates a Slack configuration against the public API.
    #[must_use]
    pub fn new(channel: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            token: token.into(),
            api_url: DEFAULT_SLACK_API_URL.to_string(),
        }
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Config` if a field is empty or the URL is not HTTP(S).
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(WatchError::Config("slack channel cannot be empty".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(WatchError::Config("slack token cannot be empty".to_string()));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(WatchError::Config(
                "slack API URL must start with http:// or https://".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("channel", &self.channel)
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// How to reach the cluster API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeSettings {
    /// Explicit API server URL.
    pub api_server: Option<String>,
    /// In-cluster service host.
    pub service_host: Option<String>,
    /// In-cluster service port.
    pub service_port: u16,
    /// Bearer token file.
    pub token_file: PathBuf,
    /// CA bundle file.
    pub ca_file: PathBuf,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            api_server: None,
            service_host: None,
            service_port: 443,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            ca_file: PathBuf::from(DEFAULT_CA_FILE),
        }
    }
}

/// Validated watcher configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Settings shared by notifiers.
    pub notifier: NotifierConfig,
    /// Slack transport, absent in dry-run mode.
    pub slack: Option<SlackConfig>,
    /// Classifier rules.
    pub classifier: ClassifierConfig,
    /// Cluster API discovery.
    pub kube: KubeSettings,
    /// Upper bound on one notification attempt.
    pub notify_timeout: Duration,
}

impl WatcherConfig {
    /// Builds and validates the configuration.
    ///
    /// With `dry_run` set, Slack settings are optional and ignored.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Config` if required settings are missing or invalid.
    pub fn from_args(args: ConfigArgs, dry_run: bool) -> Result<Self> {
        let classifier = args.classifier_config()?;

        let slack = if dry_run {
            None
        } else {
            let channel = args
                .slack_channel
                .ok_or_else(|| WatchError::Config("SLACK_CHANNEL is not set".to_string()))?;
            let token = args
                .slack_token
                .ok_or_else(|| WatchError::Config("SLACK_TOKEN is not set".to_string()))?;
            Some(SlackConfig::new(channel, token).with_api_url(args.slack_api_url))
        };

        let config = Self {
            notifier: NotifierConfig::new(
                args.environment,
                SeverityThreshold::from_level(&args.event_level),
            ),
            slack,
            classifier,
            kube: KubeSettings {
                api_server: args.kube_api_server,
                service_host: args.kube_service_host,
                service_port: args.kube_service_port,
                token_file: args.kube_token_file,
                ca_file: args.kube_ca_file,
            },
            notify_timeout: Duration::from_secs(args.notify_timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(slack) = &self.slack {
            slack.validate()?;
        }

        if self.notify_timeout.is_zero() {
            return Err(WatchError::Config(
                "notify timeout must be greater than 0".to_string(),
            ));
        }

        if self.kube.service_port == 0 {
            return Err(WatchError::Config(
                "kubernetes service port must be greater than 0".to_string(),
            ));
        }

        self.classifier.validate()?;
        Ok(())
    }

    /// Returns true if notifications are only logged.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.slack.is_none()
    }
}
