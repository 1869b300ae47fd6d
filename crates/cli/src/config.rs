//! Runtime configuration, loaded once from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pipeline::{BusinessHours, DedupStrategy, DeliveryPolicy, MarkPolicy, PipelineError, Recipient};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub slack: SlackConfig,
    #[serde(default)]
    pub policy: DeliveryPolicy,
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub archive: bool,
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    pub token: String,
    pub receiver_email: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusinessHoursConfig {
    /// Minutes east of UTC (540 = +09:00).
    pub utc_offset_minutes: i32,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 540,
            start_hour: 9,
            end_hour: 18,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub initial_sweep: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            initial_sweep: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub strategy: DedupStrategy,
    pub mark: MarkPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("processed_event_time.json"),
            strategy: DedupStrategy::default(),
            mark: MarkPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// OTLP/gRPC collector endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

fn default_prefix() -> String {
    "issues/".to_string()
}

fn default_archive_prefix() -> String {
    "processed/".to_string()
}

fn default_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::Configuration {
        message: message.into(),
    }
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)
            .map_err(|err| invalid(format!("cannot read {}: {err}", path.display())))?;
        Self::parse(&text)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let config: Config = toml::from_str(text).map_err(|err| invalid(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for (field, value) in [
            ("storage.region", &self.storage.region),
            ("storage.bucket", &self.storage.bucket),
            ("slack.token", &self.slack.token),
            ("slack.receiver_email", &self.slack.receiver_email),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{field} must not be empty")));
            }
        }
        if self.poll.interval_secs == 0 {
            return Err(invalid("poll.interval_secs must be greater than zero"));
        }
        if self.slack.timeout_secs == 0 {
            return Err(invalid("slack.timeout_secs must be greater than zero"));
        }
        if self.storage.archive && self.storage.archive_prefix.is_empty() {
            return Err(invalid("storage.archive_prefix must not be empty when archiving"));
        }
        self.business_hours()?;
        Ok(())
    }

    pub fn business_hours(&self) -> Result<BusinessHours, PipelineError> {
        let hours = self.business_hours;
        BusinessHours::new(hours.utc_offset_minutes, hours.start_hour, hours.end_hour)
    }

    pub fn recipient(&self) -> Result<Recipient, PipelineError> {
        Recipient::new(self.slack.receiver_email.trim())
            .ok_or_else(|| invalid("slack.receiver_email must not be empty"))
    }

    pub fn archive_prefix(&self) -> Option<String> {
        self.storage
            .archive
            .then(|| self.storage.archive_prefix.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn slack_timeout(&self) -> Duration {
        Duration::from_secs(self.slack.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [storage]
        region = "ap-northeast-2"
        endpoint = "http://minio.local:9000"
        access_key = "ak"
        secret_key = "sk"
        bucket = "redmine-events"

        [slack]
        token = "xoxb-1"
        receiver_email = "kim@example.com"
    "#;

    #[test]
    fn test_minimal_file_takes_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.storage.prefix, "issues/");
        assert_eq!(config.archive_prefix().as_deref(), Some("processed/"));
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert_eq!(config.policy, DeliveryPolicy::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert!(config.poll.initial_sweep);
        assert_eq!(config.ledger.path, PathBuf::from("processed_event_time.json"));
        assert_eq!(config.ledger.strategy, DedupStrategy::HighWater);
        assert_eq!(config.ledger.mark, MarkPolicy::BeforeDelivery);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.telemetry.otlp_endpoint.is_none());
        assert_eq!(config.business_hours().unwrap().offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_full_file_overrides_defaults() {
        let text = format!(
            r#"{MINIMAL}
            [policy]
            kind = "issue-change"
            status = "received"

            [business_hours]
            utc_offset_minutes = 0
            start_hour = 8
            end_hour = 20

            [poll]
            interval_secs = 30
            initial_sweep = false

            [ledger]
            path = "/var/lib/rm-notify/ledger.json"
            strategy = "event_id"
            mark = "after_delivery"

            [logging]
            format = "json"

            [telemetry]
            otlp_endpoint = "http://collector:4317"
            "#
        );

        let config = Config::parse(&text).unwrap();

        assert_eq!(config.policy, DeliveryPolicy::new("issue-change", "received"));
        assert_eq!(config.ledger.strategy, DedupStrategy::EventId);
        assert_eq!(config.ledger.mark, MarkPolicy::AfterDelivery);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.poll.initial_sweep);
        assert_eq!(
            config.telemetry.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let cases = [
            MINIMAL.replace(r#"bucket = "redmine-events""#, r#"bucket = """#),
            format!("{MINIMAL}\n[poll]\ninterval_secs = 0\n"),
            format!("{MINIMAL}\n[business_hours]\nstart_hour = 18\nend_hour = 9\n"),
            format!("{MINIMAL}\n[ledger]\nstrategy = \"newest\"\n"),
            format!("{MINIMAL}\n[unknown]\nkey = 1\n"),
        ];

        for text in cases {
            assert!(
                matches!(Config::parse(&text), Err(PipelineError::Configuration { .. })),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_archive_can_be_disabled() {
        let text = MINIMAL.replace("bucket = \"redmine-events\"", "bucket = \"b\"\narchive = false");
        let config = Config::parse(&text).unwrap();
        assert!(config.archive_prefix().is_none());
    }

    #[test]
    fn test_load_reads_file_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        assert!(Config::load(file.path()).is_ok());

        let missing = file.path().with_extension("absent");
        assert!(matches!(
            Config::load(&missing),
            Err(PipelineError::Configuration { .. })
        ));
    }
}
