use crate::generator::profile::SyntheticConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use sweepcore::processing::{AnalyzerConfig, ScanConfig};
use sweepcore::protocol::ServerConfig;
use sweepcore::sweep::{Channel, HackrfConfig};

/// Where sweep passes come from: `hackrf`, `synthetic` or `replay:<file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceKind {
    Hackrf,
    Synthetic,
    Replay(PathBuf),
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hackrf" => Ok(SourceKind::Hackrf),
            "synthetic" => Ok(SourceKind::Synthetic),
            other => match other.strip_prefix("replay:") {
                Some(path) if !path.is_empty() => Ok(SourceKind::Replay(PathBuf::from(path))),
                _ => Err(format!(
                    "unknown source {:?} (expected hackrf, synthetic or replay:<file>)",
                    other
                )),
            },
        }
    }
}

impl TryFrom<String> for SourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Hackrf => f.write_str("hackrf"),
            SourceKind::Synthetic => f.write_str("synthetic"),
            SourceKind::Replay(path) => write!(f, "replay:{}", path.display()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub channel: u8,
    pub source: SourceKind,
    pub receiver: Option<String>,
    pub connect_timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// Number of scan attempts; 0 keeps scanning until interrupted.
    pub repeat: u32,
    pub scan: ScanConfig,
    pub analyzer: AnalyzerConfig,
    pub hackrf: HackrfConfig,
    pub synthetic: SyntheticConfig,
    pub server: ServerConfig,
    pub http_bind: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            channel: 11,
            source: SourceKind::Hackrf,
            receiver: None,
            connect_timeout_ms: 2_000,
            retry_delay_ms: 1_000,
            repeat: 0,
            scan: ScanConfig::default(),
            analyzer: AnalyzerConfig::default(),
            hackrf: HackrfConfig::default(),
            synthetic: SyntheticConfig::default(),
            server: ServerConfig::default(),
            http_bind: "127.0.0.1:9000".into(),
        }
    }
}

impl SensorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading sensor config {}", path_ref.display()))?;
        let config: SensorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing sensor config {}", path_ref.display()))?;
        Ok(config)
    }

    /// A missing budget means one window per scan attempt.
    pub fn from_args(
        channel: u8,
        window: f64,
        budget: Option<f64>,
        threshold: u32,
        repeat: u32,
        source: SourceKind,
        receiver: Option<String>,
    ) -> Self {
        Self {
            channel,
            source,
            receiver,
            repeat,
            scan: ScanConfig {
                window_secs: window,
                budget_secs: budget.unwrap_or(window),
                threshold,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn channel(&self) -> anyhow::Result<Channel> {
        Channel::from_index(self.channel).context("selecting scan channel")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
