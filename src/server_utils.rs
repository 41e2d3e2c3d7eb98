use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{normalize_tick_ms, ADVISORY_TIMEOUT_MS};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvisorKind {
    Off,
    Heuristic,
    Command(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown ADVISOR value {0:?}, expected off, heuristic or command")]
    UnknownAdvisor(String),
    #[error("ADVISOR=command needs a non-empty ADVISOR_CMD")]
    MissingAdvisorCommand,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub level_file: Option<PathBuf>,
    pub tick_ms: u64,
    pub seed: Option<u32>,
    pub advisor: AdvisorKind,
    pub advisor_timeout: Duration,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparsable numbers fall back to defaults; an unrecognised advisor is
    /// an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let port = lookup("PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let tick_ms = normalize_tick_ms(
            lookup("TICK_MS").and_then(|value| value.trim().parse::<i64>().ok()),
        );
        let seed = lookup("SEED").and_then(|value| value.trim().parse::<u32>().ok());
        let advisor_timeout = Duration::from_millis(
            lookup("ADVISOR_TIMEOUT_MS")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(ADVISORY_TIMEOUT_MS),
        );

        let advisor = match lookup("ADVISOR")
            .map(|value| value.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("off") => AdvisorKind::Off,
            Some("heuristic") => AdvisorKind::Heuristic,
            Some("command") => {
                let command = lookup("ADVISOR_CMD")
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .ok_or(SettingsError::MissingAdvisorCommand)?;
                AdvisorKind::Command(command)
            }
            Some(other) => return Err(SettingsError::UnknownAdvisor(other.to_string())),
        };

        Ok(Self {
            port,
            static_dir: non_blank_path(lookup("STATIC_DIR")),
            level_file: non_blank_path(lookup("LEVEL_FILE")),
            tick_ms,
            seed,
            advisor,
            advisor_timeout,
        })
    }
}

fn non_blank_path(raw: Option<String>) -> Option<PathBuf> {
    raw.filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}
