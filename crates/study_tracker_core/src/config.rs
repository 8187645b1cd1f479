//! crates/study_tracker_core/src/config.rs
//!
//! Tunables for the router and its cache. `CoreConfig::default()` carries the
//! production values; `from_env` lets a deployment override them.

use std::time::Duration;

use crate::access::AccessPolicy;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub admin_uid: Option<String>,
    pub moderator_uids: Vec<String>,
    pub moderated_subject: String,
    pub timetable_ttl: Duration,
    pub lesson_content_ttl: Duration,
    pub profile_ttl: Duration,
    pub cache_capacity: usize,
    pub heartbeat_period: Duration,
    pub live_stats_period: Duration,
    /// How recent `lastActive` must be to count as an active user.
    pub active_window: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            admin_uid: None,
            moderator_uids: Vec::new(),
            moderated_subject: "physics-nilantha".to_string(),
            timetable_ttl: Duration::from_secs(30),
            lesson_content_ttl: Duration::from_secs(20),
            profile_ttl: Duration::from_secs(60),
            cache_capacity: 256,
            heartbeat_period: Duration::from_secs(120),
            live_stats_period: Duration::from_secs(30),
            active_window: Duration::from_secs(5 * 60),
        }
    }
}

impl CoreConfig {
    /// Loads overrides from environment variables; anything unset keeps its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            admin_uid: std::env::var("ADMIN_UID").ok().filter(|v| !v.is_empty()),
            ..Self::default()
        };

        if let Ok(list) = std::env::var("MODERATOR_UIDS") {
            config.moderator_uids = list
                .split(',')
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(subject) = std::env::var("MODERATED_SUBJECT") {
            config.moderated_subject = subject;
        }

        config.timetable_ttl = secs_var("TIMETABLE_TTL_SECS", config.timetable_ttl)?;
        config.lesson_content_ttl = secs_var("LESSON_CONTENT_TTL_SECS", config.lesson_content_ttl)?;
        config.profile_ttl = secs_var("PROFILE_TTL_SECS", config.profile_ttl)?;
        config.heartbeat_period = secs_var("HEARTBEAT_SECS", config.heartbeat_period)?;
        config.live_stats_period = secs_var("LIVE_STATS_SECS", config.live_stats_period)?;
        config.active_window = secs_var("ACTIVE_WINDOW_SECS", config.active_window)?;

        if let Ok(raw) = std::env::var("CACHE_CAPACITY") {
            config.cache_capacity = raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("CACHE_CAPACITY".to_string(), e.to_string())
            })?;
        }

        Ok(config)
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            admin_uid: self.admin_uid.clone(),
            moderator_uids: self.moderator_uids.clone(),
            moderated_subject: self.moderated_subject.clone(),
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
