//! Application configuration. Owner identity, storage, push delivery, timers.
//!
//! Read from `WORKOUT_*` environment variables (a `.env` file is honoured) and, optionally,
//! a file named by `WORKOUT_CONFIG`.

use crate::usecases::DEFAULT_FANOUT_CONCURRENCY;
use serde::Deserialize;
use std::collections::HashMap;

/// Default timer poll interval of the engine loop.
pub const DEFAULT_TICK_MS: u64 = 1_000;

/// Default walking cadence of the simulated pedometer.
pub const DEFAULT_CADENCE_SPM: u32 = 110;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Identity of the signed-in user. Read from WORKOUT_OWNER_ID.
    #[serde(default)]
    pub owner_id: Option<String>,

    /// Directory of the SQLite record store. In-memory store when unset.
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub tick_ms: Option<u64>,

    /// Max participants written concurrently during fan-out.
    #[serde(default)]
    pub fanout_concurrency: Option<usize>,

    /// Whether the user granted notification permission. Read from WORKOUT_NOTIFICATIONS_AUTHORIZED.
    #[serde(default)]
    pub notifications_authorized: Option<bool>,

    // ─────────────────────────────────────────────────────────────────────────
    // Push Delivery (Expo)
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub expo_push_url: Option<String>,

    /// Read from WORKOUT_EXPO_ACCESS_TOKEN.
    #[serde(default)]
    pub expo_access_token: Option<String>,

    /// Participant id -> Expo push token. Only settable from the config file.
    #[serde(default)]
    pub push_tokens: HashMap<String, String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Step Source
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub pedometer_available: Option<bool>,

    /// Steps per minute of the simulated pedometer. Read from WORKOUT_SIMULATED_CADENCE_SPM.
    #[serde(default)]
    pub simulated_cadence_spm: Option<u32>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("WORKOUT_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        // Environment wins over the file.
        c = c.add_source(config::Environment::with_prefix("WORKOUT").try_parsing(true));
        c.build()?.try_deserialize()
    }

    /// Returns the owner id. Defaults to "me" if unset or blank.
    pub fn owner_id_or_default(&self) -> String {
        self.owner_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("me")
            .to_string()
    }

    /// Returns the timer poll interval in milliseconds. Defaults to DEFAULT_TICK_MS; never 0.
    pub fn tick_ms_or_default(&self) -> u64 {
        self.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(1)
    }

    pub fn fanout_concurrency_or_default(&self) -> usize {
        self.fanout_concurrency
            .unwrap_or(DEFAULT_FANOUT_CONCURRENCY)
            .max(1)
    }

    pub fn notifications_authorized_or_default(&self) -> bool {
        self.notifications_authorized.unwrap_or(true)
    }

    pub fn pedometer_available_or_default(&self) -> bool {
        self.pedometer_available.unwrap_or(true)
    }

    pub fn simulated_cadence_spm_or_default(&self) -> u32 {
        self.simulated_cadence_spm.unwrap_or(DEFAULT_CADENCE_SPM)
    }

    /// Returns true if push delivery through Expo can be used (at least one token).
    pub fn is_push_configured(&self) -> bool {
        !self.push_tokens.is_empty()
    }
}
