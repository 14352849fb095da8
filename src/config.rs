use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, str::FromStr};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub api_prefix: String,
    pub log_level: String,
    pub rate_limit_per_min: u32,
    pub model_seed: u64,
    pub database_path: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "MobilitySoft traffic prediction server".to_string(),
            api_prefix: "/api/v1".to_string(),
            log_level: "info".to_string(),
            rate_limit_per_min: 60,
            model_seed: 42,
            database_path: "predictions.db".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Reads the JSON file named by `CONFIG_PATH` (if set), then applies
    /// per-field env overrides.
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = lookup("API_PREFIX") {
            self.api_prefix = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = v;
        }
        override_parsed(&lookup, "RATE_LIMIT_PER_MIN", &mut self.rate_limit_per_min);
        override_parsed(&lookup, "MODEL_SEED", &mut self.model_seed);
        override_parsed(&lookup, "PORT", &mut self.port);
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            // subscriber may not be up yet, so this can go unseen
            Err(_) => tracing::warn!("ignoring unparseable {}={:?}", key, raw),
        }
    }
}
