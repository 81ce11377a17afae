use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::utils;

pub const DEFAULT_COLLECTION: &str = "publicEvents";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 10;
pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub firestore_project_id: Option<String>,
    pub firestore_api_key: Option<String>,
    pub collection: String,
    pub sync_interval_secs: u64,
    pub sync_batch_size: usize,
    /// Whether pruning a scanned concert also drops it from the saved list.
    pub prune_saved_on_sync: bool,
    pub timezone: String,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            firestore_project_id: None,
            firestore_api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            prune_saved_on_sync: true,
            timezone: DEFAULT_TIMEZONE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn batch_size(&self) -> usize {
        self.sync_batch_size.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            log::warn!(
                "unknown timezone {:?}, falling back to {DEFAULT_TIMEZONE}",
                self.timezone
            );
            chrono_tz::America::New_York
        })
    }

    /// Environment variables win over the file.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("CONCERT_FIRESTORE_PROJECT") {
            self.firestore_project_id = Some(project);
        }
        if let Some(key) = lookup("CONCERT_FIRESTORE_API_KEY") {
            self.firestore_api_key = Some(key);
        }
        if let Some(secs) = lookup("CONCERT_SYNC_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.sync_interval_secs = secs;
        }
        if let Some(tz) = lookup("CONCERT_TIMEZONE") {
            self.timezone = tz;
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring unreadable config {:?}: {err}", path);
                AppConfig::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    utils::ensure_parent(path);
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}
