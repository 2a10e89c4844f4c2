//! User preferences.
//!
//! The polling service only reads preferences, through the
//! [`PreferenceSource`] trait. [`SharedPreferences`] is the implementation
//! used by the binary: an in-memory copy of a JSON file that supports
//! pass-through updates and explicit saves.
//!
//! # File format
//!
//! ```json
//! {
//!   "userServer": "https://git.example.com/",
//!   "commitNbDisplayed": 5,
//!   "commitNbCharactersDisplayed": 160,
//!   "commitHistoryViewEnabled": true,
//!   "systemNotificationEnabled": true,
//!   "soundNotificationEnabled": true,
//!   "notificationDuration": 14
//! }
//! ```
//!
//! Missing keys take their default value; a missing file means all defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Default number of commits shown per list.
pub const DEFAULT_COMMIT_NB_DISPLAYED: usize = 5;

/// Default number of comment characters shown.
pub const DEFAULT_COMMIT_NB_CHARACTERS_DISPLAYED: usize = 160;

/// Default notification display time in seconds.
pub const DEFAULT_NOTIFICATION_DURATION_SECS: u64 = 14;

/// Errors that can occur while loading or changing preferences.
#[derive(Error, Debug)]
pub enum PreferencesError {
    /// Reading or writing the preference file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The preference file is not valid JSON.
    #[error("invalid preference file: {0}")]
    Json(#[from] serde_json::Error),

    /// `set` was called with a key that does not exist.
    #[error("unknown preference: {0}")]
    UnknownKey(String),

    /// `set` was called with a value of the wrong type.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Read access to preferences, as seen by the polling service.
pub trait PreferenceSource: Send + Sync {
    /// Server base URL, with a trailing slash unless empty.
    fn get_user_server(&self) -> String;
    fn get_commit_nb_displayed(&self) -> usize;
    fn get_commit_nb_characters_displayed(&self) -> usize;
    fn get_commit_history_view_enabled(&self) -> bool;
    fn is_system_notification_enabled(&self) -> bool;
    fn is_sound_notification_enabled(&self) -> bool;
    fn get_notification_duration(&self) -> Duration;
}

/// Preference values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub user_server: String,
    pub commit_nb_displayed: usize,
    pub commit_nb_characters_displayed: usize,
    pub commit_history_view_enabled: bool,
    pub system_notification_enabled: bool,
    pub sound_notification_enabled: bool,
    /// Seconds a system notification stays visible.
    pub notification_duration: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            user_server: String::new(),
            commit_nb_displayed: DEFAULT_COMMIT_NB_DISPLAYED,
            commit_nb_characters_displayed: DEFAULT_COMMIT_NB_CHARACTERS_DISPLAYED,
            commit_history_view_enabled: true,
            system_notification_enabled: true,
            sound_notification_enabled: true,
            notification_duration: DEFAULT_NOTIFICATION_DURATION_SECS,
        }
    }
}

impl Preferences {
    /// Loads preferences from `path`, using defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PreferencesError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No preference file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes preferences to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PreferencesError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Sets one preference from its file key and a string value.
    ///
    /// # Errors
    ///
    /// Returns [`PreferencesError::UnknownKey`] or
    /// [`PreferencesError::InvalidValue`].
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        match key {
            "userServer" => self.user_server = value.trim().to_string(),
            "commitNbDisplayed" => self.commit_nb_displayed = parse_value(key, value)?,
            "commitNbCharactersDisplayed" => {
                self.commit_nb_characters_displayed = parse_value(key, value)?;
            }
            "commitHistoryViewEnabled" => {
                self.commit_history_view_enabled = parse_value(key, value)?;
            }
            "systemNotificationEnabled" => {
                self.system_notification_enabled = parse_value(key, value)?;
            }
            "soundNotificationEnabled" => {
                self.sound_notification_enabled = parse_value(key, value)?;
            }
            "notificationDuration" => self.notification_duration = parse_value(key, value)?,
            _ => return Err(PreferencesError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Server URL with a guaranteed trailing slash, or empty if unset.
    #[must_use]
    pub fn user_server_normalized(&self) -> String {
        let server = self.user_server.trim();
        if server.is_empty() || server.ends_with('/') {
            server.to_string()
        } else {
            format!("{server}/")
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PreferencesError> {
    value
        .trim()
        .parse()
        .map_err(|_| PreferencesError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse '{value}'"),
        })
}

/// Thread-safe preferences with an optional backing file.
#[derive(Debug, Default)]
pub struct SharedPreferences {
    values: RwLock<Preferences>,
    path: Option<PathBuf>,
}

impl SharedPreferences {
    /// Wraps in-memory preferences without a backing file.
    #[must_use]
    pub fn new(values: Preferences) -> Self {
        Self {
            values: RwLock::new(values),
            path: None,
        }
    }

    /// Loads preferences from `path` and keeps it for [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// See [`Preferences::load`].
    pub fn open(path: PathBuf) -> Result<Self, PreferencesError> {
        let values = Preferences::load(&path)?;
        Ok(Self {
            values: RwLock::new(values),
            path: Some(path),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Preferences> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current values.
    #[must_use]
    pub fn snapshot(&self) -> Preferences {
        self.read().clone()
    }

    /// Applies `change` to the in-memory values.
    pub fn update<F: FnOnce(&mut Preferences)>(&self, change: F) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut values);
    }

    /// Sets one preference by key. See [`Preferences::set`].
    ///
    /// # Errors
    ///
    /// Propagates [`Preferences::set`] errors; values are unchanged on error.
    pub fn set(&self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = values.clone();
        updated.set(key, value)?;
        *values = updated;
        Ok(())
    }

    /// Writes the current values to the backing file, if any.
    ///
    /// # Errors
    ///
    /// See [`Preferences::save`].
    pub fn save(&self) -> Result<(), PreferencesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        self.snapshot().save(path)?;
        info!(path = %path.display(), "Preferences saved");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl PreferenceSource for SharedPreferences {
    fn get_user_server(&self) -> String {
        self.read().user_server_normalized()
    }

    fn get_commit_nb_displayed(&self) -> usize {
        self.read().commit_nb_displayed
    }

    fn get_commit_nb_characters_displayed(&self) -> usize {
        self.read().commit_nb_characters_displayed
    }

    fn get_commit_history_view_enabled(&self) -> bool {
        self.read().commit_history_view_enabled
    }

    fn is_system_notification_enabled(&self) -> bool {
        self.read().system_notification_enabled
    }

    fn is_sound_notification_enabled(&self) -> bool {
        self.read().sound_notification_enabled
    }

    fn get_notification_duration(&self) -> Duration {
        Duration::from_secs(self.read().notification_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let prefs = Preferences::default();
        assert_eq!(prefs.commit_nb_displayed, 5);
        assert_eq!(prefs.commit_nb_characters_displayed, 160);
        assert!(prefs.commit_history_view_enabled);
        assert!(prefs.system_notification_enabled);
        assert!(prefs.sound_notification_enabled);
        assert_eq!(prefs.notification_duration, 14);
        assert!(prefs.user_server.is_empty());
    }

    #[test]
    fn user_server_gets_trailing_slash() {
        let mut prefs = Preferences::default();
        assert_eq!(prefs.user_server_normalized(), "");

        prefs.user_server = "https://git.example.com".to_string();
        assert_eq!(prefs.user_server_normalized(), "https://git.example.com/");

        prefs.user_server = "https://git.example.com/gitblit/".to_string();
        assert_eq!(
            prefs.user_server_normalized(),
            "https://git.example.com/gitblit/"
        );
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load(&dir.path().join("prefs.json")).unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(
            &path,
            r#"{"userServer":"https://git.example.com","soundNotificationEnabled":false}"#,
        )
        .unwrap();

        let prefs = Preferences::load(&path).unwrap();

        assert_eq!(prefs.user_server, "https://git.example.com");
        assert!(!prefs.sound_notification_enabled);
        assert_eq!(prefs.commit_nb_displayed, DEFAULT_COMMIT_NB_DISPLAYED);
    }

    #[test]
    fn load_invalid_json_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Preferences::load(&path).unwrap_err();
        assert!(matches!(err, PreferencesError::Json(_)));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let mut prefs = Preferences::default();
        prefs.user_server = "https://git.example.com/".to_string();
        prefs.notification_duration = 3;

        prefs.save(&path).unwrap();

        assert_eq!(Preferences::load(&path).unwrap(), prefs);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"notificationDuration\": 3"));
    }

    #[test]
    fn set_parses_typed_values() {
        let mut prefs = Preferences::default();

        prefs.set("commitNbDisplayed", "12").unwrap();
        prefs.set("systemNotificationEnabled", "false").unwrap();
        prefs.set("userServer", " https://git.example.com ").unwrap();

        assert_eq!(prefs.commit_nb_displayed, 12);
        assert!(!prefs.system_notification_enabled);
        assert_eq!(prefs.user_server, "https://git.example.com");
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_value() {
        let mut prefs = Preferences::default();

        assert!(matches!(
            prefs.set("colour", "blue"),
            Err(PreferencesError::UnknownKey(ref k)) if k == "colour"
        ));
        let err = prefs.set("notificationDuration", "soon").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for notificationDuration: cannot parse 'soon'"
        );
    }

    #[test]
    fn shared_preferences_expose_source_view() {
        let shared = SharedPreferences::new(Preferences::default());
        shared.update(|p| p.user_server = "https://git.example.com".to_string());

        assert_eq!(shared.get_user_server(), "https://git.example.com/");
        assert_eq!(shared.get_notification_duration(), Duration::from_secs(14));
        assert!(shared.is_sound_notification_enabled());
    }

    #[test]
    fn shared_set_failure_leaves_values_unchanged() {
        let shared = SharedPreferences::new(Preferences::default());

        assert!(shared.set("commitNbDisplayed", "-1").is_err());
        assert_eq!(shared.get_commit_nb_displayed(), DEFAULT_COMMIT_NB_DISPLAYED);
    }

    #[test]
    fn shared_save_writes_backing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        let shared = SharedPreferences::open(path.clone()).unwrap();

        shared.set("commitNbDisplayed", "9").unwrap();
        shared.save().unwrap();

        assert_eq!(Preferences::load(&path).unwrap().commit_nb_displayed, 9);
        assert_eq!(shared.path(), Some(path.as_path()));
    }
}
