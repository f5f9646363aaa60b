//! Persisted form state and UI preferences.
//!
//! # Responsibility
//! - Remember the last single-deploy and bulk-deploy parameters.
//! - Store the preferred language and the (opaque) theme name.
//!
//! # Invariants
//! - Unreadable stored form JSON is treated as "nothing saved", never as an
//!   error, so a bad value cannot block deployments.

use crate::i18n::Language;
use crate::model::deploy::{BulkParams, DeployParams};
use crate::repo::settings_repo::{keys, SettingsRepository};
use crate::repo::RepoResult;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Theme written to exports when none was ever chosen.
pub const DEFAULT_THEME: &str = "light";

pub struct FormService<S: SettingsRepository> {
    settings: S,
}

impl<S: SettingsRepository> FormService<S> {
    pub fn new(settings: S) -> Self {
        Self { settings }
    }

    pub fn load_worker_form(&self) -> RepoResult<Option<DeployParams>> {
        self.load_json(keys::WORKER_FORM)
    }

    pub fn save_worker_form(&self, params: &DeployParams) -> RepoResult<()> {
        self.save_json(keys::WORKER_FORM, params)
    }

    pub fn clear_worker_form(&self) -> RepoResult<()> {
        self.settings.remove_setting(keys::WORKER_FORM)
    }

    pub fn load_bulk_form(&self) -> RepoResult<Option<BulkParams>> {
        self.load_json(keys::BULK_FORM)
    }

    pub fn save_bulk_form(&self, params: &BulkParams) -> RepoResult<()> {
        self.save_json(keys::BULK_FORM, params)
    }

    pub fn clear_bulk_form(&self) -> RepoResult<()> {
        self.settings.remove_setting(keys::BULK_FORM)
    }

    /// Raw stored single-deploy form, used by config export.
    pub fn worker_form_value(&self) -> RepoResult<serde_json::Value> {
        Ok(self
            .settings
            .get_setting(keys::WORKER_FORM)?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())))
    }

    /// Stores an arbitrary form object (config import keeps it verbatim).
    pub fn set_worker_form_value(&self, value: &serde_json::Value) -> RepoResult<()> {
        self.settings
            .set_setting(keys::WORKER_FORM, &serde_json::to_string(value)?)
    }

    /// Stored language, falling back to the environment locale.
    pub fn language(&self) -> RepoResult<Language> {
        Ok(self
            .settings
            .get_setting(keys::LANGUAGE)?
            .and_then(|tag| Language::from_tag(&tag))
            .unwrap_or_else(Language::detect_from_env))
    }

    pub fn set_language(&self, language: Language) -> RepoResult<()> {
        self.settings.set_setting(keys::LANGUAGE, language.as_tag())
    }

    pub fn theme(&self) -> RepoResult<String> {
        Ok(self
            .settings
            .get_setting(keys::THEME)?
            .unwrap_or_else(|| DEFAULT_THEME.to_string()))
    }

    pub fn set_theme(&self, theme: &str) -> RepoResult<()> {
        self.settings.set_setting(keys::THEME, theme.trim())
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> RepoResult<Option<T>> {
        let Some(raw) = self.settings.get_setting(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!("event=form_load module=form status=error key={key} error={err}");
                Ok(None)
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> RepoResult<()> {
        self.settings
            .set_setting(key, &serde_json::to_string(value)?)
    }
}
