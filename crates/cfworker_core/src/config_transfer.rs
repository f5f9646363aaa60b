//! Configuration export and import.
//!
//! # Responsibility
//! - Export accounts and UI settings as a portable JSON document.
//! - Import such a document back, account by account.
//!
//! # Invariants
//! - Exports never contain a Global API Key or Cloudflare account id; both are
//!   replaced by `[ENCRYPTED]`.
//! - Import skips masked accounts and never aborts on a single bad account.

use crate::i18n::Language;
use crate::model::account::{Account, AccountDraft, MASKED_SECRET};
use crate::repo::account_repo::{AccountListQuery, AccountRepository};
use crate::repo::settings_repo::SettingsRepository;
use crate::repo::RepoError;
use crate::service::account_service::{AccountService, AccountServiceError};
use crate::service::form_service::FormService;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Format version written to exports.
pub const CONFIG_VERSION: &str = "1.0.0";

#[derive(Debug)]
pub enum ConfigTransferError {
    /// Not JSON, or missing `version` / `accounts`.
    InvalidFormat(String),
    /// Every account in the file had a masked key.
    NoValidAccounts,
    Account(AccountServiceError),
    Repo(RepoError),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl Display for ConfigTransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(details) => write!(f, "invalid configuration file: {details}"),
            Self::NoValidAccounts => write!(f, "no importable accounts in configuration file"),
            Self::Account(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl Error for ConfigTransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Account(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AccountServiceError> for ConfigTransferError {
    fn from(value: AccountServiceError) -> Self {
        Self::Account(value)
    }
}

impl From<RepoError> for ConfigTransferError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<serde_json::Error> for ConfigTransferError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<std::io::Error> for ConfigTransferError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

pub type ConfigTransferResult<T> = Result<T, ConfigTransferError>;

/// Whole export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    pub version: String,
    #[serde(default)]
    pub export_date: String,
    pub accounts: Vec<ExportedAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ConfigSettings>,
}

/// Account entry; lenient on read so hand-edited files still import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportedAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(rename = "globalAPIKey")]
    pub global_api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ExportedAccount {
    /// Export form of `account` with secrets masked.
    pub fn masked(account: &Account) -> Self {
        Self {
            id: Some(account.id.to_string()),
            name: account.name.clone(),
            email: account.email.clone(),
            global_api_key: MASKED_SECRET.to_string(),
            account_id: account.account_id.as_ref().map(|_| MASKED_SECRET.to_string()),
            tags: account.tags.clone(),
            notes: account.notes.clone(),
            created_at: Some(account.created_at),
            updated_at: Some(account.updated_at),
            is_active: Some(account.is_active),
        }
    }

    pub fn is_masked(&self) -> bool {
        self.global_api_key.trim() == MASKED_SECRET
    }

    fn to_draft(&self) -> AccountDraft {
        AccountDraft {
            name: self.name.clone(),
            email: self.email.clone(),
            global_api_key: self.global_api_key.clone(),
            account_id: self
                .account_id
                .clone()
                .filter(|value| value.trim() != MASKED_SECRET),
            tags: self.tags.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSettings {
    pub theme: Option<String>,
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_data: Option<serde_json::Value>,
}

/// One account that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub email: String,
    pub error: String,
}

/// Outcome of [`import_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_masked: usize,
    pub failed: Vec<ImportFailure>,
    pub settings_applied: bool,
}

/// `cfworker-config-YYYY-MM-DD.json` for the (UTC) export date.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("cfworker-config-{}.json", now.format("%Y-%m-%d"))
}

/// Builds the export document from stored accounts and settings.
pub fn export_config<A, S, F>(
    accounts: &AccountService<A, S>,
    forms: &FormService<F>,
    now: DateTime<Utc>,
) -> ConfigTransferResult<ConfigData>
where
    A: AccountRepository,
    S: SettingsRepository,
    F: SettingsRepository,
{
    let exported: Vec<_> = accounts
        .list_accounts(&AccountListQuery::default())?
        .iter()
        .map(ExportedAccount::masked)
        .collect();

    let settings = ConfigSettings {
        theme: Some(forms.theme()?),
        language: Some(forms.language()?.as_tag().to_string()),
        form_data: Some(forms.worker_form_value()?),
    };

    info!(
        "event=config_export module=config_transfer status=ok accounts={}",
        exported.len()
    );
    Ok(ConfigData {
        version: CONFIG_VERSION.to_string(),
        export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        accounts: exported,
        settings: Some(settings),
    })
}

/// Writes `config` as pretty JSON into `dir` and returns the file path.
pub fn write_export(
    dir: impl AsRef<Path>,
    config: &ConfigData,
    now: DateTime<Utc>,
) -> ConfigTransferResult<PathBuf> {
    let path = dir.as_ref().join(export_file_name(now));
    std::fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(path)
}

/// Parses an export document, requiring `version` and an `accounts` array.
pub fn parse_config(text: &str) -> ConfigTransferResult<ConfigData> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| ConfigTransferError::InvalidFormat(err.to_string()))?;

    let has_version = match value.get("version") {
        Some(serde_json::Value::String(version)) => !version.is_empty(),
        Some(serde_json::Value::Null) | None => false,
        Some(_) => true,
    };
    if !has_version {
        return Err(ConfigTransferError::InvalidFormat(
            "missing `version`".to_string(),
        ));
    }
    if !value.get("accounts").is_some_and(|a| a.is_array()) {
        return Err(ConfigTransferError::InvalidFormat(
            "`accounts` must be an array".to_string(),
        ));
    }

    let mut value = value;
    if let Some(version) = value.get_mut("version") {
        if !version.is_string() {
            *version = serde_json::Value::String(version.to_string());
        }
    }
    serde_json::from_value(value).map_err(|err| ConfigTransferError::InvalidFormat(err.to_string()))
}

/// Imports unmasked accounts and applies settings.
pub fn import_config<A, S, F>(
    accounts: &AccountService<A, S>,
    forms: &FormService<F>,
    config: &ConfigData,
) -> ConfigTransferResult<ImportReport>
where
    A: AccountRepository,
    S: SettingsRepository,
    F: SettingsRepository,
{
    let (importable, masked): (Vec<_>, Vec<_>) =
        config.accounts.iter().partition(|account| !account.is_masked());
    if importable.is_empty() {
        warn!(
            "event=config_import module=config_transfer status=error error_code=no_valid_accounts masked={}",
            masked.len()
        );
        return Err(ConfigTransferError::NoValidAccounts);
    }

    let mut report = ImportReport {
        skipped_masked: masked.len(),
        ..ImportReport::default()
    };
    for entry in importable {
        match accounts.add_account(entry.to_draft()) {
            Ok(_) => report.imported += 1,
            Err(err) => {
                warn!("event=config_import module=config_transfer status=error error_code=account_failed error={err}");
                report.failed.push(ImportFailure {
                    email: entry.email.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    if let Some(settings) = &config.settings {
        report.settings_applied = apply_settings(forms, settings)?;
    }

    info!(
        "event=config_import module=config_transfer status=ok imported={} failed={} skipped={}",
        report.imported,
        report.failed.len(),
        report.skipped_masked
    );
    Ok(report)
}

fn apply_settings<F: SettingsRepository>(
    forms: &FormService<F>,
    settings: &ConfigSettings,
) -> ConfigTransferResult<bool> {
    let mut applied = false;
    if let Some(theme) = settings.theme.as_deref().filter(|t| !t.trim().is_empty()) {
        forms.set_theme(theme)?;
        applied = true;
    }
    if let Some(language) = settings.language.as_deref().and_then(Language::from_tag) {
        forms.set_language(language)?;
        applied = true;
    }
    if let Some(form_data) = &settings.form_data {
        forms.set_worker_form_value(form_data)?;
        applied = true;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_uses_utc_date() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(export_file_name(now), "cfworker-config-2026-03-07.json");
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(matches!(
            parse_config("not json"),
            Err(ConfigTransferError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_config(r#"{"accounts":[]}"#),
            Err(ConfigTransferError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_config(r#"{"version":"1.0.0","accounts":{}}"#),
            Err(ConfigTransferError::InvalidFormat(_))
        ));
    }

    #[test]
    fn parse_accepts_minimal_document() {
        let config = parse_config(
            r#"{"version":"1.0.0","accounts":[{"email":"a@example.com","globalAPIKey":"k"}]}"#,
        )
        .unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert!(!config.accounts[0].is_masked());
        assert!(config.settings.is_none());
    }

    #[test]
    fn masked_draft_drops_masked_account_id() {
        let entry = ExportedAccount {
            email: "a@example.com".to_string(),
            global_api_key: "real".to_string(),
            account_id: Some(MASKED_SECRET.to_string()),
            ..ExportedAccount::default()
        };
        assert_eq!(entry.to_draft().account_id, None);
    }
}
