//! Cloudflare account domain model.
//!
//! # Responsibility
//! - Define the account record stored in the local encrypted vault.
//! - Normalize form input (tags, blank optionals) before it reaches storage.
//!
//! # Invariants
//! - `id` is generated once and never reused for another account.
//! - `global_api_key` is never blank.
//! - At least one of `name` / `email` is non-blank, so every account has a
//!   display name.
//! - `tags` are trimmed, non-empty and unique (first occurrence wins).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one stored account.
pub type AccountId = Uuid;

/// Placeholder written in place of secrets by config export.
pub const MASKED_SECRET: &str = "[ENCRYPTED]";

/// Validation errors for account input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountValidationError {
    /// Global API Key is empty or whitespace.
    MissingApiKey,
    /// Neither name nor email was provided.
    MissingIdentity,
    /// Email was provided but does not look like `local@domain`.
    InvalidEmail(String),
    /// `updated_at` precedes `created_at`.
    InvalidTimestamps { created_at: i64, updated_at: i64 },
}

impl Display for AccountValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "global API key is required"),
            Self::MissingIdentity => write!(f, "account needs a name or an email"),
            Self::InvalidEmail(value) => write!(f, "invalid email address: `{value}`"),
            Self::InvalidTimestamps {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must not be earlier than created_at ({created_at})"
            ),
        }
    }
}

impl Error for AccountValidationError {}

/// Auth pair sent to Cloudflare and the deployment backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub global_api_key: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("global_api_key", &"<redacted>")
            .finish()
    }
}

/// Stored Cloudflare account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    #[serde(rename = "globalAPIKey")]
    pub global_api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Also bumped when the account is selected.
    pub updated_at: i64,
    pub is_active: bool,
}

impl Debug for Account {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("global_api_key", &"<redacted>")
            .field("account_id", &self.account_id.as_ref().map(|_| "<redacted>"))
            .field("tags", &self.tags)
            .field("notes", &self.notes)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Account {
    /// Builds a fresh active account from validated form input.
    pub fn from_draft(draft: AccountDraft, now_ms: i64) -> Result<Self, AccountValidationError> {
        let draft = draft.normalized();
        draft.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: draft.name,
            email: draft.email,
            global_api_key: draft.global_api_key,
            account_id: draft.account_id,
            tags: draft.tags,
            notes: draft.notes,
            created_at: now_ms,
            updated_at: now_ms,
            is_active: true,
        })
    }

    /// Name shown in lists; falls back to the email.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.email.as_str()
        } else {
            self.name.as_str()
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            global_api_key: self.global_api_key.clone(),
        }
    }

    /// Applies a partial update. Does not touch timestamps.
    pub fn apply_patch(&mut self, patch: AccountPatch) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            self.email = email.trim().to_string();
        }
        if let Some(key) = patch.global_api_key {
            self.global_api_key = key.trim().to_string();
        }
        if let Some(account_id) = patch.account_id {
            self.account_id = non_blank(account_id);
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(notes) = patch.notes {
            self.notes = non_blank(notes);
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        validate_identity(&self.name, &self.email, &self.global_api_key)?;
        if self.updated_at < self.created_at {
            return Err(AccountValidationError::InvalidTimestamps {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    /// Case-insensitive match against name, email, tags and notes.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
            || self
                .notes
                .as_deref()
                .is_some_and(|notes| notes.to_lowercase().contains(&needle))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|value| value.eq_ignore_ascii_case(tag))
    }
}

/// Form input for creating an account.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "globalAPIKey")]
    pub global_api_key: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Debug for AccountDraft {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDraft")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("global_api_key", &"<redacted>")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl AccountDraft {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        global_api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            global_api_key: global_api_key.into(),
            ..Self::default()
        }
    }

    /// Trims strings, turns blank optionals into `None` and normalizes tags.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            global_api_key: self.global_api_key.trim().to_string(),
            account_id: self.account_id.and_then(non_blank),
            tags: normalize_tags(self.tags),
            notes: self.notes.and_then(non_blank),
        }
    }

    pub fn validate(&self) -> Result<(), AccountValidationError> {
        validate_identity(&self.name, &self.email, &self.global_api_key)
    }
}

/// Partial update; `None` leaves the field unchanged.
///
/// For `account_id` and `notes`, `Some("")` clears the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub global_api_key: Option<String>,
    pub account_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

impl Debug for AccountPatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPatch")
            .field("name", &self.name)
            .field("email", &self.email)
            .field(
                "global_api_key",
                &self.global_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("tags", &self.tags)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Splits comma-separated tag input (`"a, b,,c"`) into normalized tags.
pub fn parse_tags(input: &str) -> Vec<String> {
    normalize_tags(input.split(',').map(str::to_string))
}

/// Trims tags, drops empties and removes duplicates keeping first-seen order.
pub fn normalize_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || normalized.iter().any(|seen| seen == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    normalized
}

fn validate_identity(
    name: &str,
    email: &str,
    global_api_key: &str,
) -> Result<(), AccountValidationError> {
    if global_api_key.trim().is_empty() {
        return Err(AccountValidationError::MissingApiKey);
    }
    let email = email.trim();
    if name.trim().is_empty() && email.is_empty() {
        return Err(AccountValidationError::MissingIdentity);
    }
    if !email.is_empty() && !looks_like_email(email) {
        return Err(AccountValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !value.contains(' ')
        }
        None => false,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
