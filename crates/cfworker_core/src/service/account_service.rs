//! Account use-case service.
//!
//! # Responsibility
//! - Add, edit and remove stored Cloudflare accounts.
//! - Own the "current account" selection that feeds deploy credentials.
//!
//! # Invariants
//! - The first account ever added becomes current.
//! - Deleting the current account clears the selection.
//! - Only an existing, active account is reported as current.
//! - Selecting an account bumps its `updated_at` ("last used").

use crate::logging::mask_email;
use crate::model::account::{
    Account, AccountDraft, AccountId, AccountPatch, AccountValidationError, Credentials,
};
use crate::model::now_epoch_ms;
use crate::repo::account_repo::{AccountListQuery, AccountRepository};
use crate::repo::settings_repo::{keys, SettingsRepository};
use crate::repo::RepoError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for account use-cases.
#[derive(Debug)]
pub enum AccountServiceError {
    Validation(AccountValidationError),
    AccountNotFound(AccountId),
    /// Inactive accounts cannot be selected as current.
    AccountInactive(AccountId),
    Repo(RepoError),
}

impl Display for AccountServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::AccountInactive(id) => write!(f, "account is inactive: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccountServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AccountServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::AccountNotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<AccountValidationError> for AccountServiceError {
    fn from(value: AccountValidationError) -> Self {
        Self::Validation(value)
    }
}

pub type AccountServiceResult<T> = Result<T, AccountServiceError>;

/// Account facade over account and settings repositories.
pub struct AccountService<A: AccountRepository, S: SettingsRepository> {
    accounts: A,
    settings: S,
}

impl<A: AccountRepository, S: SettingsRepository> AccountService<A, S> {
    pub fn new(accounts: A, settings: S) -> Self {
        Self { accounts, settings }
    }

    /// Stores a new active account; the first one becomes current.
    pub fn add_account(&self, draft: AccountDraft) -> AccountServiceResult<Account> {
        let had_accounts = !self
            .accounts
            .list_accounts(&AccountListQuery {
                limit: Some(1),
                ..AccountListQuery::default()
            })?
            .is_empty();

        let account = Account::from_draft(draft, now_epoch_ms())?;
        self.accounts.create_account(&account)?;
        info!(
            "event=account_add module=account status=ok account={} email={}",
            account.id,
            mask_email(&account.email)
        );

        if !had_accounts {
            self.settings
                .set_setting(keys::CURRENT_ACCOUNT_ID, &account.id.to_string())?;
            info!(
                "event=account_select module=account status=ok account={} reason=first_account",
                account.id
            );
        }
        Ok(account)
    }

    /// Merges `patch` into the stored account and bumps `updated_at`.
    pub fn update_account(
        &self,
        id: AccountId,
        patch: AccountPatch,
    ) -> AccountServiceResult<Account> {
        let mut account = self.require_account(id)?;
        account.apply_patch(patch);
        account.updated_at = now_epoch_ms().max(account.created_at);
        self.accounts.update_account(&account)?;
        info!("event=account_update module=account status=ok account={id}");
        Ok(account)
    }

    /// Removes the account permanently, clearing the selection if needed.
    pub fn delete_account(&self, id: AccountId) -> AccountServiceResult<()> {
        self.accounts.delete_account(id)?;
        if self.current_account_id()? == Some(id) {
            self.settings.remove_setting(keys::CURRENT_ACCOUNT_ID)?;
        }
        info!("event=account_delete module=account status=ok account={id}");
        Ok(())
    }

    /// Selects (`Some`) or clears (`None`) the current account.
    pub fn set_current_account(
        &self,
        id: Option<AccountId>,
    ) -> AccountServiceResult<Option<Account>> {
        let Some(id) = id else {
            self.settings.remove_setting(keys::CURRENT_ACCOUNT_ID)?;
            info!("event=account_select module=account status=ok account=none");
            return Ok(None);
        };

        let mut account = self.require_account(id)?;
        if !account.is_active {
            return Err(AccountServiceError::AccountInactive(id));
        }
        account.updated_at = now_epoch_ms().max(account.updated_at);
        self.accounts.update_account(&account)?;
        self.settings
            .set_setting(keys::CURRENT_ACCOUNT_ID, &id.to_string())?;
        info!("event=account_select module=account status=ok account={id}");
        Ok(Some(account))
    }

    /// The selected account if it still exists and is active.
    pub fn current_account(&self) -> AccountServiceResult<Option<Account>> {
        let Some(id) = self.current_account_id()? else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .get_account(id)?
            .filter(|account| account.is_active))
    }

    /// Auth pair of the current account, if any.
    pub fn current_credentials(&self) -> AccountServiceResult<Option<Credentials>> {
        Ok(self.current_account()?.map(|account| account.credentials()))
    }

    pub fn get_account(&self, id: AccountId) -> AccountServiceResult<Option<Account>> {
        Ok(self.accounts.get_account(id)?)
    }

    pub fn list_accounts(&self, query: &AccountListQuery) -> AccountServiceResult<Vec<Account>> {
        Ok(self.accounts.list_accounts(query)?)
    }

    /// Active accounts, most recently used first.
    pub fn active_accounts(&self) -> AccountServiceResult<Vec<Account>> {
        self.list_accounts(&AccountListQuery {
            active_only: true,
            ..AccountListQuery::default()
        })
    }

    fn require_account(&self, id: AccountId) -> AccountServiceResult<Account> {
        self.accounts
            .get_account(id)?
            .ok_or(AccountServiceError::AccountNotFound(id))
    }

    fn current_account_id(&self) -> AccountServiceResult<Option<AccountId>> {
        let Some(raw) = self.settings.get_setting(keys::CURRENT_ACCOUNT_ID)? else {
            return Ok(None);
        };
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                warn!("event=account_select module=account status=error error_code=invalid_current_id");
                Ok(None)
            }
        }
    }
}
