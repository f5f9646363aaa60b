//! Account repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over the `accounts` table.
//! - Seal the Global API Key and Cloudflare account id with the vault.
//! - Filter and sort decrypted records in memory for list queries.
//!
//! # Invariants
//! - Plaintext secrets never reach SQL; sealed values bind the row id as AAD.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::model::account::{Account, AccountId};
use crate::repo::{bool_to_int, RepoError, RepoResult};
use crate::vault::Vault;
use rusqlite::{params, Connection, ErrorCode, Row};
use std::cmp::Ordering;
use uuid::Uuid;

const ACCOUNT_SELECT_SQL: &str = "SELECT
    id,
    name,
    email,
    api_key_sealed,
    account_id_sealed,
    tags,
    notes,
    created_at,
    updated_at,
    is_active
FROM accounts";

/// Sort order for account lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountSort {
    /// Most recently updated (or used) first.
    #[default]
    UpdatedDesc,
    /// Display name, case-insensitive.
    NameAsc,
    CreatedDesc,
}

/// Query options for listing accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountListQuery {
    /// Case-insensitive match on name, email, tags and notes.
    pub search: Option<String>,
    /// Exact (case-insensitive) tag filter.
    pub tag: Option<String>,
    pub active_only: bool,
    pub sort: AccountSort,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for account CRUD operations.
pub trait AccountRepository {
    fn create_account(&self, account: &Account) -> RepoResult<AccountId>;
    fn update_account(&self, account: &Account) -> RepoResult<()>;
    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>>;
    fn list_accounts(&self, query: &AccountListQuery) -> RepoResult<Vec<Account>>;
    fn delete_account(&self, id: AccountId) -> RepoResult<()>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
    vault: &'conn Vault,
}

impl<'conn> SqliteAccountRepository<'conn> {
    pub fn new(conn: &'conn Connection, vault: &'conn Vault) -> Self {
        Self { conn, vault }
    }

    fn seal_account_id(&self, account: &Account) -> RepoResult<Option<String>> {
        let aad = account_id_aad(account.id);
        match account.account_id.as_deref() {
            Some(value) => Ok(Some(self.vault.seal(value, aad.as_bytes())?)),
            None => Ok(None),
        }
    }

    fn parse_row(&self, row: &Row<'_>) -> RepoResult<Account> {
        let id_text: String = row.get("id")?;
        let id = Uuid::parse_str(&id_text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{id_text}` in accounts.id"))
        })?;

        let api_key_sealed: String = row.get("api_key_sealed")?;
        let global_api_key = self
            .vault
            .open(&api_key_sealed, api_key_aad(id).as_bytes())?;

        let account_id = match row.get::<_, Option<String>>("account_id_sealed")? {
            Some(sealed) => Some(self.vault.open(&sealed, account_id_aad(id).as_bytes())?),
            None => None,
        };

        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|err| {
            RepoError::InvalidData(format!("invalid tags json in accounts.tags: {err}"))
        })?;

        let is_active = match row.get::<_, i64>("is_active")? {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid is_active value `{other}` in accounts.is_active"
                )));
            }
        };

        let account = Account {
            id,
            name: row.get("name")?,
            email: row.get("email")?,
            global_api_key,
            account_id,
            tags,
            notes: row.get("notes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            is_active,
        };
        account.validate()?;
        Ok(account)
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_account(&self, account: &Account) -> RepoResult<AccountId> {
        account.validate()?;

        let api_key_sealed = self
            .vault
            .seal(&account.global_api_key, api_key_aad(account.id).as_bytes())?;
        let account_id_sealed = self.seal_account_id(account)?;

        let inserted = self.conn.execute(
            "INSERT INTO accounts (
                id,
                name,
                email,
                api_key_sealed,
                account_id_sealed,
                tags,
                notes,
                created_at,
                updated_at,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                account.id.to_string(),
                account.name.as_str(),
                account.email.as_str(),
                api_key_sealed,
                account_id_sealed,
                serde_json::to_string(&account.tags)?,
                account.notes.as_deref(),
                account.created_at,
                account.updated_at,
                bool_to_int(account.is_active),
            ],
        );

        match inserted {
            Ok(_) => Ok(account.id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(RepoError::Duplicate(account.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_account(&self, account: &Account) -> RepoResult<()> {
        account.validate()?;

        let api_key_sealed = self
            .vault
            .seal(&account.global_api_key, api_key_aad(account.id).as_bytes())?;
        let account_id_sealed = self.seal_account_id(account)?;

        let changed = self.conn.execute(
            "UPDATE accounts
             SET
                name = ?1,
                email = ?2,
                api_key_sealed = ?3,
                account_id_sealed = ?4,
                tags = ?5,
                notes = ?6,
                updated_at = ?7,
                is_active = ?8
             WHERE id = ?9;",
            params![
                account.name.as_str(),
                account.email.as_str(),
                api_key_sealed,
                account_id_sealed,
                serde_json::to_string(&account.tags)?,
                account.notes.as_deref(),
                account.updated_at,
                bool_to_int(account.is_active),
                account.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(account.id));
        }

        Ok(())
    }

    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(self.parse_row(row)?));
        }

        Ok(None)
    }

    fn list_accounts(&self, query: &AccountListQuery) -> RepoResult<Vec<Account>> {
        let mut stmt = self.conn.prepare(ACCOUNT_SELECT_SQL)?;
        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();

        while let Some(row) = rows.next()? {
            let account = self.parse_row(row)?;
            if query.active_only && !account.is_active {
                continue;
            }
            if let Some(tag) = query.tag.as_deref() {
                if !account.has_tag(tag) {
                    continue;
                }
            }
            if let Some(search) = query.search.as_deref() {
                if !account.matches_search(search) {
                    continue;
                }
            }
            accounts.push(account);
        }

        accounts.sort_by(|a, b| compare_accounts(query.sort, a, b));

        let offset = query.offset as usize;
        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    fn delete_account(&self, id: AccountId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM accounts WHERE id = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn compare_accounts(sort: AccountSort, a: &Account, b: &Account) -> Ordering {
    let primary = match sort {
        AccountSort::UpdatedDesc => b.updated_at.cmp(&a.updated_at),
        AccountSort::CreatedDesc => b.created_at.cmp(&a.created_at),
        AccountSort::NameAsc => a
            .display_name()
            .to_lowercase()
            .cmp(&b.display_name().to_lowercase()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn api_key_aad(id: AccountId) -> String {
    format!("accounts.api_key:{id}")
}

fn account_id_aad(id: AccountId) -> String {
    format!("accounts.account_id:{id}")
}
