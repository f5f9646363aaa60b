//! Per-run wiring: database, vault, services and message language.

use anyhow::{Context as _, Result};
use cfworker_core::client::ApiClient;
use cfworker_core::db::{open_db, Connection};
use cfworker_core::i18n::{format_message, message, Language, MessageKey};
use cfworker_core::repo::account_repo::SqliteAccountRepository;
use cfworker_core::repo::history_repo::SqliteHistoryRepository;
use cfworker_core::repo::settings_repo::SqliteSettingsRepository;
use cfworker_core::{AccountService, AppConfig, Credentials, FormService, MasterKey, Vault};

pub type Accounts<'a> = AccountService<SqliteAccountRepository<'a>, SqliteSettingsRepository<'a>>;
pub type Forms<'a> = FormService<SqliteSettingsRepository<'a>>;

pub struct Context {
    pub config: AppConfig,
    pub lang: Language,
    conn: Connection,
    vault: Vault,
}

impl Context {
    pub fn open(config: AppConfig, lang_override: Option<Language>) -> Result<Self> {
        let key = MasterKey::load_or_create(config.master_key_path())
            .with_context(|| format!("loading {}", config.master_key_path().display()))?;
        let conn = open_db(config.db_path())
            .with_context(|| format!("opening {}", config.db_path().display()))?;

        let mut context = Self {
            config,
            lang: Language::default(),
            conn,
            vault: Vault::new(&key),
        };
        context.lang = match lang_override {
            Some(lang) => lang,
            None => context.forms().language()?,
        };
        Ok(context)
    }

    pub fn accounts(&self) -> Accounts<'_> {
        AccountService::new(
            SqliteAccountRepository::new(&self.conn, &self.vault),
            SqliteSettingsRepository::new(&self.conn),
        )
    }

    pub fn forms(&self) -> Forms<'_> {
        FormService::new(SqliteSettingsRepository::new(&self.conn))
    }

    pub fn history(&self) -> SqliteHistoryRepository<'_> {
        SqliteHistoryRepository::new(&self.conn)
    }

    /// HTTP client carrying `credentials` for header injection.
    pub fn api_client(&self, credentials: Option<Credentials>) -> Result<ApiClient> {
        let mut client = ApiClient::new(self.config.http_timeout)?;
        client.set_credentials(credentials);
        Ok(client)
    }

    pub fn text(&self, key: MessageKey) -> &'static str {
        message(self.lang, key)
    }

    pub fn text_with(&self, key: MessageKey, args: &[(&str, &str)]) -> String {
        format_message(self.lang, key, args)
    }
}
