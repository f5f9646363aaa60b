use cfworker_core::db::open_db_in_memory;
use cfworker_core::model::account::AccountValidationError;
use cfworker_core::repo::account_repo::{AccountListQuery, AccountSort, SqliteAccountRepository};
use cfworker_core::repo::settings_repo::SqliteSettingsRepository;
use cfworker_core::{
    AccountDraft, AccountPatch, AccountService, AccountServiceError, MasterKey, Vault,
};
use rusqlite::Connection;

type Service<'a> = AccountService<SqliteAccountRepository<'a>, SqliteSettingsRepository<'a>>;

fn service<'a>(conn: &'a Connection, vault: &'a Vault) -> Service<'a> {
    AccountService::new(
        SqliteAccountRepository::new(conn, vault),
        SqliteSettingsRepository::new(conn),
    )
}

fn test_vault() -> Vault {
    Vault::new(&MasterKey::from_bytes([7u8; 32]))
}

#[test]
fn first_account_becomes_current() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let first = accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "key-main"))
        .unwrap();
    accounts
        .add_account(AccountDraft::new("Backup", "backup@example.com", "key-backup"))
        .unwrap();

    let current = accounts.current_account().unwrap().unwrap();
    assert_eq!(current.id, first.id);

    let credentials = accounts.current_credentials().unwrap().unwrap();
    assert_eq!(credentials.email, "main@example.com");
    assert_eq!(credentials.global_api_key, "key-main");
}

#[test]
fn secrets_are_not_stored_in_plaintext() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let mut draft = AccountDraft::new("Main", "main@example.com", "super-secret-key");
    draft.account_id = Some("acct-0123456789".to_string());
    let account = accounts.add_account(draft).unwrap();

    let (api_key, account_id): (String, Option<String>) = conn
        .query_row(
            "SELECT api_key_sealed, account_id_sealed FROM accounts WHERE id = ?1;",
            [account.id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(!api_key.contains("super-secret-key"));
    assert!(!account_id.unwrap().contains("acct-0123456789"));

    let loaded = accounts.get_account(account.id).unwrap().unwrap();
    assert_eq!(loaded.global_api_key, "super-secret-key");
    assert_eq!(loaded.account_id.as_deref(), Some("acct-0123456789"));
}

#[test]
fn accounts_cannot_be_read_with_another_key() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let account = service(&conn, &vault)
        .add_account(AccountDraft::new("Main", "main@example.com", "key"))
        .unwrap();

    let other = Vault::new(&MasterKey::from_bytes([9u8; 32]));
    let err = service(&conn, &other).get_account(account.id).unwrap_err();
    assert!(matches!(err, AccountServiceError::Repo(_)), "got {err:?}");
}

#[test]
fn add_account_rejects_blank_api_key() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let err = accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "   "))
        .unwrap_err();
    assert!(matches!(
        err,
        AccountServiceError::Validation(AccountValidationError::MissingApiKey)
    ));
    assert!(accounts.current_account().unwrap().is_none());
}

#[test]
fn deleting_current_account_clears_selection() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let first = accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "k1"))
        .unwrap();
    let second = accounts
        .add_account(AccountDraft::new("Backup", "backup@example.com", "k2"))
        .unwrap();

    accounts.delete_account(second.id).unwrap();
    assert_eq!(accounts.current_account().unwrap().unwrap().id, first.id);

    accounts.delete_account(first.id).unwrap();
    assert!(accounts.current_account().unwrap().is_none());
    assert!(accounts.current_credentials().unwrap().is_none());
}

#[test]
fn inactive_accounts_cannot_be_selected_and_drop_out_of_current() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let first = accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "k1"))
        .unwrap();
    let second = accounts
        .add_account(AccountDraft::new("Backup", "backup@example.com", "k2"))
        .unwrap();

    accounts
        .update_account(
            second.id,
            AccountPatch {
                is_active: Some(false),
                ..AccountPatch::default()
            },
        )
        .unwrap();
    let err = accounts.set_current_account(Some(second.id)).unwrap_err();
    assert!(matches!(err, AccountServiceError::AccountInactive(id) if id == second.id));

    accounts
        .update_account(
            first.id,
            AccountPatch {
                is_active: Some(false),
                ..AccountPatch::default()
            },
        )
        .unwrap();
    assert!(accounts.current_account().unwrap().is_none());
    assert!(accounts.active_accounts().unwrap().is_empty());
}

#[test]
fn selecting_unknown_account_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let missing = uuid::Uuid::new_v4();
    let err = accounts.set_current_account(Some(missing)).unwrap_err();
    assert!(matches!(err, AccountServiceError::AccountNotFound(id) if id == missing));
}

#[test]
fn update_account_merges_patch_and_keeps_created_at() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let account = accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "k1"))
        .unwrap();
    let updated = accounts
        .update_account(
            account.id,
            AccountPatch {
                name: Some("Renamed".to_string()),
                tags: Some(vec!["prod".to_string(), "jp".to_string()]),
                ..AccountPatch::default()
            },
        )
        .unwrap();

    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.email, "main@example.com");
    assert_eq!(updated.global_api_key, "k1");
    assert_eq!(updated.created_at, account.created_at);
    assert!(updated.updated_at >= account.updated_at);

    let loaded = accounts.get_account(account.id).unwrap().unwrap();
    assert_eq!(loaded.name, "Renamed");
    assert!(loaded.has_tag("prod"));
}

#[test]
fn list_accounts_filters_by_search_and_tag() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);

    let mut tokyo = AccountDraft::new("Tokyo", "tokyo@example.com", "k1");
    tokyo.tags = vec!["jp".to_string()];
    accounts.add_account(tokyo).unwrap();
    let mut berlin = AccountDraft::new("Berlin", "berlin@example.com", "k2");
    berlin.notes = Some("eu fallback".to_string());
    accounts.add_account(berlin).unwrap();

    let by_search = accounts
        .list_accounts(&AccountListQuery {
            search: Some("FALLBACK".to_string()),
            ..AccountListQuery::default()
        })
        .unwrap();
    assert_eq!(by_search.len(), 1);
    assert_eq!(by_search[0].name, "Berlin");

    let by_tag = accounts
        .list_accounts(&AccountListQuery {
            tag: Some("JP".to_string()),
            ..AccountListQuery::default()
        })
        .unwrap();
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].name, "Tokyo");

    let by_name = accounts
        .list_accounts(&AccountListQuery {
            sort: AccountSort::NameAsc,
            ..AccountListQuery::default()
        })
        .unwrap();
    let names: Vec<_> = by_name.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["Berlin", "Tokyo"]);
}

#[test]
fn list_accounts_pages_with_limit_and_offset() {
    let conn = open_db_in_memory().unwrap();
    let vault = test_vault();
    let accounts = service(&conn, &vault);
    for name in ["Delta", "Alpha", "Charlie", "Bravo"] {
        accounts
            .add_account(AccountDraft::new(name, "", "key"))
            .unwrap();
    }

    let page = |limit, offset| -> Vec<String> {
        accounts
            .list_accounts(&AccountListQuery {
                sort: AccountSort::NameAsc,
                limit,
                offset,
                ..AccountListQuery::default()
            })
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect()
    };

    assert_eq!(page(Some(2), 0), ["Alpha", "Bravo"]);
    assert_eq!(page(Some(2), 2), ["Charlie", "Delta"]);
    assert_eq!(page(None, 3), ["Delta"]);
    assert!(page(Some(2), 4).is_empty());
}
