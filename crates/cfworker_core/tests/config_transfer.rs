use cfworker_core::config_transfer::{
    export_config, export_file_name, import_config, parse_config, write_export, ConfigData,
    ConfigTransferError, ExportedAccount, CONFIG_VERSION,
};
use cfworker_core::db::open_db_in_memory;
use cfworker_core::i18n::Language;
use cfworker_core::model::account::MASKED_SECRET;
use cfworker_core::repo::account_repo::{AccountListQuery, SqliteAccountRepository};
use cfworker_core::repo::settings_repo::SqliteSettingsRepository;
use cfworker_core::{AccountDraft, AccountService, DeployParams, FormService, MasterKey, Vault};
use chrono::{TimeZone, Utc};
use rusqlite::Connection;

type Accounts<'a> = AccountService<SqliteAccountRepository<'a>, SqliteSettingsRepository<'a>>;
type Forms<'a> = FormService<SqliteSettingsRepository<'a>>;

fn services<'a>(conn: &'a Connection, vault: &'a Vault) -> (Accounts<'a>, Forms<'a>) {
    (
        AccountService::new(
            SqliteAccountRepository::new(conn, vault),
            SqliteSettingsRepository::new(conn),
        ),
        FormService::new(SqliteSettingsRepository::new(conn)),
    )
}

fn vault() -> Vault {
    Vault::new(&MasterKey::from_bytes([3u8; 32]))
}

#[test]
fn export_masks_secrets_and_carries_settings() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let (accounts, forms) = services(&conn, &vault);

    let mut draft = AccountDraft::new("Main", "main@example.com", "secret-key");
    draft.account_id = Some("acct-1".to_string());
    draft.tags = vec!["prod".to_string()];
    accounts.add_account(draft).unwrap();
    forms.set_language(Language::Zh).unwrap();
    let mut form = DeployParams::default();
    form.set_worker_name("edge-node");
    forms.save_worker_form(&form).unwrap();

    let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    let data = export_config(&accounts, &forms, now).unwrap();

    assert_eq!(data.version, CONFIG_VERSION);
    assert_eq!(data.accounts.len(), 1);
    let exported = &data.accounts[0];
    assert_eq!(exported.email, "main@example.com");
    assert_eq!(exported.global_api_key, MASKED_SECRET);
    assert_eq!(exported.account_id.as_deref(), Some(MASKED_SECRET));
    assert_eq!(exported.tags, ["prod"]);

    let settings = data.settings.as_ref().unwrap();
    assert_eq!(settings.language.as_deref(), Some("zh"));
    let form_data = settings.form_data.as_ref().unwrap();
    assert_eq!(form_data["workerName"], "edge-node");

    let serialized = serde_json::to_string(&data).unwrap();
    assert!(!serialized.contains("secret-key"));
    assert!(!serialized.contains("acct-1"));
}

#[test]
fn write_export_uses_dated_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
    let data = ConfigData {
        version: CONFIG_VERSION.to_string(),
        export_date: now.to_rfc3339(),
        accounts: Vec::new(),
        settings: None,
    };

    let path = write_export(dir.path(), &data, now).unwrap();
    assert_eq!(export_file_name(now), "cfworker-config-2024-03-09.json");
    assert_eq!(path, dir.path().join("cfworker-config-2024-03-09.json"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(parse_config(&text).unwrap(), data);
}

#[test]
fn import_skips_masked_accounts_and_applies_settings() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let (accounts, forms) = services(&conn, &vault);

    let text = r#"{
        "version": "1.0.0",
        "exportDate": "2024-03-09T12:00:00.000Z",
        "accounts": [
            {"name": "Masked", "email": "masked@example.com", "globalAPIKey": "[ENCRYPTED]"},
            {"name": "Plain", "email": "plain@example.com", "globalAPIKey": "real-key",
             "accountId": "[ENCRYPTED]", "tags": ["jp"]}
        ],
        "settings": {"theme": "dark", "language": "zh", "formData": {"workerName": "imported"}}
    }"#;
    let data = parse_config(text).unwrap();
    let report = import_config(&accounts, &forms, &data).unwrap();

    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped_masked, 1);
    assert!(report.failed.is_empty());
    assert!(report.settings_applied);

    let listed = accounts.list_accounts(&AccountListQuery::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].email, "plain@example.com");
    assert_eq!(listed[0].global_api_key, "real-key");
    assert_eq!(listed[0].account_id, None);

    assert_eq!(forms.theme().unwrap(), "dark");
    assert_eq!(forms.language().unwrap(), Language::Zh);
    let form = forms.load_worker_form().unwrap().unwrap();
    assert_eq!(form.worker_name.as_deref(), Some("imported"));
}

#[test]
fn import_of_only_masked_accounts_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let (accounts, forms) = services(&conn, &vault);

    let data = ConfigData {
        version: CONFIG_VERSION.to_string(),
        export_date: String::new(),
        accounts: vec![ExportedAccount {
            email: "masked@example.com".to_string(),
            global_api_key: MASKED_SECRET.to_string(),
            ..ExportedAccount::default()
        }],
        settings: None,
    };

    let err = import_config(&accounts, &forms, &data).unwrap_err();
    assert!(matches!(err, ConfigTransferError::NoValidAccounts));
    assert!(accounts
        .list_accounts(&AccountListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn import_reports_invalid_entries_without_aborting() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let (accounts, forms) = services(&conn, &vault);

    let data = ConfigData {
        version: CONFIG_VERSION.to_string(),
        export_date: String::new(),
        accounts: vec![
            ExportedAccount {
                email: "not-an-email".to_string(),
                global_api_key: "k".to_string(),
                ..ExportedAccount::default()
            },
            ExportedAccount {
                email: "ok@example.com".to_string(),
                global_api_key: "k2".to_string(),
                ..ExportedAccount::default()
            },
        ],
        settings: None,
    };

    let report = import_config(&accounts, &forms, &data).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].email, "not-an-email");
    assert!(!report.settings_applied);
}

#[test]
fn parse_config_requires_version_and_accounts() {
    for text in [
        "not json",
        r#"{"accounts": []}"#,
        r#"{"version": "1.0.0"}"#,
        r#"{"version": "1.0.0", "accounts": {}}"#,
    ] {
        let err = parse_config(text).unwrap_err();
        assert!(
            matches!(err, ConfigTransferError::InvalidFormat(_)),
            "`{text}` gave {err:?}"
        );
    }
}
