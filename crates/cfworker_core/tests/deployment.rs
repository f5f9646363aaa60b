use cfworker_core::client::{ApiError, ApiResult};
use cfworker_core::db::open_db_in_memory;
use cfworker_core::deploy::plan_targets;
use cfworker_core::repo::account_repo::{AccountListQuery, SqliteAccountRepository};
use cfworker_core::repo::history_repo::{
    HistoryRepository, SqliteHistoryRepository, MAX_HISTORY_RECORDS,
};
use cfworker_core::repo::settings_repo::SqliteSettingsRepository;
use cfworker_core::{
    deploy_single, AccountDraft, AccountService, BulkDeployment, BulkParams, CreateWorkerRequest,
    CreateWorkerResponse, DeployError, DeployParams, DeploymentRecord, MasterKey, TargetStatus,
    Vault, WorkerDeployer,
};
use rusqlite::Connection;
use std::cell::RefCell;

type Accounts<'a> = AccountService<SqliteAccountRepository<'a>, SqliteSettingsRepository<'a>>;

struct FakeBackend {
    requests: RefCell<Vec<CreateWorkerRequest>>,
    reject_key: Option<&'static str>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            reject_key: None,
        }
    }

    fn rejecting(key: &'static str) -> Self {
        Self {
            reject_key: Some(key),
            ..Self::new()
        }
    }
}

impl WorkerDeployer for FakeBackend {
    fn create_worker(&self, request: &CreateWorkerRequest) -> ApiResult<CreateWorkerResponse> {
        self.requests.borrow_mut().push(request.clone());
        if self.reject_key == Some(request.global_api_key.as_str()) {
            return Err(ApiError::Unauthorized);
        }
        let name = request.worker_name.as_deref().unwrap_or("generated");
        Ok(CreateWorkerResponse {
            node: format!("vless://{name}@example.com:443"),
            url: format!("https://{name}.example.workers.dev"),
        })
    }
}

fn accounts<'a>(conn: &'a Connection, vault: &'a Vault) -> Accounts<'a> {
    AccountService::new(
        SqliteAccountRepository::new(conn, vault),
        SqliteSettingsRepository::new(conn),
    )
}

fn vault() -> Vault {
    Vault::new(&MasterKey::from_bytes([5u8; 32]))
}

#[test]
fn deploy_single_sends_current_account_credentials() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let accounts = accounts(&conn, &vault);
    accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "key-main"))
        .unwrap();
    let backend = FakeBackend::new();

    let mut params = DeployParams::default();
    params.set_worker_name("  edge-node ");
    params.set_proxy_ip("1.2.3.4:443, 5.6.7.8:8443");
    let response = deploy_single(&accounts, &backend, &params).unwrap();

    assert_eq!(response.url, "https://edge-node.example.workers.dev");
    let requests = backend.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].email, "main@example.com");
    assert_eq!(requests[0].global_api_key, "key-main");
    assert_eq!(requests[0].worker_name.as_deref(), Some("edge-node"));
    assert_eq!(requests[0].node_name.as_deref(), Some("edge-node"));
}

#[test]
fn deploy_single_without_current_account_makes_no_request() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let accounts = accounts(&conn, &vault);
    let backend = FakeBackend::new();

    let err = deploy_single(&accounts, &backend, &DeployParams::default()).unwrap_err();
    assert!(matches!(err, DeployError::NoCurrentAccount));
    assert!(backend.requests.borrow().is_empty());
}

#[test]
fn deploy_single_rejects_invalid_params_before_calling_backend() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let accounts = accounts(&conn, &vault);
    accounts
        .add_account(AccountDraft::new("Main", "main@example.com", "key-main"))
        .unwrap();
    let backend = FakeBackend::new();

    let params = DeployParams {
        uuid: Some("not-a-uuid".to_string()),
        ..DeployParams::default()
    };
    let err = deploy_single(&accounts, &backend, &params).unwrap_err();
    assert!(matches!(err, DeployError::InvalidParams(_)));
    assert!(backend.requests.borrow().is_empty());
}

#[test]
fn bulk_run_is_sequential_and_persisted() {
    let conn = open_db_in_memory().unwrap();
    let vault = vault();
    let accounts = accounts(&conn, &vault);
    let tokyo = accounts
        .add_account(AccountDraft::new("Tokyo", "tokyo@example.com", "key-tokyo"))
        .unwrap();
    let berlin = accounts
        .add_account(AccountDraft::new("Berlin", "berlin@example.com", "key-berlin"))
        .unwrap();
    let history = SqliteHistoryRepository::new(&conn);
    let backend = FakeBackend::rejecting("key-berlin");

    let all = accounts.list_accounts(&AccountListQuery::default()).unwrap();
    let targets = plan_targets(&all, &[berlin.id, tokyo.id]);
    let form = BulkParams {
        worker_name_base: Some("swift-fox".to_string()),
        ..BulkParams::default()
    };

    let mut seen = Vec::new();
    let record = BulkDeployment::new(&backend, &history)
        .run(&all, targets, &form, |progress| {
            seen.push((progress.completed, progress.target.account_name.clone()));
        })
        .unwrap();

    assert_eq!(
        seen,
        [(1, "Berlin".to_string()), (2, "Tokyo".to_string())]
    );
    let names: Vec<_> = backend
        .requests
        .borrow()
        .iter()
        .map(|r| r.worker_name.clone().unwrap())
        .collect();
    assert_eq!(names, ["swift-fox-1", "swift-fox-2"]);

    assert_eq!(record.total_accounts, 2);
    assert_eq!(record.success_count, 1);
    assert_eq!(record.error_count, 1);
    assert_eq!(record.targets[0].status, TargetStatus::Error);
    assert!(record.targets[0].error.is_some());
    assert_eq!(record.targets[1].status, TargetStatus::Success);
    assert_eq!(
        record.targets[1].worker_url.as_deref(),
        Some("https://swift-fox-2.example.workers.dev")
    );

    let stored = history.get_record(record.id).unwrap().unwrap();
    assert_eq!(stored, record);
}

#[test]
fn bulk_run_with_no_targets_records_nothing() {
    let conn = open_db_in_memory().unwrap();
    let history = SqliteHistoryRepository::new(&conn);
    let backend = FakeBackend::new();

    let err = BulkDeployment::new(&backend, &history)
        .run(&[], Vec::new(), &BulkParams::default(), |_| {})
        .unwrap_err();
    assert!(matches!(err, DeployError::NoTargets));
    assert_eq!(history.count_records().unwrap(), 0);
}

#[test]
fn history_keeps_newest_records_and_pages_them() {
    let conn = open_db_in_memory().unwrap();
    let history = SqliteHistoryRepository::new(&conn);

    let mut ids = Vec::new();
    for i in 0..(MAX_HISTORY_RECORDS + 5) {
        let form = BulkParams {
            worker_name_base: Some(format!("run-{i}")),
            ..BulkParams::default()
        };
        let record = DeploymentRecord::from_targets(1_700_000_000_000 + i as i64, form, Vec::new());
        history.append_record(&record).unwrap();
        ids.push(record.id);
    }

    assert_eq!(history.count_records().unwrap(), MAX_HISTORY_RECORDS);
    assert!(history.get_record(ids[0]).unwrap().is_none());
    assert!(history.get_record(ids[4]).unwrap().is_none());
    assert!(history.get_record(ids[5]).unwrap().is_some());

    let first = history.list_records(1, 10).unwrap();
    assert_eq!(first.total, MAX_HISTORY_RECORDS);
    assert_eq!(first.total_pages(), 5);
    assert_eq!(first.records.len(), 10);
    assert_eq!(first.records[0].worker_name_base, format!("run-{}", MAX_HISTORY_RECORDS + 4));

    let last = history.list_records(5, 10).unwrap();
    assert_eq!(last.records.len(), 10);
    assert_eq!(last.records[9].worker_name_base, "run-5");

    let beyond = history.list_records(6, 10).unwrap();
    assert!(beyond.records.is_empty());

    assert_eq!(history.clear_history().unwrap(), MAX_HISTORY_RECORDS);
    assert_eq!(history.list_records(1, 10).unwrap().total, 0);
}
