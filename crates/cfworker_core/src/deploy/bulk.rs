//! Sequential multi-account deployment.
//!
//! # Invariants
//! - Targets deploy strictly one at a time, in selection order.
//! - One failed target never aborts the run.
//! - Worker names are `<base>-1 .. <base>-n`.
//! - Exactly one history record is appended per completed run.

use crate::client::ApiError;
use crate::deploy::{DeployError, DeployResult, WorkerDeployer};
use crate::logging::mask_email;
use crate::model::account::{Account, AccountId};
use crate::model::deploy::{
    BulkParams, CreateWorkerRequest, DeploymentRecord, DeploymentTarget, TargetStatus,
};
use crate::model::now_epoch_ms;
use crate::repo::history_repo::HistoryRepository;
use log::{info, warn};
use std::time::Instant;

const UNKNOWN_ACCOUNT_NAME: &str = "Unknown";
const ACCOUNT_NOT_FOUND: &str = "Account not found";
const ACCOUNT_INACTIVE: &str = "Account inactive";

/// Snapshot handed to the progress callback after each target finishes.
#[derive(Debug, Clone, Copy)]
pub struct BulkProgress<'t> {
    /// Targets finished so far, including this one.
    pub completed: usize,
    pub total: usize,
    pub target: &'t DeploymentTarget,
}

impl BulkProgress<'_> {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

/// Builds pending targets for `selected` ids, preserving selection order.
///
/// Unknown ids still produce a target (named `Unknown`) so the run reports
/// them as failed instead of silently dropping them.
pub fn plan_targets(accounts: &[Account], selected: &[AccountId]) -> Vec<DeploymentTarget> {
    selected
        .iter()
        .map(|id| match accounts.iter().find(|account| account.id == *id) {
            Some(account) => {
                let name = if account.display_name().trim().is_empty() {
                    UNKNOWN_ACCOUNT_NAME.to_string()
                } else {
                    account.display_name().to_string()
                };
                DeploymentTarget::pending(*id, name, account.email.clone())
            }
            None => DeploymentTarget::pending(*id, UNKNOWN_ACCOUNT_NAME.to_string(), String::new()),
        })
        .collect()
}

/// Runs bulk deployments and records them in history.
pub struct BulkDeployment<'a, D: WorkerDeployer + ?Sized, H: HistoryRepository> {
    deployer: &'a D,
    history: &'a H,
}

impl<'a, D: WorkerDeployer + ?Sized, H: HistoryRepository> BulkDeployment<'a, D, H> {
    pub fn new(deployer: &'a D, history: &'a H) -> Self {
        Self { deployer, history }
    }

    /// Deploys to every target in order and appends the run to history.
    ///
    /// `accounts` supplies credentials; `on_progress` runs after each target.
    pub fn run<F>(
        &self,
        accounts: &[Account],
        targets: Vec<DeploymentTarget>,
        form: &BulkParams,
        mut on_progress: F,
    ) -> DeployResult<DeploymentRecord>
    where
        F: FnMut(BulkProgress<'_>),
    {
        if targets.is_empty() {
            return Err(DeployError::NoTargets);
        }
        let form = BulkParams {
            worker_name_base: form.worker_name_base.clone(),
            params: form.params.clone().checked()?,
        };

        let started_at = now_epoch_ms();
        let total = targets.len();
        info!(
            "event=bulk_deploy module=deploy status=start targets={total} base={}",
            form.effective_base()
        );

        let mut finished = Vec::with_capacity(total);
        for (index, mut target) in targets.into_iter().enumerate() {
            target.status = TargetStatus::Deploying;
            self.deploy_target(accounts, &form, index, &mut target);
            finished.push(target);
            if let Some(target) = finished.last() {
                on_progress(BulkProgress {
                    completed: index + 1,
                    total,
                    target,
                });
            }
        }

        let record = DeploymentRecord::from_targets(started_at, form, finished);
        self.history.append_record(&record)?;
        info!(
            "event=bulk_deploy module=deploy status=ok record={} total={} success={} error={}",
            record.id, record.total_accounts, record.success_count, record.error_count
        );
        Ok(record)
    }

    fn deploy_target(
        &self,
        accounts: &[Account],
        form: &BulkParams,
        index: usize,
        target: &mut DeploymentTarget,
    ) {
        let Some(account) = accounts.iter().find(|a| a.id == target.account_id) else {
            warn!(
                "event=bulk_target module=deploy status=error account={} error=not_found",
                target.account_id
            );
            target.status = TargetStatus::Error;
            target.error = Some(ACCOUNT_NOT_FOUND.to_string());
            return;
        };
        if !account.is_active {
            warn!(
                "event=bulk_target module=deploy status=error account={} error=inactive",
                target.account_id
            );
            target.status = TargetStatus::Error;
            target.error = Some(ACCOUNT_INACTIVE.to_string());
            return;
        }

        let worker_name = form.worker_name_for(index);
        let mut params = form.params.clone();
        params.worker_name = Some(worker_name.clone());
        let request = CreateWorkerRequest::new(&account.credentials(), &params);

        let started = Instant::now();
        match self.deployer.create_worker(&request) {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    "event=bulk_target module=deploy status=ok account={} worker={worker_name} duration_ms={elapsed_ms}",
                    mask_email(&account.email)
                );
                target.status = TargetStatus::Success;
                target.worker_url = Some(response.url);
                target.deployment_time = Some(elapsed_ms);
                target.worker_name = Some(worker_name);
            }
            Err(err) => {
                warn!(
                    "event=bulk_target module=deploy status=error account={} worker={worker_name} error={err}",
                    mask_email(&account.email)
                );
                target.status = TargetStatus::Error;
                target.error = Some(target_error(&err));
            }
        }
    }
}

/// Backend's own error text when it sent one, else the classified error.
fn target_error(err: &ApiError) -> String {
    match err {
        ApiError::Api {
            message: Some(message),
            ..
        } if !message.trim().is_empty() => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResult;
    use crate::model::account::AccountDraft;
    use crate::model::deploy::CreateWorkerResponse;
    use crate::repo::RepoResult;
    use crate::repo::history_repo::HistoryPage;
    use std::cell::RefCell;
    use uuid::Uuid;

    struct RecordingDeployer {
        calls: RefCell<Vec<CreateWorkerRequest>>,
        fail_for: Option<String>,
    }

    impl WorkerDeployer for RecordingDeployer {
        fn create_worker(&self, request: &CreateWorkerRequest) -> ApiResult<CreateWorkerResponse> {
            self.calls.borrow_mut().push(request.clone());
            if self.fail_for.as_deref() == Some(request.email.as_str()) {
                return Err(ApiError::Api {
                    status: 400,
                    message: Some("quota exceeded".to_string()),
                });
            }
            Ok(CreateWorkerResponse {
                node: "vless://node".to_string(),
                url: format!(
                    "https://{}.example.workers.dev",
                    request.worker_name.clone().unwrap_or_default()
                ),
            })
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        records: RefCell<Vec<DeploymentRecord>>,
    }

    impl HistoryRepository for MemoryHistory {
        fn append_record(&self, record: &DeploymentRecord) -> RepoResult<()> {
            self.records.borrow_mut().push(record.clone());
            Ok(())
        }
        fn list_records(&self, page: u32, page_size: u32) -> RepoResult<HistoryPage> {
            Ok(HistoryPage {
                records: self.records.borrow().clone(),
                page,
                page_size,
                total: self.records.borrow().len(),
            })
        }
        fn get_record(&self, id: Uuid) -> RepoResult<Option<DeploymentRecord>> {
            Ok(self.records.borrow().iter().find(|r| r.id == id).cloned())
        }
        fn count_records(&self) -> RepoResult<usize> {
            Ok(self.records.borrow().len())
        }
        fn clear_history(&self) -> RepoResult<usize> {
            Ok(self.records.borrow_mut().drain(..).count())
        }
    }

    fn account(name: &str, email: &str) -> Account {
        Account::from_draft(AccountDraft::new(name, email, "key"), 1_000).unwrap()
    }

    #[test]
    fn plan_targets_falls_back_to_email_then_unknown() {
        let named = account("Main", "main@example.com");
        let unnamed = account("", "second@example.com");
        let missing = Uuid::new_v4();

        let targets = plan_targets(
            &[named.clone(), unnamed.clone()],
            &[unnamed.id, named.id, missing],
        );
        assert_eq!(targets[0].account_name, "second@example.com");
        assert_eq!(targets[1].account_name, "Main");
        assert_eq!(targets[2].account_name, "Unknown");
        assert!(targets.iter().all(|t| t.status == TargetStatus::Pending));
    }

    #[test]
    fn run_names_workers_sequentially_and_records_failures() {
        let a = account("A", "a@example.com");
        let b = account("B", "b@example.com");
        let c = account("C", "c@example.com");
        let accounts = vec![a.clone(), b.clone(), c.clone()];

        let deployer = RecordingDeployer {
            calls: RefCell::new(Vec::new()),
            fail_for: Some("b@example.com".to_string()),
        };
        let history = MemoryHistory::default();
        let form = BulkParams {
            worker_name_base: Some("edge".to_string()),
            ..BulkParams::default()
        };

        let mut seen = Vec::new();
        let record = BulkDeployment::new(&deployer, &history)
            .run(
                &accounts,
                plan_targets(&accounts, &[a.id, b.id, c.id]),
                &form,
                |progress| seen.push((progress.completed, progress.target.status)),
            )
            .unwrap();

        let names: Vec<_> = deployer
            .calls
            .borrow()
            .iter()
            .map(|r| r.worker_name.clone().unwrap())
            .collect();
        assert_eq!(names, ["edge-1", "edge-2", "edge-3"]);
        assert_eq!(
            seen,
            [
                (1, TargetStatus::Success),
                (2, TargetStatus::Error),
                (3, TargetStatus::Success)
            ]
        );

        assert_eq!(record.success_count, 2);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.worker_name_base, "edge");
        assert_eq!(
            record.targets[1].error.as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            record.targets[2].worker_url.as_deref(),
            Some("https://edge-3.example.workers.dev")
        );
        assert_eq!(history.count_records().unwrap(), 1);
    }

    #[test]
    fn run_rejects_empty_selection() {
        let deployer = RecordingDeployer {
            calls: RefCell::new(Vec::new()),
            fail_for: None,
        };
        let history = MemoryHistory::default();
        let err = BulkDeployment::new(&deployer, &history)
            .run(&[], Vec::new(), &BulkParams::default(), |_| {})
            .unwrap_err();
        assert!(matches!(err, DeployError::NoTargets));
        assert_eq!(history.count_records().unwrap(), 0);
    }

    #[test]
    fn missing_account_fails_only_its_target() {
        let a = account("A", "a@example.com");
        let ghost = Uuid::new_v4();
        let deployer = RecordingDeployer {
            calls: RefCell::new(Vec::new()),
            fail_for: None,
        };
        let history = MemoryHistory::default();

        let record = BulkDeployment::new(&deployer, &history)
            .run(
                std::slice::from_ref(&a),
                plan_targets(std::slice::from_ref(&a), &[ghost, a.id]),
                &BulkParams::default(),
                |_| {},
            )
            .unwrap();

        assert_eq!(record.targets[0].status, TargetStatus::Error);
        assert_eq!(record.targets[1].worker_name.as_deref(), Some("worker-2"));
        assert_eq!(deployer.calls.borrow().len(), 1);
    }

    #[test]
    fn inactive_account_is_not_deployed() {
        let on = account("On", "on@example.com");
        let mut off = account("Off", "off@example.com");
        off.is_active = false;
        let accounts = vec![off.clone(), on.clone()];
        let deployer = RecordingDeployer {
            calls: RefCell::new(Vec::new()),
            fail_for: None,
        };
        let history = MemoryHistory::default();

        let record = BulkDeployment::new(&deployer, &history)
            .run(
                &accounts,
                plan_targets(&accounts, &[off.id, on.id]),
                &BulkParams::default(),
                |_| {},
            )
            .unwrap();

        assert_eq!(record.targets[0].status, TargetStatus::Error);
        assert_eq!(record.targets[0].error.as_deref(), Some("Account inactive"));
        assert_eq!(record.targets[1].status, TargetStatus::Success);
        let emails: Vec<_> = deployer
            .calls
            .borrow()
            .iter()
            .map(|r| r.email.clone())
            .collect();
        assert_eq!(emails, ["on@example.com"]);
        assert_eq!(record.error_count, 1);
    }

    #[test]
    fn target_error_prefers_backend_text() {
        let with_text = ApiError::Api {
            status: 400,
            message: Some("worker name taken".to_string()),
        };
        assert_eq!(target_error(&with_text), "worker name taken");

        let blank = ApiError::Api {
            status: 400,
            message: Some("  ".to_string()),
        };
        assert_eq!(target_error(&blank), blank.to_string());
        assert_eq!(
            target_error(&ApiError::Unauthorized),
            ApiError::Unauthorized.to_string()
        );
    }
}
