//! Worker deployment through the backend `createWorker` endpoint.
//!
//! # Responsibility
//! - Define the [`WorkerDeployer`] seam and its HTTP implementation.
//! - Run single deploys against the current account.
//! - Host bulk deployment and random name helpers.
//!
//! # Invariants
//! - Deploys never run without credentials.
//! - Parameters are normalized and validated before any request is sent.

pub mod bulk;
pub mod names;

use crate::client::{ApiClient, ApiError, ApiResult};
use crate::logging::mask_email;
use crate::model::deploy::{
    CreateWorkerRequest, CreateWorkerResponse, DeployParams, DeployParamsError,
};
use crate::repo::account_repo::AccountRepository;
use crate::repo::settings_repo::SettingsRepository;
use crate::repo::RepoError;
use crate::service::account_service::{AccountService, AccountServiceError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use bulk::{plan_targets, BulkDeployment, BulkProgress};
pub use names::{generate_uuid, generate_worker_name, generate_worker_name_base};

/// Backend path that creates a worker and returns `{ node, url }`.
pub const CREATE_WORKER_PATH: &str = "/createWorker";

/// Deployment use-case error.
#[derive(Debug)]
pub enum DeployError {
    /// No account is selected (or the selected one is inactive).
    NoCurrentAccount,
    /// Bulk run started with an empty selection.
    NoTargets,
    InvalidParams(DeployParamsError),
    Api(ApiError),
    Account(AccountServiceError),
    Repo(RepoError),
}

impl Display for DeployError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCurrentAccount => write!(f, "no current account selected"),
            Self::NoTargets => write!(f, "no target accounts selected"),
            Self::InvalidParams(err) => write!(f, "{err}"),
            Self::Api(err) => write!(f, "{err}"),
            Self::Account(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DeployError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidParams(err) => Some(err),
            Self::Api(err) => Some(err),
            Self::Account(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeployParamsError> for DeployError {
    fn from(value: DeployParamsError) -> Self {
        Self::InvalidParams(value)
    }
}

impl From<ApiError> for DeployError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<AccountServiceError> for DeployError {
    fn from(value: AccountServiceError) -> Self {
        Self::Account(value)
    }
}

impl From<RepoError> for DeployError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type DeployResult<T> = Result<T, DeployError>;

/// Something that can create a worker node.
pub trait WorkerDeployer {
    fn create_worker(&self, request: &CreateWorkerRequest) -> ApiResult<CreateWorkerResponse>;
}

/// Deployer backed by `POST <backend>/createWorker`.
pub struct HttpWorkerDeployer {
    client: ApiClient,
    endpoint: String,
}

impl HttpWorkerDeployer {
    pub fn new(client: ApiClient, backend_base_url: &str) -> Self {
        let endpoint = format!(
            "{}{}",
            backend_base_url.trim().trim_end_matches('/'),
            CREATE_WORKER_PATH
        );
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl WorkerDeployer for HttpWorkerDeployer {
    fn create_worker(&self, request: &CreateWorkerRequest) -> ApiResult<CreateWorkerResponse> {
        self.client.post_json(&self.endpoint, request)
    }
}

/// Deploys one worker with the current account's credentials.
pub fn deploy_single<A, S, D>(
    accounts: &AccountService<A, S>,
    deployer: &D,
    params: &DeployParams,
) -> DeployResult<CreateWorkerResponse>
where
    A: AccountRepository,
    S: SettingsRepository,
    D: WorkerDeployer + ?Sized,
{
    let credentials = accounts
        .current_credentials()?
        .ok_or(DeployError::NoCurrentAccount)?;
    let params = params.clone().checked()?;

    let request = CreateWorkerRequest::new(&credentials, &params);
    let account = mask_email(&credentials.email);
    info!(
        "event=deploy_single module=deploy status=start account={account} worker={}",
        request.worker_name.as_deref().unwrap_or("-")
    );

    match deployer.create_worker(&request) {
        Ok(response) => {
            info!(
                "event=deploy_single module=deploy status=ok account={account} url={}",
                response.url
            );
            Ok(response)
        }
        Err(err) => {
            error!("event=deploy_single module=deploy status=error account={account} error={err}");
            Err(err.into())
        }
    }
}
