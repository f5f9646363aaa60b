//! Core domain logic for the Cloudflare Worker node deployer.
//! This crate is the single source of truth for business invariants.

pub mod client;
pub mod config;
pub mod config_transfer;
pub mod db;
pub mod deploy;
pub mod i18n;
pub mod logging;
pub mod model;
pub mod node_output;
pub mod proxy_ip;
pub mod repo;
pub mod service;
pub mod vault;

pub use client::{ApiClient, ApiError, ApiResult};
pub use config::{AppConfig, ConfigError, ConfigOverrides};
pub use db::{open_db, open_db_in_memory, DbError};
pub use deploy::{
    deploy_single, BulkDeployment, DeployError, HttpWorkerDeployer, WorkerDeployer,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::account::{Account, AccountDraft, AccountId, AccountPatch, Credentials};
pub use model::deploy::{
    BulkParams, CreateWorkerRequest, CreateWorkerResponse, DeployParams, DeploymentRecord,
    DeploymentTarget, TargetStatus,
};
pub use repo::{RepoError, RepoResult};
pub use service::account_service::{AccountService, AccountServiceError};
pub use service::form_service::FormService;
pub use vault::{MasterKey, Vault, VaultError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
