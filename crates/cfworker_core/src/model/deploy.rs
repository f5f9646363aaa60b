//! Worker deployment parameters, wire payloads and bulk-run records.
//!
//! # Responsibility
//! - Describe optional node parameters shared by single and bulk deploys.
//! - Shape the `POST /createWorker` JSON body and its `{ node, url }` reply.
//! - Record per-target outcomes of a bulk run for history.
//!
//! # Invariants
//! - Request bodies never carry empty strings; blank fields are omitted.
//! - Without SOCKS5 relay, proxy IPs and a SOCKS5 proxy are mutually exclusive.

use crate::model::account::{AccountId, Credentials};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

// Hostname, IPv4 or bracketed IPv6, then a port.
static HOST_PORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[[0-9A-Fa-f:.]+\]|[^\s:\[\],]+):(\d{1,5})$").expect("valid host:port regex")
});

/// Base used for bulk worker names when none is given.
pub const DEFAULT_WORKER_NAME_BASE: &str = "worker";

/// Parameter validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployParamsError {
    /// Both proxy IPs and a SOCKS5 proxy were set while relay mode is off.
    ConflictingProxies,
    /// `uuid` is present but not a valid UUID.
    InvalidUuid(String),
    /// One proxy IP entry is not `host:port`.
    InvalidProxyEntry(String),
}

impl Display for DeployParamsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConflictingProxies => write!(
                f,
                "proxy IPs and a SOCKS5 proxy can only be combined when SOCKS5 relay is enabled"
            ),
            Self::InvalidUuid(value) => write!(f, "invalid node uuid: `{value}`"),
            Self::InvalidProxyEntry(value) => {
                write!(f, "invalid proxy entry `{value}`; expected host:port")
            }
        }
    }
}

impl Error for DeployParamsError {}

/// Optional node parameters entered on the deploy form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployParams {
    pub worker_name: Option<String>,
    pub uuid: Option<String>,
    pub node_name: Option<String>,
    pub proxy_ip: Option<String>,
    pub socks5_proxy: Option<String>,
    pub socks5_relay: bool,
    pub custom_domain: Option<String>,
}

impl DeployParams {
    /// Sets the worker name; the node name follows it, as on the form.
    pub fn set_worker_name(&mut self, value: impl Into<String>) {
        let value = blank_to_none(value.into());
        self.node_name = value.clone();
        self.worker_name = value;
    }

    /// Sets proxy IPs; without relay this clears the SOCKS5 proxy.
    pub fn set_proxy_ip(&mut self, value: impl Into<String>) {
        self.proxy_ip = blank_to_none(value.into());
        if self.proxy_ip.is_some() && !self.socks5_relay {
            self.socks5_proxy = None;
        }
    }

    /// Sets the SOCKS5 proxy; without relay this clears proxy IPs.
    pub fn set_socks5_proxy(&mut self, value: impl Into<String>) {
        self.socks5_proxy = blank_to_none(value.into());
        if self.socks5_proxy.is_some() && !self.socks5_relay {
            self.proxy_ip = None;
        }
    }

    /// Number of non-blank entries in `proxy_ip`.
    pub fn proxy_ip_count(&self) -> usize {
        self.proxy_ip.as_deref().map_or(0, count_proxy_entries)
    }

    /// Trims every field and drops blanks.
    pub fn normalized(self) -> Self {
        Self {
            worker_name: self.worker_name.and_then(blank_to_none),
            uuid: self.uuid.and_then(blank_to_none),
            node_name: self.node_name.and_then(blank_to_none),
            proxy_ip: self.proxy_ip.and_then(blank_to_none),
            socks5_proxy: self.socks5_proxy.and_then(blank_to_none),
            socks5_relay: self.socks5_relay,
            custom_domain: self.custom_domain.and_then(blank_to_none),
        }
    }

    /// Normalized copy, or the first validation error.
    pub fn checked(self) -> Result<Self, DeployParamsError> {
        let params = self.normalized();
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), DeployParamsError> {
        if !self.socks5_relay && self.proxy_ip.is_some() && self.socks5_proxy.is_some() {
            return Err(DeployParamsError::ConflictingProxies);
        }
        if let Some(uuid) = self.uuid.as_deref() {
            Uuid::parse_str(uuid).map_err(|_| DeployParamsError::InvalidUuid(uuid.to_string()))?;
        }
        if let Some(proxy_ip) = self.proxy_ip.as_deref() {
            for entry in proxy_ip.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !is_host_port(entry) {
                    return Err(DeployParamsError::InvalidProxyEntry(entry.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Parameters of a bulk run: shared node params plus the worker name base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkParams {
    pub worker_name_base: Option<String>,
    #[serde(flatten)]
    pub params: DeployParams,
}

impl BulkParams {
    pub fn effective_base(&self) -> &str {
        self.worker_name_base
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
            .unwrap_or(DEFAULT_WORKER_NAME_BASE)
    }

    /// Worker name for the target at zero-based `index`: `<base>-<index + 1>`.
    pub fn worker_name_for(&self, index: usize) -> String {
        format!("{}-{}", self.effective_base(), index + 1)
    }
}

/// JSON body of `POST /createWorker`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkerRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(rename = "globalAPIKey")]
    pub global_api_key: String,
    #[serde(rename = "workerName", skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(rename = "proxyIp", skip_serializing_if = "Option::is_none")]
    pub proxy_ip: Option<String>,
    #[serde(rename = "socks5Proxy", skip_serializing_if = "Option::is_none")]
    pub socks5_proxy: Option<String>,
    #[serde(rename = "socks5Relay")]
    pub socks5_relay: bool,
    #[serde(rename = "customDomain", skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
}

impl Debug for CreateWorkerRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateWorkerRequest")
            .field("email", &self.email)
            .field("global_api_key", &"<redacted>")
            .field("worker_name", &self.worker_name)
            .field("proxy_ip", &self.proxy_ip)
            .field("socks5_relay", &self.socks5_relay)
            .field("custom_domain", &self.custom_domain)
            .finish_non_exhaustive()
    }
}

impl CreateWorkerRequest {
    pub fn new(credentials: &Credentials, params: &DeployParams) -> Self {
        let params = params.clone().normalized();
        Self {
            email: credentials.email.trim().to_string(),
            global_api_key: credentials.global_api_key.trim().to_string(),
            worker_name: params.worker_name,
            uuid: params.uuid,
            node_name: params.node_name,
            proxy_ip: params.proxy_ip,
            socks5_proxy: params.socks5_proxy,
            socks5_relay: params.socks5_relay,
            custom_domain: params.custom_domain,
        }
    }
}

/// Backend reply: the node connection string and the worker URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkerResponse {
    pub node: String,
    pub url: String,
}

/// Lifecycle of one bulk deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Deploying,
    Success,
    Error,
}

impl TargetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One account inside a bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTarget {
    pub account_id: AccountId,
    pub account_name: String,
    pub account_email: String,
    pub status: TargetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_url: Option<String>,
    /// Milliseconds spent on the backend call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
}

impl DeploymentTarget {
    pub fn pending(account_id: AccountId, account_name: String, account_email: String) -> Self {
        Self {
            account_id,
            account_name,
            account_email,
            status: TargetStatus::Pending,
            error: None,
            worker_url: None,
            deployment_time: None,
            worker_name: None,
        }
    }
}

/// Persisted summary of one bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: Uuid,
    /// Run start, Unix epoch milliseconds.
    pub timestamp: i64,
    pub worker_name_base: String,
    pub total_accounts: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub targets: Vec<DeploymentTarget>,
    pub form_data: BulkParams,
}

impl DeploymentRecord {
    /// Builds a record, deriving counters from target statuses.
    pub fn from_targets(
        timestamp: i64,
        form_data: BulkParams,
        targets: Vec<DeploymentTarget>,
    ) -> Self {
        let success_count = targets
            .iter()
            .filter(|t| t.status == TargetStatus::Success)
            .count();
        let error_count = targets
            .iter()
            .filter(|t| t.status == TargetStatus::Error)
            .count();
        Self {
            id: Uuid::new_v4(),
            timestamp,
            worker_name_base: form_data.effective_base().to_string(),
            total_accounts: targets.len(),
            success_count,
            error_count,
            targets,
            form_data,
        }
    }
}

/// Counts non-blank comma-separated entries.
pub fn count_proxy_entries(value: &str) -> usize {
    value.split(',').filter(|entry| !entry.trim().is_empty()).count()
}

fn is_host_port(entry: &str) -> bool {
    HOST_PORT_RE
        .captures(entry)
        .and_then(|caps| caps.get(1))
        .is_some_and(|port| port.as_str().parse::<u16>().is_ok())
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials {
            email: "ops@example.com".to_string(),
            global_api_key: "key-123".to_string(),
        }
    }

    #[test]
    fn request_body_omits_blank_fields() {
        let params = DeployParams {
            worker_name: Some("edge-fox-7".to_string()),
            uuid: Some("  ".to_string()),
            custom_domain: Some(String::new()),
            ..DeployParams::default()
        };

        let body = serde_json::to_value(CreateWorkerRequest::new(&credentials(), &params)).unwrap();
        assert_eq!(
            body,
            json!({
                "email": "ops@example.com",
                "globalAPIKey": "key-123",
                "workerName": "edge-fox-7",
                "socks5Relay": false,
            })
        );
    }

    #[test]
    fn request_body_omits_email_of_name_only_account() {
        let credentials = Credentials {
            email: "  ".to_string(),
            global_api_key: "key-123".to_string(),
        };

        let body =
            serde_json::to_value(CreateWorkerRequest::new(&credentials, &DeployParams::default()))
                .unwrap();
        assert_eq!(body, json!({"globalAPIKey": "key-123", "socks5Relay": false}));
    }

    #[test]
    fn checked_normalizes_before_validating() {
        let params = DeployParams {
            worker_name: Some("  edge  ".to_string()),
            ..DeployParams::default()
        };
        assert_eq!(params.checked().unwrap().worker_name.as_deref(), Some("edge"));

        let conflicting = DeployParams {
            proxy_ip: Some("1.1.1.1:443".to_string()),
            socks5_proxy: Some("2.2.2.2:1080".to_string()),
            ..DeployParams::default()
        };
        assert_eq!(
            conflicting.checked(),
            Err(DeployParamsError::ConflictingProxies)
        );
    }

    #[test]
    fn proxy_setters_are_exclusive_without_relay() {
        let mut params = DeployParams::default();
        params.set_socks5_proxy("user:pass@1.2.3.4:1080");
        params.set_proxy_ip("1.1.1.1:443,2.2.2.2:443");
        assert_eq!(params.socks5_proxy, None);
        assert_eq!(params.proxy_ip_count(), 2);

        params.set_socks5_proxy("5.5.5.5:1080");
        assert_eq!(params.proxy_ip, None);
    }

    #[test]
    fn relay_allows_both_proxy_kinds() {
        let mut params = DeployParams {
            socks5_relay: true,
            ..DeployParams::default()
        };
        params.set_proxy_ip("1.1.1.1:443");
        params.set_socks5_proxy("5.5.5.5:1080");
        assert!(params.proxy_ip.is_some());
        assert!(params.socks5_proxy.is_some());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_rejects_conflicts_and_bad_entries() {
        let conflicting = DeployParams {
            proxy_ip: Some("1.1.1.1:443".to_string()),
            socks5_proxy: Some("5.5.5.5:1080".to_string()),
            ..DeployParams::default()
        };
        assert_eq!(
            conflicting.validate(),
            Err(DeployParamsError::ConflictingProxies)
        );

        let bad_entry = DeployParams {
            proxy_ip: Some("1.1.1.1:443, nope".to_string()),
            ..DeployParams::default()
        };
        assert_eq!(
            bad_entry.validate(),
            Err(DeployParamsError::InvalidProxyEntry("nope".to_string()))
        );

        let bad_uuid = DeployParams {
            uuid: Some("not-a-uuid".to_string()),
            ..DeployParams::default()
        };
        assert!(matches!(
            bad_uuid.validate(),
            Err(DeployParamsError::InvalidUuid(_))
        ));
    }

    #[test]
    fn worker_name_follows_base_and_index() {
        let bulk = BulkParams::default();
        assert_eq!(bulk.worker_name_for(0), "worker-1");

        let named = BulkParams {
            worker_name_base: Some(" swift-fox ".to_string()),
            ..BulkParams::default()
        };
        assert_eq!(named.worker_name_for(2), "swift-fox-3");
    }

    #[test]
    fn record_counts_statuses() {
        let mut ok = DeploymentTarget::pending(Uuid::new_v4(), "a".into(), "a@x.io".into());
        ok.status = TargetStatus::Success;
        let mut failed = DeploymentTarget::pending(Uuid::new_v4(), "b".into(), "b@x.io".into());
        failed.status = TargetStatus::Error;

        let record = DeploymentRecord::from_targets(5, BulkParams::default(), vec![ok, failed]);
        assert_eq!(record.total_accounts, 2);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.worker_name_base, DEFAULT_WORKER_NAME_BASE);
    }

    #[test]
    fn host_port_accepts_hostnames_and_bracketed_ipv6() {
        assert!(is_host_port("proxy.example.com:8443"));
        assert!(is_host_port("[2606:4700::1]:443"));
        assert!(!is_host_port("2606:4700::1:443"));
        assert!(!is_host_port("1.1.1.1:70000"));
        assert!(!is_host_port("1.1.1.1"));
    }
}
