//! User-facing message catalog (English and Chinese).
//!
//! Log lines stay English key=value; only notifications shown to the user go
//! through this catalog.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    /// Parses a BCP-47-ish tag (`en`, `en-US`, `zh_CN.UTF-8`, ...).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag
            .trim()
            .split(|c| c == '-' || c == '_' || c == '.')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Language from `LC_ALL` / `LANG`, defaulting to English.
    pub fn detect_from_env() -> Self {
        ["LC_ALL", "LANG"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find_map(|value| Self::from_tag(&value))
            .unwrap_or_default()
    }
}

/// Keys of user-facing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    AccountAdded,
    AccountUpdated,
    AccountDeleted,
    AccountSetAsCurrent,
    AccountNotFound,
    NoAccounts,
    PleaseSelectAccount,
    ApiKeyRequired,
    WorkerCreationSuccess,
    WorkerCreationFail,
    BulkDeploymentCompleted,
    TargetAccountsRequired,
    DeploymentHistoryCleared,
    NoDeploymentHistory,
    ConfigExportSuccess,
    ConfigImportSuccess,
    ConfigFileInvalid,
    NoValidAccountsToImport,
    DataClearedSuccess,
    FetchedIpsSuccess,
    FetchedIpsFail,
    AuthenticationFailed,
    AccessDenied,
    RateLimitExceeded,
    ServerError,
    ApiErrorPrefix,
}

/// Returns the catalog text for `key`. Placeholders look like `{name}`.
pub fn message(lang: Language, key: MessageKey) -> &'static str {
    use MessageKey::*;
    match lang {
        Language::En => match key {
            AccountAdded => "Account added and encrypted securely.",
            AccountUpdated => "Account updated and saved securely.",
            AccountDeleted => "Account permanently removed from storage.",
            AccountSetAsCurrent => "Account set as current.",
            AccountNotFound => "Account not found.",
            NoAccounts => "No accounts yet. Add one with `account add`.",
            PleaseSelectAccount => "Please select an account first.",
            ApiKeyRequired => "Global API Key is required.",
            WorkerCreationSuccess => "Worker node created successfully!",
            WorkerCreationFail => {
                "Failed to create Worker node. Please check your input and try again."
            }
            BulkDeploymentCompleted => "Bulk deployment completed.",
            TargetAccountsRequired => "Please select target accounts.",
            DeploymentHistoryCleared => "Deployment history cleared.",
            NoDeploymentHistory => "No deployment history yet.",
            ConfigExportSuccess => "Configuration exported successfully.",
            ConfigImportSuccess => "Configuration imported successfully.",
            ConfigFileInvalid => "Invalid configuration file.",
            NoValidAccountsToImport => "No valid accounts to import.",
            DataClearedSuccess => "Saved data has been cleared.",
            FetchedIpsSuccess => "Fetched {count} proxy IPs for {country}.",
            FetchedIpsFail => "Failed to fetch proxy IPs: {error}",
            AuthenticationFailed => "Authentication failed. Please check your API credentials.",
            AccessDenied => "Access denied. Please check your account permissions.",
            RateLimitExceeded => "Rate limit exceeded. Please try again later.",
            ServerError => "Server error. Please try again later.",
            ApiErrorPrefix => "API Error",
        },
        Language::Zh => match key {
            AccountAdded => "账号已添加并加密保存。",
            AccountUpdated => "账号信息已更新并安全保存。",
            AccountDeleted => "账号已从存储中永久删除。",
            AccountSetAsCurrent => "已设为当前账号。",
            AccountNotFound => "未找到账号。",
            NoAccounts => "还没有账号，请先使用 `account add` 添加。",
            PleaseSelectAccount => "请先选择一个账号。",
            ApiKeyRequired => "必须填写 Global API Key。",
            WorkerCreationSuccess => "Worker 节点创建成功！",
            WorkerCreationFail => "创建 Worker 节点失败，请检查输入后重试。",
            BulkDeploymentCompleted => "批量部署完成。",
            TargetAccountsRequired => "请选择目标账号。",
            DeploymentHistoryCleared => "部署历史已清空。",
            NoDeploymentHistory => "暂无部署历史。",
            ConfigExportSuccess => "配置导出成功。",
            ConfigImportSuccess => "配置导入成功。",
            ConfigFileInvalid => "配置文件无效。",
            NoValidAccountsToImport => "没有可导入的有效账号。",
            DataClearedSuccess => "已清除保存的数据。",
            FetchedIpsSuccess => "已获取 {country} 的 {count} 个代理 IP。",
            FetchedIpsFail => "获取代理 IP 失败：{error}",
            AuthenticationFailed => "认证失败，请检查 API 凭证。",
            AccessDenied => "访问被拒绝，请检查账号权限。",
            RateLimitExceeded => "请求过于频繁，请稍后再试。",
            ServerError => "服务器错误，请稍后再试。",
            ApiErrorPrefix => "API 错误",
        },
    }
}

/// Looks up `key` and substitutes `{name}` placeholders.
pub fn format_message(lang: Language, key: MessageKey, args: &[(&str, &str)]) -> String {
    args.iter()
        .fold(message(lang, key).to_string(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tag_accepts_locale_forms() {
        assert_eq!(Language::from_tag("en-US"), Some(Language::En));
        assert_eq!(Language::from_tag("zh_CN.UTF-8"), Some(Language::Zh));
        assert_eq!(Language::from_tag("ZH"), Some(Language::Zh));
        assert_eq!(Language::from_tag("fr"), None);
        assert_eq!(Language::from_tag(""), None);
    }

    #[test]
    fn format_message_fills_placeholders() {
        let text = format_message(
            Language::En,
            MessageKey::FetchedIpsSuccess,
            &[("count", "5"), ("country", "JP")],
        );
        assert_eq!(text, "Fetched 5 proxy IPs for JP.");

        let zh = format_message(
            Language::Zh,
            MessageKey::FetchedIpsSuccess,
            &[("count", "5"), ("country", "JP")],
        );
        assert!(zh.contains('5') && zh.contains("JP"));
    }
}
