//! Command-line surface.

use cfworker_core::config::{ENV_API_TARGET, ENV_HOME, ENV_LOG_LEVEL};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deploy VLESS proxy nodes as Cloudflare Workers across saved accounts.
#[derive(Debug, Parser)]
#[command(name = "cfworker", author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding the account database, key and logs
    #[arg(long, global = true, env = ENV_HOME)]
    pub home: Option<PathBuf>,

    /// Deployment backend base URL
    #[arg(long, global = true, env = ENV_API_TARGET)]
    pub api_target: Option<String>,

    /// Colo statistics endpoint
    #[arg(long, global = true)]
    pub stats_url: Option<String>,

    /// Per-country IP endpoint
    #[arg(long, global = true)]
    pub ip_url: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = ENV_LOG_LEVEL)]
    pub log_level: Option<String>,

    /// Message language for this run (en|zh)
    #[arg(long, global = true)]
    pub lang: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage stored Cloudflare accounts
    #[command(subcommand)]
    Account(AccountCommand),
    /// Deploy one worker node with the current account
    Deploy(DeployArgs),
    /// Deploy one worker per selected account, sequentially
    Bulk(BulkArgs),
    /// Inspect bulk deployment history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Export or import accounts and settings
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Browse proxy IPs by country
    #[command(subcommand)]
    Ips(IpsCommand),
    /// Show or clear saved deploy form values
    #[command(subcommand)]
    Form(FormCommand),
    /// Show or set the stored message language
    Lang {
        /// en or zh; omit to print the current language
        language: Option<String>,
    },
    /// Generate random names and UUIDs
    #[command(subcommand)]
    Gen(GenCommand),
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Add an account (the first one becomes current)
    Add(AccountAddArgs),
    /// List accounts; `*` marks the current one
    List(AccountListArgs),
    /// Show one account
    Show {
        /// Account id or unique id prefix
        id: String,
        /// Print the Global API Key in clear text
        #[arg(long)]
        reveal: bool,
    },
    /// Edit fields of an account
    Edit(AccountEditArgs),
    /// Permanently remove an account
    Remove {
        id: String,
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Select the current account
    Use {
        /// Account id or unique id prefix
        #[arg(required_unless_present = "none")]
        id: Option<String>,
        /// Clear the selection instead
        #[arg(long, conflicts_with = "id")]
        none: bool,
    },
    /// Print the current account
    Current,
}

#[derive(Debug, Args)]
pub struct AccountAddArgs {
    #[arg(long, default_value = "")]
    pub name: String,
    #[arg(long, default_value = "")]
    pub email: String,
    /// Global API Key
    #[arg(long, env = "CFWORKER_API_KEY", hide_env_values = true)]
    pub key: String,
    /// Cloudflare account id
    #[arg(long)]
    pub account_id: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Updated,
    Name,
    Created,
}

#[derive(Debug, Args)]
pub struct AccountListArgs {
    /// Match name, email, tags or notes
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    /// Include inactive accounts
    #[arg(long)]
    pub all: bool,
    #[arg(long, value_enum, default_value = "updated")]
    pub sort: SortArg,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AccountEditArgs {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub key: Option<String>,
    /// Empty string clears it
    #[arg(long)]
    pub account_id: Option<String>,
    /// Comma-separated; replaces existing tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Empty string clears it
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub active: Option<bool>,
}

/// Node parameters shared by `deploy` and `bulk`.
#[derive(Debug, Args, Default)]
pub struct NodeArgs {
    #[arg(long)]
    pub uuid: Option<String>,
    /// Generate a random UUID
    #[arg(long, conflicts_with = "uuid")]
    pub random_uuid: bool,
    /// Comma-separated host:port list
    #[arg(long)]
    pub proxy_ip: Option<String>,
    /// Fill proxy IPs from this country code (e.g. JP)
    #[arg(long, conflicts_with = "proxy_ip")]
    pub country: Option<String>,
    #[arg(long)]
    pub socks5: Option<String>,
    /// Allow proxy IPs and SOCKS5 together (`--relay` or `--relay false`)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub relay: Option<bool>,
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Worker name (also used as node name)
    #[arg(long)]
    pub name: Option<String>,
    /// Generate a random worker name
    #[arg(long, conflicts_with = "name")]
    pub random_name: bool,
    /// Node name shown in clients
    #[arg(long)]
    pub node_name: Option<String>,
    #[command(flatten)]
    pub node: NodeArgs,
    /// Do not remember these values for next time
    #[arg(long)]
    pub no_save: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BulkArgs {
    /// Comma-separated account ids or id prefixes
    #[arg(long, value_delimiter = ',', required_unless_present = "all_active")]
    pub accounts: Vec<String>,
    /// Target every active account
    #[arg(long, conflicts_with = "accounts")]
    pub all_active: bool,
    /// Worker name base; workers are named <base>-1, <base>-2, ...
    #[arg(long)]
    pub base: Option<String>,
    #[arg(long, conflicts_with = "base")]
    pub random_base: bool,
    #[command(flatten)]
    pub node: NodeArgs,
    #[arg(long)]
    pub no_save: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write cfworker-config-YYYY-MM-DD.json (secrets masked)
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Import accounts and settings from an export file
    Import { file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum IpsCommand {
    /// Countries with known proxy IPs, most first
    Countries {
        /// Show every country instead of the top ones
        #[arg(long)]
        all: bool,
    },
    /// Random proxy IPs for one country
    Fetch {
        country: String,
        #[arg(long, default_value_t = cfworker_core::proxy_ip::MAX_PROXY_IPS)]
        max: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum FormCommand {
    Show {
        /// Bulk form instead of the single-deploy form
        #[arg(long)]
        bulk: bool,
    },
    Clear {
        #[arg(long)]
        bulk: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum GenCommand {
    /// word-word-N
    Name,
    /// word-word
    Base,
    Uuid,
}
