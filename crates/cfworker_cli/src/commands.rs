//! Subcommand handlers. Each returns `anyhow::Result` and prints its own output.

use crate::args::{
    AccountAddArgs, AccountCommand, AccountEditArgs, AccountListArgs, BulkArgs, Command,
    ConfigCommand, DeployArgs, FormCommand, GenCommand, HistoryCommand, IpsCommand, NodeArgs,
    SortArg,
};
use crate::context::{Accounts, Context};
use anyhow::{anyhow, bail, Context as _, Result};
use cfworker_core::config_transfer::{export_config, import_config, parse_config, write_export};
use cfworker_core::deploy::{
    deploy_single, generate_uuid, generate_worker_name, generate_worker_name_base, plan_targets,
    BulkDeployment, DeployError, HttpWorkerDeployer,
};
use cfworker_core::i18n::{Language, MessageKey};
use cfworker_core::model::account::{parse_tags, Account, AccountDraft, AccountId, AccountPatch};
use cfworker_core::model::deploy::{DeployParams, DeploymentRecord, TargetStatus};
use cfworker_core::model::format_timestamp;
use cfworker_core::node_output::NodeLinks;
use cfworker_core::proxy_ip::{select_proxy_ips, ProxyIpClient, VISIBLE_COUNTRY_COUNT};
use cfworker_core::repo::account_repo::{AccountListQuery, AccountSort};
use cfworker_core::repo::history_repo::{
    HistoryRepository, DEFAULT_HISTORY_PAGE_SIZE, MAX_HISTORY_RECORDS,
};
use chrono::Utc;
use log::info;
use std::collections::HashSet;

pub fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Account(command) => account(ctx, command),
        Command::Deploy(args) => deploy(ctx, args),
        Command::Bulk(args) => bulk(ctx, args),
        Command::History(command) => history(ctx, command),
        Command::Config(command) => config(ctx, command),
        Command::Ips(command) => ips(ctx, command),
        Command::Form(command) => form(ctx, command),
        Command::Lang { language } => lang(ctx, language),
        Command::Gen(command) => {
            let value = match command {
                GenCommand::Name => generate_worker_name(),
                GenCommand::Base => generate_worker_name_base(),
                GenCommand::Uuid => generate_uuid(),
            };
            println!("{value}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------- accounts

fn account(ctx: &Context, command: AccountCommand) -> Result<()> {
    let accounts = ctx.accounts();
    match command {
        AccountCommand::Add(args) => account_add(ctx, &accounts, args),
        AccountCommand::List(args) => account_list(ctx, &accounts, args),
        AccountCommand::Show { id, reveal } => {
            let account = resolve_account(ctx, &accounts, &id)?;
            let current = accounts.current_account()?.map(|a| a.id);
            print_account_details(&account, current == Some(account.id), reveal);
            Ok(())
        }
        AccountCommand::Edit(args) => account_edit(ctx, &accounts, args),
        AccountCommand::Remove { id, yes } => {
            let account = resolve_account(ctx, &accounts, &id)?;
            if !yes {
                bail!(
                    "refusing to delete `{}` without --yes",
                    account.display_name()
                );
            }
            accounts.delete_account(account.id)?;
            println!("{}", ctx.text(MessageKey::AccountDeleted));
            Ok(())
        }
        AccountCommand::Use { id, none } => {
            if none {
                accounts.set_current_account(None)?;
                return Ok(());
            }
            let input = id.ok_or_else(|| anyhow!("account id required"))?;
            let account = resolve_account(ctx, &accounts, &input)?;
            accounts.set_current_account(Some(account.id))?;
            println!(
                "{} {}",
                ctx.text(MessageKey::AccountSetAsCurrent),
                account.display_name()
            );
            Ok(())
        }
        AccountCommand::Current => {
            match accounts.current_account()? {
                Some(account) => print_account_details(&account, true, false),
                None => println!("{}", ctx.text(MessageKey::PleaseSelectAccount)),
            }
            Ok(())
        }
    }
}

fn account_add(ctx: &Context, accounts: &Accounts<'_>, args: AccountAddArgs) -> Result<()> {
    let draft = AccountDraft {
        name: args.name,
        email: args.email,
        global_api_key: args.key,
        account_id: args.account_id,
        tags: args.tags.as_deref().map(parse_tags).unwrap_or_default(),
        notes: args.notes,
    };
    let account = accounts.add_account(draft)?;
    println!("{} {}", ctx.text(MessageKey::AccountAdded), account.id);
    Ok(())
}

fn account_list(ctx: &Context, accounts: &Accounts<'_>, args: AccountListArgs) -> Result<()> {
    let query = AccountListQuery {
        search: args.search,
        tag: args.tag,
        active_only: !args.all,
        sort: match args.sort {
            SortArg::Updated => AccountSort::UpdatedDesc,
            SortArg::Name => AccountSort::NameAsc,
            SortArg::Created => AccountSort::CreatedDesc,
        },
        ..AccountListQuery::default()
    };
    let listed = accounts.list_accounts(&query)?;
    let current = accounts.current_account()?.map(|a| a.id);

    if args.json {
        let rows: Vec<_> = listed
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "name": a.name,
                    "email": a.email,
                    "tags": a.tags,
                    "isActive": a.is_active,
                    "isCurrent": current == Some(a.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if listed.is_empty() {
        println!("{}", ctx.text(MessageKey::NoAccounts));
        return Ok(());
    }
    println!(
        "  {:<8}  {:<20}  {:<28}  {:<16}  {}",
        "ID", "NAME", "EMAIL", "TAGS", "LAST USED"
    );
    for account in &listed {
        println!(
            "{} {:<8}  {:<20}  {:<28}  {:<16}  {}{}",
            if current == Some(account.id) { '*' } else { ' ' },
            short_id(account.id),
            truncate(account.display_name(), 20),
            truncate(&account.email, 28),
            truncate(&account.tags.join(","), 16),
            format_timestamp(account.updated_at),
            if account.is_active { "" } else { "  (inactive)" }
        );
    }
    Ok(())
}

fn account_edit(ctx: &Context, accounts: &Accounts<'_>, args: AccountEditArgs) -> Result<()> {
    let account = resolve_account(ctx, accounts, &args.id)?;
    let patch = AccountPatch {
        name: args.name,
        email: args.email,
        global_api_key: args.key,
        account_id: args.account_id,
        tags: args.tags.as_deref().map(parse_tags),
        notes: args.notes,
        is_active: args.active,
    };
    if patch.is_empty() {
        bail!("nothing to change; pass at least one field flag");
    }
    accounts.update_account(account.id, patch)?;
    println!("{}", ctx.text(MessageKey::AccountUpdated));
    Ok(())
}

/// Finds an account by full id or unique id prefix.
fn resolve_account(ctx: &Context, accounts: &Accounts<'_>, input: &str) -> Result<Account> {
    let input = input.trim().to_ascii_lowercase();
    if let Ok(id) = AccountId::parse_str(&input) {
        return accounts
            .get_account(id)?
            .ok_or_else(|| anyhow!("{}", ctx.text(MessageKey::AccountNotFound)));
    }

    let mut matches: Vec<_> = accounts
        .list_accounts(&AccountListQuery::default())?
        .into_iter()
        .filter(|a| !input.is_empty() && a.id.to_string().starts_with(&input))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => bail!("{} ({input})", ctx.text(MessageKey::AccountNotFound)),
        n => bail!("id prefix `{input}` matches {n} accounts; use more characters"),
    }
}

fn print_account_details(account: &Account, is_current: bool, reveal: bool) {
    println!("id:          {}", account.id);
    println!("name:        {}", account.name);
    println!("email:       {}", account.email);
    println!(
        "api key:     {}",
        if reveal {
            account.global_api_key.clone()
        } else {
            mask_secret(&account.global_api_key)
        }
    );
    if let Some(account_id) = &account.account_id {
        println!(
            "account id:  {}",
            if reveal {
                account_id.clone()
            } else {
                mask_secret(account_id)
            }
        );
    }
    if !account.tags.is_empty() {
        println!("tags:        {}", account.tags.join(", "));
    }
    if let Some(notes) = &account.notes {
        println!("notes:       {notes}");
    }
    println!("created:     {}", format_timestamp(account.created_at));
    println!("last used:   {}", format_timestamp(account.updated_at));
    println!("active:      {}", account.is_active);
    println!("current:     {is_current}");
}

// ------------------------------------------------------------------ deploy

fn deploy(ctx: &Context, args: DeployArgs) -> Result<()> {
    let accounts = ctx.accounts();
    let forms = ctx.forms();
    let credentials = accounts.current_credentials()?;
    let client = ctx.api_client(credentials)?;

    let mut params = forms.load_worker_form()?.unwrap_or_default();
    if args.random_name {
        params.set_worker_name(generate_worker_name());
    } else if let Some(name) = args.name {
        params.set_worker_name(name);
    }
    if let Some(node_name) = args.node_name {
        params.node_name = Some(node_name);
    }
    apply_node_args(ctx, &client, &mut params, args.node)?;
    let params = params.checked().map_err(DeployError::from)?;
    if !args.no_save {
        forms.save_worker_form(&params)?;
    }

    let deployer = HttpWorkerDeployer::new(client, &ctx.config.api_target);
    let response = deploy_single(&accounts, &deployer, &params)?;
    let links = NodeLinks::from_response(&response);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&links)?);
        return Ok(());
    }
    println!("{}", ctx.text(MessageKey::WorkerCreationSuccess));
    println!();
    println!("node:          {}", links.node);
    println!("worker:        {}", links.worker_url);
    println!("subscription:  {}", links.subscription_url);
    println!("clash:         {}", links.clash_url);
    println!("shadowrocket:  {}", links.shadowrocket_url);
    Ok(())
}

fn bulk(ctx: &Context, args: BulkArgs) -> Result<()> {
    let accounts = ctx.accounts();
    let forms = ctx.forms();
    let client = ctx.api_client(accounts.current_credentials()?)?;

    let mut form = forms.load_bulk_form()?.unwrap_or_default();
    if args.random_base {
        form.worker_name_base = Some(generate_worker_name_base());
    } else if let Some(base) = args.base {
        form.worker_name_base = Some(base);
    }
    apply_node_args(ctx, &client, &mut form.params, args.node)?;
    form.params = form.params.checked().map_err(DeployError::from)?;
    if !args.no_save {
        forms.save_bulk_form(&form)?;
    }

    let all = accounts.list_accounts(&AccountListQuery::default())?;
    let selected: Vec<AccountId> = if args.all_active {
        all.iter().filter(|a| a.is_active).map(|a| a.id).collect()
    } else {
        let ids = args
            .accounts
            .iter()
            .filter(|input| !input.trim().is_empty())
            .map(|input| resolve_account(ctx, &accounts, input).map(|a| a.id))
            .collect::<Result<Vec<_>>>()?;
        dedup_ids(ids)
    };
    if selected.is_empty() {
        bail!("{}", ctx.text(MessageKey::TargetAccountsRequired));
    }

    let targets = plan_targets(&all, &selected);
    let deployer = HttpWorkerDeployer::new(client, &ctx.config.api_target);
    let history = ctx.history();
    let record = BulkDeployment::new(&deployer, &history).run(&all, targets, &form, |progress| {
        let target = progress.target;
        let detail = match target.status {
            TargetStatus::Success => target.worker_url.clone().unwrap_or_default(),
            _ => target.error.clone().unwrap_or_default(),
        };
        eprintln!(
            "[{}/{}] {:>3.0}%  {:<20}  {:<8}  {}",
            progress.completed,
            progress.total,
            progress.percent(),
            truncate(&target.account_name, 20),
            target.status.as_str(),
            detail
        );
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!(
            "{} {}/{} ok, {} failed.",
            ctx.text(MessageKey::BulkDeploymentCompleted),
            record.success_count,
            record.total_accounts,
            record.error_count
        );
    }
    Ok(())
}

/// Drops repeated ids, keeping first-seen order.
fn dedup_ids(ids: Vec<AccountId>) -> Vec<AccountId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Applies shared node flags; relay first so the proxy setters see it.
fn apply_node_args(
    ctx: &Context,
    client: &cfworker_core::ApiClient,
    params: &mut DeployParams,
    args: NodeArgs,
) -> Result<()> {
    if let Some(relay) = args.relay {
        params.socks5_relay = relay;
    }
    if args.random_uuid {
        params.uuid = Some(generate_uuid());
    } else if let Some(uuid) = args.uuid {
        params.uuid = Some(uuid);
    }
    if let Some(domain) = args.domain {
        params.custom_domain = Some(domain);
    }

    let proxy_ip = match args.country {
        Some(country) => Some(fetch_proxy_ips(
            ctx,
            client,
            &country,
            cfworker_core::proxy_ip::MAX_PROXY_IPS,
        )?),
        None => args.proxy_ip,
    };
    match (proxy_ip, args.socks5) {
        // Both given explicitly: keep both and let validation decide.
        (Some(proxy_ip), Some(socks5)) => {
            params.proxy_ip = Some(proxy_ip);
            params.socks5_proxy = Some(socks5);
        }
        (Some(proxy_ip), None) => params.set_proxy_ip(proxy_ip),
        (None, Some(socks5)) => params.set_socks5_proxy(socks5),
        (None, None) => {}
    }
    Ok(())
}

fn fetch_proxy_ips(
    ctx: &Context,
    client: &cfworker_core::ApiClient,
    country: &str,
    max: usize,
) -> Result<String> {
    let ips = ProxyIpClient::new(client, &ctx.config.stats_url, &ctx.config.ip_url);
    let entries = ips.fetch_ips(country)?;
    let value = select_proxy_ips(entries, max);
    let count = cfworker_core::proxy_ip::count_proxy_ips(&value).to_string();
    let country_code = country.trim().to_ascii_uppercase();
    eprintln!(
        "{}",
        ctx.text_with(
            MessageKey::FetchedIpsSuccess,
            &[("count", count.as_str()), ("country", country_code.as_str())]
        )
    );
    Ok(value)
}

// ----------------------------------------------------------------- history

fn history(ctx: &Context, command: HistoryCommand) -> Result<()> {
    let history = ctx.history();
    match command {
        HistoryCommand::List { page, page_size } => {
            let page = history.list_records(page, page_size.unwrap_or(DEFAULT_HISTORY_PAGE_SIZE))?;
            if page.total == 0 {
                println!("{}", ctx.text(MessageKey::NoDeploymentHistory));
                return Ok(());
            }
            println!(
                "{:<8}  {:<19}  {:<20}  {:>5}  {:>5}  {:>5}",
                "ID", "STARTED", "BASE", "TOTAL", "OK", "ERR"
            );
            for record in &page.records {
                println!(
                    "{:<8}  {:<19}  {:<20}  {:>5}  {:>5}  {:>5}",
                    short_id(record.id),
                    format_timestamp(record.timestamp),
                    truncate(&record.worker_name_base, 20),
                    record.total_accounts,
                    record.success_count,
                    record.error_count
                );
            }
            println!(
                "page {}/{} ({} records)",
                page.page,
                page.total_pages(),
                page.total
            );
            Ok(())
        }
        HistoryCommand::Show { id, json } => {
            let record = resolve_record(&history, &id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
            Ok(())
        }
        HistoryCommand::Clear { yes } => {
            if !yes {
                bail!("refusing to clear history without --yes");
            }
            let removed = history.clear_history()?;
            info!("event=history_clear module=cli status=ok removed={removed}");
            println!("{}", ctx.text(MessageKey::DeploymentHistoryCleared));
            Ok(())
        }
    }
}

fn resolve_record(history: &impl HistoryRepository, input: &str) -> Result<DeploymentRecord> {
    let input = input.trim().to_ascii_lowercase();
    let mut matches: Vec<_> = history
        .list_records(1, MAX_HISTORY_RECORDS as u32)?
        .records
        .into_iter()
        .filter(|r| !input.is_empty() && r.id.to_string().starts_with(&input))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => bail!("no deployment record matches `{input}`"),
        n => bail!("id prefix `{input}` matches {n} records; use more characters"),
    }
}

fn print_record(record: &DeploymentRecord) {
    println!("id:       {}", record.id);
    println!("started:  {}", format_timestamp(record.timestamp));
    println!("base:     {}", record.worker_name_base);
    println!(
        "result:   {} ok / {} failed / {} total",
        record.success_count, record.error_count, record.total_accounts
    );
    println!();
    for target in &record.targets {
        let detail = match target.status {
            TargetStatus::Success => format!(
                "{}  {}  {}ms",
                target.worker_name.as_deref().unwrap_or("-"),
                target.worker_url.as_deref().unwrap_or("-"),
                target.deployment_time.unwrap_or_default()
            ),
            _ => target.error.clone().unwrap_or_default(),
        };
        println!(
            "  {:<8}  {:<20}  {}",
            target.status.as_str(),
            truncate(&target.account_name, 20),
            detail
        );
    }
}

// ------------------------------------------------------------------ config

fn config(ctx: &Context, command: ConfigCommand) -> Result<()> {
    let accounts = ctx.accounts();
    let forms = ctx.forms();
    match command {
        ConfigCommand::Export { dir } => {
            let now = Utc::now();
            let data = export_config(&accounts, &forms, now)?;
            let path = write_export(&dir, &data, now)?;
            println!(
                "{} {}",
                ctx.text(MessageKey::ConfigExportSuccess),
                path.display()
            );
            Ok(())
        }
        ConfigCommand::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let data = parse_config(&text)?;
            let report = import_config(&accounts, &forms, &data)?;
            println!("{}", ctx.text(MessageKey::ConfigImportSuccess));
            println!(
                "imported: {}, skipped (masked key): {}, failed: {}",
                report.imported,
                report.skipped_masked,
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  {}: {}", failure.email, failure.error);
            }
            Ok(())
        }
    }
}

// --------------------------------------------------------------------- ips

fn ips(ctx: &Context, command: IpsCommand) -> Result<()> {
    let client = ctx.api_client(None)?;
    match command {
        IpsCommand::Countries { all } => {
            let ips = ProxyIpClient::new(&client, &ctx.config.stats_url, &ctx.config.ip_url);
            let (options, failure) = ips.fetch_countries_or_fallback();
            if let Some(err) = failure {
                let error = err.to_string();
                eprintln!(
                    "{}",
                    ctx.text_with(MessageKey::FetchedIpsFail, &[("error", error.as_str())])
                );
            }
            let shown = if all {
                options.len()
            } else {
                options.len().min(VISIBLE_COUNTRY_COUNT)
            };
            for option in &options[..shown] {
                println!("{}  {:<24}  {}", option.code(), option.label(ctx.lang), option.count);
            }
            if shown < options.len() {
                println!("... {} more (use --all)", options.len() - shown);
            }
            Ok(())
        }
        IpsCommand::Fetch { country, max } => {
            println!("{}", fetch_proxy_ips(ctx, &client, &country, max)?);
            Ok(())
        }
    }
}

// -------------------------------------------------------------------- form

fn form(ctx: &Context, command: FormCommand) -> Result<()> {
    let forms = ctx.forms();
    match command {
        FormCommand::Show { bulk: true } => {
            let form = forms.load_bulk_form()?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
        FormCommand::Show { bulk: false } => {
            let form = forms.load_worker_form()?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&form)?);
            let count = form.proxy_ip_count();
            if count > 0 {
                println!("proxy IPs: {count}");
            }
        }
        FormCommand::Clear { bulk } => {
            if bulk {
                forms.clear_bulk_form()?;
            } else {
                forms.clear_worker_form()?;
            }
            println!("{}", ctx.text(MessageKey::DataClearedSuccess));
        }
    }
    Ok(())
}

fn lang(ctx: &Context, language: Option<String>) -> Result<()> {
    let Some(tag) = language else {
        println!("{}", ctx.lang.as_tag());
        return Ok(());
    };
    let language =
        Language::from_tag(&tag).ok_or_else(|| anyhow!("unsupported language `{tag}`; use en or zh"))?;
    ctx.forms().set_language(language)?;
    println!("{}", language.as_tag());
    Ok(())
}

// ----------------------------------------------------------------- helpers

fn short_id(id: impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// `****abcd` for secrets longer than eight characters, `****` otherwise.
fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
