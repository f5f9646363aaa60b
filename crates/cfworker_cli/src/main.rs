//! `cfworker` command-line entry point.
//!
//! # Responsibility
//! - Resolve configuration, start logging and open the local store.
//! - Turn core errors into localized one-line messages and an exit code.

mod args;
mod commands;
mod context;

use args::Cli;
use cfworker_core::config_transfer::ConfigTransferError;
use cfworker_core::i18n::{format_message, message, Language, MessageKey};
use cfworker_core::proxy_ip::ProxyIpError;
use cfworker_core::{
    init_logging, AccountServiceError, ApiError, AppConfig, ConfigOverrides, DeployError,
};
use clap::Parser;
use context::Context;
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let lang_override = match parse_lang_override(cli.lang.as_deref()) {
        Ok(lang) => lang,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = match AppConfig::resolve(ConfigOverrides {
        data_dir: cli.home,
        api_target: cli.api_target,
        stats_url: cli.stats_url,
        ip_url: cli.ip_url,
        log_level: cli.log_level,
    }) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&config.log_level, config.log_dir()) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let ctx = match Context::open(config, lang_override) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("event=cli_start module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match commands::dispatch(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err:#}");
            eprintln!("{}", render_error(&err, ctx.lang));
            ExitCode::FAILURE
        }
    }
}

/// `--lang` must name a supported language when given.
fn parse_lang_override(tag: Option<&str>) -> anyhow::Result<Option<Language>> {
    match tag {
        None => Ok(None),
        Some(tag) => Language::from_tag(tag)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unsupported language `{tag}`; use en or zh")),
    }
}

fn render_error(err: &anyhow::Error, lang: Language) -> String {
    if let Some(err) = err.downcast_ref::<DeployError>() {
        return match err {
            DeployError::NoCurrentAccount => message(lang, MessageKey::PleaseSelectAccount).into(),
            DeployError::NoTargets => message(lang, MessageKey::TargetAccountsRequired).into(),
            DeployError::Api(api) => format!(
                "{} {}",
                message(lang, MessageKey::WorkerCreationFail),
                api.user_message(lang)
            ),
            other => format!("{}: {other}", message(lang, MessageKey::WorkerCreationFail)),
        };
    }
    if let Some(err) = err.downcast_ref::<ApiError>() {
        return err.user_message(lang);
    }
    if let Some(err) = err.downcast_ref::<AccountServiceError>() {
        if let AccountServiceError::AccountNotFound(id) = err {
            return format!("{} ({id})", message(lang, MessageKey::AccountNotFound));
        }
        if let AccountServiceError::Validation(
            cfworker_core::model::account::AccountValidationError::MissingApiKey,
        ) = err
        {
            return message(lang, MessageKey::ApiKeyRequired).into();
        }
    }
    if let Some(err) = err.downcast_ref::<ConfigTransferError>() {
        match err {
            ConfigTransferError::InvalidFormat(details) => {
                return format!("{} ({details})", message(lang, MessageKey::ConfigFileInvalid));
            }
            ConfigTransferError::NoValidAccounts => {
                return message(lang, MessageKey::NoValidAccountsToImport).into();
            }
            _ => {}
        }
    }
    if let Some(err) = err.downcast_ref::<ProxyIpError>() {
        let error = err.to_string();
        return format_message(lang, MessageKey::FetchedIpsFail, &[("error", error.as_str())]);
    }
    format!("error: {err:#}")
}
