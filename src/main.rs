//! CLI entry point for skycache.

use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use skycache_core::auth::{CredentialPrompt, CredentialStore};
use skycache_core::download::FetchOptions;
use skycache_core::host::AuthScheme;
use skycache_core::{
    Archive, AuthError, CacheConfig, CheckOptions, Concurrency, Credentials, FileRequest,
    GetOptions, Host, IniCredentialStore, RemediationPolicy, SessionManager,
};
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::{Args, Command};
use progress::BarProgress;

/// Reads credentials from the terminal; the password is not echoed.
#[derive(Debug)]
struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self, service: &str) -> Result<Credentials, AuthError> {
        let username = read_line(&format!("Username for {service}: "))?;
        let password = rpassword::prompt_password(format!("Password for {service}: "))
            .map_err(|e| AuthError::Prompt {
                reason: e.to_string(),
            })?;
        Ok(Credentials::Password { username, password })
    }
}

fn read_line(prompt: &str) -> Result<String, AuthError> {
    let to_prompt_error = |e: io::Error| AuthError::Prompt {
        reason: e.to_string(),
    };
    let mut stderr = io::stderr();
    stderr
        .write_all(prompt.as_bytes())
        .and_then(|()| stderr.flush())
        .map_err(to_prompt_error)?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(to_prompt_error)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(AuthError::Prompt {
            reason: "empty input".to_string(),
        });
    }
    Ok(line)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut config = CacheConfig::from_env().context("invalid environment configuration")?;
    if let Some(root) = &args.root {
        config = config.with_root(root);
    }
    if let Some(credentials) = &args.credentials {
        config = config.with_credentials_path(credentials);
    }
    debug!(root = %config.root().display(), "cache root");

    let store = Arc::new(IniCredentialStore::new(config.credentials_path()));
    let mut sessions = SessionManager::new(config.clone(), store.clone());
    if io::stdin().is_terminal() {
        sessions = sessions.with_prompt(Arc::new(TerminalPrompt));
    }
    let show_progress = !args.quiet && io::stderr().is_terminal();

    let ok = match args.command {
        Command::Get {
            ids,
            suffixes,
            host,
            overwrite,
            no_verify,
            no_download,
            jobs,
            wait,
            strict,
        } => {
            let mut archive = Archive::new(config)
                .with_sessions(sessions)
                .with_fetch_options(FetchOptions {
                    strict,
                    ..FetchOptions::default()
                });
            if show_progress {
                archive = archive.with_progress(Arc::new(BarProgress::new()));
            }
            let options = GetOptions {
                suffixes,
                host,
                download: !no_download,
                overwrite,
                verify: !no_verify,
                concurrency: Concurrency::workers(usize::from(jobs))?,
                wait,
                ..GetOptions::default()
            };
            let report = archive.get_path(ids.as_slice(), &options).await?;
            for failure in report.batch.failures() {
                warn!(url = %failure.url, outcome = ?failure.outcome, "fetch failed");
            }
            for corrupt in report.batch.corrupted() {
                warn!(path = %corrupt.local_path.display(), reason = %corrupt.reason, "downloaded file is corrupt");
            }
            for path in &report.paths {
                println!("{}", path.display());
            }
            report.is_complete()
        }
        Command::Check {
            extension,
            keep_bad,
            redownload,
            jobs,
            json,
        } => {
            let mut archive = Archive::new(config).with_sessions(sessions);
            if show_progress && !json {
                archive = archive.with_progress(Arc::new(BarProgress::new()));
            }
            let options = CheckOptions {
                workers: usize::from(jobs),
                policy: if keep_bad {
                    RemediationPolicy::Keep
                } else {
                    RemediationPolicy::Erase
                },
                redownload,
                concurrency: Concurrency::workers(usize::from(jobs))?,
                ..CheckOptions::default()
            };
            let report = archive.check_cache(&extension, None, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for bad in &report.bad {
                    println!("{}", bad.local_path.display());
                }
                info!(
                    checked = report.checked,
                    bad = report.bad.len(),
                    redownloaded = report.redownloaded.len(),
                    "cache check finished"
                );
            }
            report.is_clean()
        }
        Command::Exists { id, suffix, host } => {
            let archive = Archive::new(config).with_sessions(sessions);
            let mut request = FileRequest::new(id).with_host(host);
            if let Some(suffix) = suffix {
                request = request.with_suffix(suffix);
            }
            let exists = archive.exists_remote(&request, None).await?;
            println!("{exists}");
            exists
        }
        Command::Account {
            service,
            username,
            token,
            no_test,
            force,
        } => {
            // Host aliases are stored under the canonical host name.
            let service = service
                .parse::<Host>()
                .map_or(service, |h| h.name().to_string());
            let credentials = if token {
                let token = rpassword::prompt_password(format!("Token for {service}: "))?;
                Credentials::Token(token)
            } else {
                let username = match username {
                    Some(username) => username,
                    None => read_line(&format!("Username for {service}: "))?,
                };
                let password = rpassword::prompt_password(format!("Password for {service}: "))?;
                Credentials::Password { username, password }
            };

            let probe_host = service
                .parse::<Host>()
                .ok()
                .filter(|h| h.auth_scheme() == AuthScheme::CookieLogin);
            if let (Some(host), false) = (probe_host, no_test) {
                let accepted = sessions.verify_credentials(host, &credentials).await?;
                if !accepted && !force {
                    bail!("{host} rejected the credentials; nothing stored (use --force to store anyway)");
                }
                if accepted {
                    info!(%host, "credentials accepted");
                }
            }
            store.set_account(&service, &credentials)?;
            info!(service = %service, path = %store.path().display(), "account saved");
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
