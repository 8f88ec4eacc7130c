//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use skycache_core::download::MAX_CONCURRENCY;
use skycache_core::{Host, WaitPolicy};

/// Fetch, cache and verify science data products from a remote archive.
#[derive(Parser, Debug)]
#[command(name = "skycache")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Local cache root (overrides SKYCACHE_DATA)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Credential file (overrides SKYCACHE_CREDENTIALS)
    #[arg(long, global = true, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print local paths of products, fetching what is not cached.
    Get {
        /// Logical product ids (archive-relative paths).
        #[arg(required = true)]
        ids: Vec<String>,

        /// Product-type suffix replacing the id's own (repeatable).
        #[arg(short, long = "suffix", value_name = "SUFFIX")]
        suffixes: Vec<String>,

        /// Host to fetch from (primary or mirror).
        #[arg(long, default_value = "primary")]
        host: Host,

        /// Fetch even when a cached copy exists.
        #[arg(long)]
        overwrite: bool,

        /// Trust cached copies without running the integrity test.
        #[arg(long)]
        no_verify: bool,

        /// Only resolve paths; never contact the archive.
        #[arg(long)]
        no_download: bool,

        /// Parallel downloads.
        #[arg(short = 'j', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=MAX_CONCURRENCY as i64))]
        jobs: u16,

        /// Pause before each request: auto, none, fixed:S, jitter:S or rate:R.
        #[arg(long, default_value = "auto")]
        wait: WaitPolicy,

        /// Fail on the first transfer error instead of reporting it.
        #[arg(long)]
        strict: bool,
    },

    /// Check cached files and remediate corrupt ones.
    Check {
        /// Extension of files to check (`*` for all).
        #[arg(short, long, default_value = "fits")]
        extension: String,

        /// Leave corrupt files on disk.
        #[arg(long)]
        keep_bad: bool,

        /// Re-download corrupt files from hosts that support it.
        #[arg(long)]
        redownload: bool,

        /// Parallel checks and re-downloads.
        #[arg(short = 'j', long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=MAX_CONCURRENCY as i64))]
        jobs: u16,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Probe whether a product exists on its host.
    Exists {
        /// Logical product id.
        id: String,

        /// Product-type suffix replacing the id's own.
        #[arg(short, long)]
        suffix: Option<String>,

        /// Host to probe (primary or mirror).
        #[arg(long, default_value = "primary")]
        host: Host,
    },

    /// Store credentials for a service.
    Account {
        /// Service name (e.g. `primary`).
        service: String,

        /// Account name; prompted when omitted.
        #[arg(short, long)]
        username: Option<String>,

        /// Store a token instead of a username and password.
        #[arg(long, conflicts_with = "username")]
        token: bool,

        /// Skip the live login probe.
        #[arg(long)]
        no_test: bool,

        /// Store credentials even when the probe rejects them.
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_defaults() {
        let args = Args::try_parse_from(["skycache", "get", "sci/a_sciimg.fits"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        let Command::Get {
            ids,
            suffixes,
            host,
            overwrite,
            no_verify,
            no_download,
            jobs,
            wait,
            strict,
        } = args.command
        else {
            panic!("expected get");
        };
        assert_eq!(ids, vec!["sci/a_sciimg.fits"]);
        assert!(suffixes.is_empty());
        assert_eq!(host, Host::Primary);
        assert!(!overwrite && !no_verify && !no_download && !strict);
        assert_eq!(jobs, 1);
        assert_eq!(wait, WaitPolicy::Auto);
    }

    #[test]
    fn test_cli_get_repeated_suffix_and_mirror() {
        let args = Args::try_parse_from([
            "skycache", "get", "a_x.fits", "-s", "sciimg.fits", "--suffix", "mskimg.fits",
            "--host", "mirror", "-j", "4",
        ])
        .unwrap();
        let Command::Get {
            suffixes,
            host,
            jobs,
            ..
        } = args.command
        else {
            panic!("expected get");
        };
        assert_eq!(suffixes, vec!["sciimg.fits", "mskimg.fits"]);
        assert_eq!(host, Host::Mirror);
        assert_eq!(jobs, 4);
    }

    #[test]
    fn test_cli_get_requires_ids() {
        let err = Args::try_parse_from(["skycache", "get"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_unknown_host_rejected() {
        let err = Args::try_parse_from(["skycache", "get", "a", "--host", "elsewhere"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_jobs_zero_rejected() {
        let err = Args::try_parse_from(["skycache", "check", "-j", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "skycache", "check", "--root", "/tmp/cache", "-vv", "--json",
        ])
        .unwrap();
        assert_eq!(args.root, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(args.verbose, 2);
        assert!(matches!(
            args.command,
            Command::Check { json: true, ref extension, .. } if extension == "fits"
        ));
    }

    #[test]
    fn test_cli_account_token_conflicts_with_username() {
        let err =
            Args::try_parse_from(["skycache", "account", "broker", "--token", "-u", "ada"])
                .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_wait_spec_parsed() {
        let args = Args::try_parse_from(["skycache", "get", "a", "--wait", "rate:50"]).unwrap();
        let Command::Get { wait, .. } = args.command else {
            panic!("expected get");
        };
        assert_eq!(wait, WaitPolicy::PerBatch { rate: 50.0 });
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["skycache", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
