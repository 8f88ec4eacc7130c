//! High-level entry points.
//!
//! [`Archive`] wires naming, cache decisions, sessions, the orchestrator
//! and remediation together behind the three operations callers use:
//! [`Archive::get_path`], [`Archive::bulk_get`] and [`Archive::check_cache`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::auth::{Credentials, IniCredentialStore, Session, SessionError, SessionManager};
use crate::cache::{CacheDecider, find_local_files};
use crate::config::{CacheConfig, ConfigError};
use crate::download::{
    BatchReport, Concurrency, CutoutRequest, DEFAULT_EXTERNAL_RATE, DownloadError,
    DownloadOrchestrator, DownloadTask, EngineError, FetchError, FetchOptions, FetchReport,
    Fetcher, MAX_CONCURRENCY, MIN_CONCURRENCY, ProgressSink, WaitPolicy, WaitSpec,
};
use crate::host::Host;
use crate::integrity::{IntegrityChecker, IntegrityVerdict};
use crate::naming::{FileRequest, MirrorLayout, NamingResolver};
use crate::remediation::{CorruptionReport, RemediationPolicy, Remediator};

/// Errors that end an archive operation.
///
/// Per-file transfer and integrity problems are reported in the returned
/// reports instead.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Invalid request or configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No usable session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Batch dispatch failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A single-request transfer failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A single-request fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A background integrity check did not complete.
    #[error("integrity check worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How `get_path` reports paths that are still absent afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Return the path anyway.
    #[default]
    Keep,
    /// Leave it out.
    Remove,
    /// Return this placeholder instead.
    Replace(PathBuf),
}

/// Options for [`Archive::get_path`] and [`Archive::bulk_get`].
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Product-type suffixes; each id is requested once per suffix.
    pub suffixes: Vec<String>,
    /// Host to fetch from (`get_path` only; bulk requests carry their own).
    pub host: Host,
    /// Fetch what is missing; `false` only resolves paths.
    pub download: bool,
    /// Fetch even when a cached copy exists.
    pub overwrite: bool,
    /// Run the integrity test on cached copies before trusting them.
    pub verify: bool,
    /// How the batch is executed.
    pub concurrency: Concurrency,
    /// Pre-request pause.
    pub wait: WaitPolicy,
    /// Request cutouts instead of full products.
    pub cutout: Option<CutoutRequest>,
    /// Handling of paths still absent afterwards.
    pub missing: MissingPolicy,
    /// Credentials to use instead of the store.
    pub credentials: Option<Credentials>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            suffixes: Vec::new(),
            host: Host::Primary,
            download: true,
            overwrite: false,
            verify: true,
            concurrency: Concurrency::Sequential,
            wait: WaitPolicy::Auto,
            cutout: None,
            missing: MissingPolicy::Keep,
            credentials: None,
        }
    }
}

/// Result of [`Archive::get_path`] / [`Archive::bulk_get`].
#[derive(Debug, Clone, Default)]
pub struct GetReport {
    /// Requested paths after the missing policy was applied.
    pub paths: Vec<PathBuf>,
    /// Requested paths that do not exist after the run.
    pub missing: Vec<PathBuf>,
    /// Per-task reports of what was fetched.
    pub batch: BatchReport,
}

impl GetReport {
    /// Whether every requested file is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Options for [`Archive::check_cache`].
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Parallel integrity checks.
    pub workers: usize,
    /// What to do with corrupt files.
    pub policy: RemediationPolicy,
    /// Re-download corrupt files from hosts that support it.
    pub redownload: bool,
    /// Record verification sidecars for files that pass.
    pub write_hash: bool,
    /// How re-downloads are executed.
    pub concurrency: Concurrency,
    /// Credentials for re-downloads instead of the store.
    pub credentials: Option<Credentials>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            policy: RemediationPolicy::Erase,
            redownload: false,
            write_hash: true,
            concurrency: Concurrency::Sequential,
            credentials: None,
        }
    }
}

/// Result of [`Archive::check_cache`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheCheckReport {
    /// Files inspected.
    pub checked: usize,
    /// Files found corrupt, with what was done about them.
    pub bad: Vec<CorruptionReport>,
    /// Outcomes of re-downloads, in re-queue order.
    pub redownloaded: Vec<FetchReport>,
}

impl CacheCheckReport {
    /// Whether no corrupt file was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.bad.is_empty()
    }
}

/// Facade over one local cache of the remote archive.
#[derive(Debug, Clone)]
pub struct Archive {
    config: CacheConfig,
    resolver: Arc<dyn NamingResolver>,
    checker: IntegrityChecker,
    sessions: SessionManager,
    fetch_options: FetchOptions,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl Archive {
    /// Archive using the mirrored directory layout, the credential file of
    /// `config` and default fetch options.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(IniCredentialStore::new(config.credentials_path()));
        Self {
            resolver: Arc::new(MirrorLayout::from_config(&config)),
            checker: IntegrityChecker::default(),
            sessions: SessionManager::new(config.clone(), store),
            fetch_options: FetchOptions::default(),
            progress: None,
            config,
        }
    }

    /// Replaces the naming scheme.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn NamingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the integrity checker.
    #[must_use]
    pub fn with_checker(mut self, checker: IntegrityChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Replaces the session manager (custom store or prompt).
    #[must_use]
    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = sessions;
        self
    }

    /// Replaces the fetch options.
    #[must_use]
    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    /// Attaches a progress side channel to every batch.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Session manager in use.
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Cache decider over this archive's root.
    #[must_use]
    pub fn decider(&self) -> CacheDecider {
        CacheDecider::new(
            self.checker.clone(),
            Arc::clone(&self.resolver),
            self.config.root(),
        )
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.fetch_options, self.checker.clone())
    }

    /// Opens a session for `host`, logging in when the host requires it.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Session`] when no session can be established.
    pub async fn open_session(
        &self,
        host: Host,
        credentials: Option<&Credentials>,
    ) -> Result<Session, ArchiveError> {
        Ok(self.sessions.acquire(host, credentials).await?)
    }

    /// Local paths of `ids` (once per suffix), fetching what is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] for unresolvable ids, invalid options or
    /// authentication failure. Individual transfer failures are reported in
    /// [`GetReport::batch`].
    #[instrument(skip(self, ids, options), fields(ids = ids.len(), host = %options.host))]
    pub async fn get_path<S: AsRef<str>>(
        &self,
        ids: &[S],
        options: &GetOptions,
    ) -> Result<GetReport, ArchiveError> {
        let requests = expand_requests(ids, &options.suffixes, options.host);
        self.bulk_get(&requests, options).await
    }

    /// Fetches every request that is not already cached, one session per
    /// host acquired before dispatch.
    ///
    /// # Errors
    ///
    /// See [`Archive::get_path`].
    #[instrument(skip(self, requests, options), fields(requests = requests.len()))]
    pub async fn bulk_get(
        &self,
        requests: &[FileRequest],
        options: &GetOptions,
    ) -> Result<GetReport, ArchiveError> {
        options.concurrency.validate()?;
        let root = self.config.root();
        let locations = requests
            .iter()
            .map(|r| self.resolver.resolve(r, root))
            .collect::<Result<Vec<_>, _>>()?;
        let paths: Vec<PathBuf> = locations.iter().map(|l| l.local_path.clone()).collect();

        let batch = if options.download {
            let flags = self
                .decider()
                .decide_paths(&paths, options.overwrite, options.verify);
            let tasks: Vec<(Host, DownloadTask)> = requests
                .iter()
                .zip(locations)
                .zip(flags)
                .filter(|(_, download)| *download)
                .map(|((request, location), _)| {
                    let mut task = DownloadTask::new(location.remote_url, location.local_path)
                        .with_overwrite(true);
                    if let Some(cutout) = &options.cutout {
                        task = task.with_cutout(cutout.clone());
                    }
                    (request.host, task)
                })
                .collect();
            info!(
                requested = requests.len(),
                to_fetch = tasks.len(),
                "cache decisions made"
            );
            self.run_batches(
                tasks,
                Vec::new(),
                &options.concurrency,
                options.wait,
                options.credentials.as_ref(),
            )
            .await?
        } else {
            BatchReport::default()
        };

        let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.is_file()).cloned().collect();
        if !missing.is_empty() {
            warn!(count = missing.len(), "requested files still missing");
        }
        Ok(GetReport {
            paths: apply_missing_policy(paths, &options.missing),
            missing,
            batch,
        })
    }

    /// Checks every cached file ending in `.extension` under `root` (or the
    /// configured root), remediates corrupt ones and optionally re-downloads
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] for an invalid worker count, failed check
    /// workers or, when re-downloading, authentication failure. Sessions are
    /// opened before remediation, so that failure leaves every file in place.
    #[instrument(skip(self, root, options))]
    pub async fn check_cache(
        &self,
        extension: &str,
        root: Option<&Path>,
        options: &CheckOptions,
    ) -> Result<CacheCheckReport, ArchiveError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.workers) {
            return Err(ConfigError::InvalidConcurrency {
                value: options.workers,
                max: MAX_CONCURRENCY,
            }
            .into());
        }
        let root = root.map_or_else(|| self.config.root().to_path_buf(), Path::to_path_buf);

        let scan_root = root.clone();
        let scan_extension = extension.to_string();
        let files =
            tokio::task::spawn_blocking(move || find_local_files(&scan_extension, &scan_root))
                .await?;
        let checked = files.len();
        let verdicts = self
            .check_files(files, options.workers, options.write_hash)
            .await?;

        let remediator = Remediator::new(
            Arc::clone(&self.resolver),
            Arc::clone(self.checker.cache()),
            &root,
        );
        let corrupt: Vec<(PathBuf, String)> = verdicts
            .into_iter()
            .filter_map(|(path, verdict)| match verdict {
                IntegrityVerdict::Corrupt { reason } => Some((path, reason)),
                _ => None,
            })
            .collect();

        // Sessions are opened before anything is erased: an authentication
        // failure must leave the cache as it was found.
        let sessions = if options.redownload {
            let hosts = corrupt
                .iter()
                .filter_map(|(path, _)| remediator.replacement_host(path));
            self.open_sessions(hosts, options.credentials.as_ref()).await?
        } else {
            Vec::new()
        };

        let mut bad = Vec::new();
        let mut requeued = Vec::new();
        for (path, reason) in corrupt {
            warn!(path = %path.display(), %reason, "corrupt file");
            let remediation = remediator.remediate(
                CorruptionReport::detected(path, reason),
                options.policy,
                options.redownload,
            );
            bad.push(remediation.report);
            requeued.extend(remediation.task);
        }

        let mut redownloaded = self
            .run_batches(
                requeued,
                sessions,
                &options.concurrency,
                WaitPolicy::Auto,
                options.credentials.as_ref(),
            )
            .await?
            .reports;
        redownloaded.sort_by_key(|r| r.index);

        info!(
            checked,
            bad = bad.len(),
            redownloaded = redownloaded.len(),
            "cache check complete"
        );
        Ok(CacheCheckReport {
            checked,
            bad,
            redownloaded,
        })
    }

    /// Whether the product exists on its host (HEAD probe).
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] for unresolvable requests, authentication
    /// failure or when the probe cannot be sent.
    pub async fn exists_remote(
        &self,
        request: &FileRequest,
        credentials: Option<&Credentials>,
    ) -> Result<bool, ArchiveError> {
        let url = self.resolver.remote_url(
            &request.logical_id,
            request.suffix.as_deref(),
            request.host,
        )?;
        let session = self.open_session(request.host, credentials).await?;
        Ok(self.fetcher().exists(&url, &session).await?)
    }

    /// Fetches the product into memory without caching it.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] for unresolvable requests, authentication
    /// failure, a cutout without region or any transfer failure.
    pub async fn fetch_bytes(
        &self,
        request: &FileRequest,
        cutout: Option<&CutoutRequest>,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, ArchiveError> {
        let url = self.resolver.remote_url(
            &request.logical_id,
            request.suffix.as_deref(),
            request.host,
        )?;
        let session = self.open_session(request.host, credentials).await?;
        Ok(self.fetcher().fetch_bytes(&url, cutout, &session).await?)
    }

    async fn check_files(
        &self,
        files: Vec<PathBuf>,
        workers: usize,
        write_hash: bool,
    ) -> Result<Vec<(PathBuf, IntegrityVerdict)>, ArchiveError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let per_worker = files.len().div_ceil(workers);
        let mut set = JoinSet::new();
        for chunk in files.chunks(per_worker) {
            let chunk = chunk.to_vec();
            let checker = self.checker.clone();
            set.spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|path| {
                        let verdict = checker.check_file(&path, write_hash);
                        (path, verdict)
                    })
                    .collect::<Vec<_>>()
            });
        }

        let mut verdicts = Vec::with_capacity(files.len());
        while let Some(joined) = set.join_next().await {
            verdicts.extend(joined?);
        }
        verdicts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(verdicts)
    }

    /// Opens one session per distinct host.
    async fn open_sessions(
        &self,
        hosts: impl IntoIterator<Item = Host>,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<(Host, Session)>, ArchiveError> {
        let mut sessions: Vec<(Host, Session)> = Vec::new();
        for host in hosts {
            if sessions.iter().any(|(h, _)| *h == host) {
                continue;
            }
            let session = self.open_session(host, credentials).await?;
            sessions.push((host, session));
        }
        Ok(sessions)
    }

    /// Runs `tasks` with one session per host, reusing `sessions` and
    /// opening the rest. All sessions are acquired before any task is
    /// dispatched. Report indices refer to the position in `tasks`.
    async fn run_batches(
        &self,
        tasks: Vec<(Host, DownloadTask)>,
        mut sessions: Vec<(Host, Session)>,
        concurrency: &Concurrency,
        wait: WaitPolicy,
        credentials: Option<&Credentials>,
    ) -> Result<BatchReport, ArchiveError> {
        if tasks.is_empty() {
            return Ok(BatchReport::default());
        }

        let groups = group_by_host(tasks);
        let missing: Vec<Host> = groups
            .iter()
            .map(|(host, _)| *host)
            .filter(|host| !sessions.iter().any(|(h, _)| h == host))
            .collect();
        sessions.extend(self.open_sessions(missing, credentials).await?);

        let mut reports = Vec::new();
        for (host, group) in groups {
            let Some((_, session)) = sessions.iter().find(|(h, _)| *h == host) else {
                continue;
            };
            let fallback = if concurrency.is_external() {
                WaitSpec::per_batch(DEFAULT_EXTERNAL_RATE, group.len())
            } else {
                WaitSpec::None
            };
            let spec = wait.resolve(group.len(), fallback);
            let (positions, group): (Vec<usize>, Vec<DownloadTask>) = group
                .into_iter()
                .map(|(position, task)| (position, task.with_wait(spec)))
                .unzip();

            let mut orchestrator = DownloadOrchestrator::new(self.fetcher());
            if let Some(progress) = &self.progress {
                orchestrator = orchestrator.with_progress(Arc::clone(progress));
            }
            let batch = orchestrator.run(group, session, concurrency).await?;
            reports.extend(batch.reports.into_iter().map(|mut report| {
                report.index = positions[report.index];
                report
            }));
        }
        Ok(BatchReport { reports })
    }
}

fn expand_requests<S: AsRef<str>>(ids: &[S], suffixes: &[String], host: Host) -> Vec<FileRequest> {
    ids.iter()
        .flat_map(|id| {
            let base = FileRequest::new(id.as_ref()).with_host(host);
            if suffixes.is_empty() {
                vec![base]
            } else {
                suffixes
                    .iter()
                    .map(|suffix| base.clone().with_suffix(suffix.clone()))
                    .collect()
            }
        })
        .collect()
}

fn group_by_host(tasks: Vec<(Host, DownloadTask)>) -> Vec<(Host, Vec<(usize, DownloadTask)>)> {
    let mut groups: Vec<(Host, Vec<(usize, DownloadTask)>)> = Vec::new();
    for (position, (host, task)) in tasks.into_iter().enumerate() {
        match groups.iter_mut().find(|(h, _)| *h == host) {
            Some((_, group)) => group.push((position, task)),
            None => groups.push((host, vec![(position, task)])),
        }
    }
    groups
}

fn apply_missing_policy(paths: Vec<PathBuf>, policy: &MissingPolicy) -> Vec<PathBuf> {
    match policy {
        MissingPolicy::Keep => paths,
        MissingPolicy::Remove => paths.into_iter().filter(|p| p.is_file()).collect(),
        MissingPolicy::Replace(placeholder) => paths
            .into_iter()
            .map(|p| if p.is_file() { p } else { placeholder.clone() })
            .collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use url::Url;

    use super::*;

    fn task(name: &str) -> DownloadTask {
        DownloadTask::new(
            Url::parse(&format!("https://archive.example.org/{name}")).unwrap(),
            name,
        )
    }

    #[test]
    fn test_expand_requests_crosses_ids_and_suffixes() {
        let suffixes = vec!["sciimg.fits".to_string(), "mskimg.fits".to_string()];
        let requests = expand_requests(&["a_x.fits", "b_x.fits"], &suffixes, Host::Mirror);
        let pairs: Vec<_> = requests
            .iter()
            .map(|r| (r.logical_id.as_str(), r.suffix.as_deref().unwrap(), r.host))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a_x.fits", "sciimg.fits", Host::Mirror),
                ("a_x.fits", "mskimg.fits", Host::Mirror),
                ("b_x.fits", "sciimg.fits", Host::Mirror),
                ("b_x.fits", "mskimg.fits", Host::Mirror),
            ]
        );
        assert_eq!(expand_requests(&["a"], &[], Host::Primary).len(), 1);
    }

    #[test]
    fn test_group_by_host_keeps_positions() {
        let groups = group_by_host(vec![
            (Host::Primary, task("a")),
            (Host::Mirror, task("b")),
            (Host::Primary, task("c")),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, Host::Primary);
        let positions: Vec<usize> = groups[0].1.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 2]);
        assert_eq!(groups[1].1[0].0, 1);
    }

    #[test]
    fn test_missing_policy() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.fits");
        fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("gone.fits");
        let paths = vec![present.clone(), absent.clone()];

        assert_eq!(
            apply_missing_policy(paths.clone(), &MissingPolicy::Keep),
            paths
        );
        assert_eq!(
            apply_missing_policy(paths.clone(), &MissingPolicy::Remove),
            vec![present.clone()]
        );
        assert_eq!(
            apply_missing_policy(paths, &MissingPolicy::Replace(PathBuf::from("NaN"))),
            vec![present, PathBuf::from("NaN")]
        );
    }

    #[tokio::test]
    async fn test_no_download_only_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path(), dir.path().join("creds")).unwrap();
        let archive = Archive::new(config);
        let options = GetOptions {
            download: false,
            ..GetOptions::default()
        };
        let report = archive
            .get_path(&["sci/a_sciimg.fits"], &options)
            .await
            .unwrap();
        assert_eq!(report.paths, vec![dir.path().join("sci/a_sciimg.fits")]);
        assert_eq!(report.missing.len(), 1);
        assert!(report.batch.is_empty());
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cached_files_need_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a_sciimg.fits");
        fs::write(&path, crate::test_support::minimal_fits(8)).unwrap();
        // No credentials are stored: any login attempt would fail.
        let config = CacheConfig::new(dir.path(), dir.path().join("creds")).unwrap();
        let report = Archive::new(config)
            .get_path(&["a_sciimg.fits"], &GetOptions::default())
            .await
            .unwrap();
        assert!(report.is_complete());
        assert!(report.batch.is_empty());
    }

    #[test]
    fn test_check_report_serializes_outcomes() {
        let report = CacheCheckReport {
            checked: 1,
            bad: vec![CorruptionReport::detected("sci/a_sciimg.fits", "truncated")],
            redownloaded: vec![FetchReport {
                index: 0,
                url: Url::parse("https://archive.example.org/sci/a_sciimg.fits").unwrap(),
                local_path: PathBuf::from("sci/a_sciimg.fits"),
                outcome: crate::download::FetchOutcome::HttpError { status: 404 },
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["checked"], 1);
        assert_eq!(json["bad"][0]["reason"], "truncated");
        let outcome = &json["redownloaded"][0]["outcome"];
        assert_eq!(outcome["kind"], "http_error");
        assert_eq!(outcome["status"], 404);
    }

    #[tokio::test]
    async fn test_check_cache_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path(), dir.path().join("creds")).unwrap();
        let options = CheckOptions {
            workers: 0,
            ..CheckOptions::default()
        };
        assert!(matches!(
            Archive::new(config).check_cache("fits", None, &options).await,
            Err(ArchiveError::Config(ConfigError::InvalidConcurrency { .. }))
        ));
    }

    #[tokio::test]
    async fn test_check_cache_reports_and_erases_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("sci/a_sciimg.fits");
        let bad = dir.path().join("sci/b_sciimg.fits");
        fs::create_dir_all(good.parent().unwrap()).unwrap();
        fs::write(&good, crate::test_support::minimal_fits(8)).unwrap();
        fs::write(&bad, b"SIMPLE  =                    T").unwrap();

        let config = CacheConfig::new(dir.path(), dir.path().join("creds")).unwrap();
        let options = CheckOptions {
            workers: 2,
            ..CheckOptions::default()
        };
        let report = Archive::new(config)
            .check_cache("fits", None, &options)
            .await
            .unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.bad.len(), 1);
        assert_eq!(report.bad[0].local_path, bad);
        assert!(!bad.exists());
        assert!(good.exists());
        assert!(report.redownloaded.is_empty());
        assert!(crate::integrity::sidecar_path(&good).exists());
    }

    #[tokio::test]
    async fn test_check_cache_redownload_without_credentials_erases_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("sci/b_sciimg.fits");
        fs::create_dir_all(bad.parent().unwrap()).unwrap();
        fs::write(&bad, b"SIMPLE  =                    T").unwrap();

        // Empty credential store and no prompt.
        let config = CacheConfig::new(dir.path(), dir.path().join("creds")).unwrap();
        let options = CheckOptions {
            redownload: true,
            ..CheckOptions::default()
        };
        let err = Archive::new(config)
            .check_cache("fits", None, &options)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::Session(SessionError::Auth(
                crate::auth::AuthError::MissingCredentials { .. }
            ))
        ));
        assert!(bad.exists());
    }
}
