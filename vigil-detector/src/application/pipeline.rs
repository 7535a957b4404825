//! Detection pipeline over a batch of scan results
//!
//! Each host goes through the stages below, in order. A failing stage
//! aborts that host only, unless the error is batch fatal.
//!
//! | Stage | Work |
//! |-------|------|
//! | [`Stage::Inventory`] | CPE names and Dependency-Check report of the target |
//! | [`Stage::Libraries`] | language library findings |
//! | [`Stage::OsPackages`] | OVAL then security tracker |
//! | [`Stage::Cpe`] | CVE dictionary lookup by CPE name |
//! | [`Stage::ThirdParty`] | GitHub security alerts, WPScan |
//! | [`Stage::Enrichment`] | contents, alerts, exploits, modules, CWE dictionary |
//!
//! Detected hosts are then stamped with report metadata. [`Detector::run`]
//! persists every result, minus the server's ignored JSON keys, before
//! diffing and filtering the in-memory copies.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use vigil_core::domain::{Family, NOT_FIXED_YET, ScanResult};
use vigil_core::infrastructure::RetryConfig;
use vigil_core::{Config, DetectionError};
use vigil_oval::{DetectOvalUseCase, OvalDriver};

use crate::domain::{
    CveDriver, CweDriver, ExploitDriver, GostDriver, LibraryDetector, MetasploitDriver,
};
use crate::infrastructure::{
    GitHubAlertsClient, ResultsStore, SnapshotDatabase, WpScanClient, read_cpe_names,
};
use crate::services::{
    apply_diff, detect_cpe_cves, detect_github_cves, detect_unfixed, detect_wordpress_cves,
    fill_cve_details, fill_cwe_dict, fill_exploits, fill_metasploits, fill_tracker_contents,
    filter_by_cvss_over, filter_ignore_cves, filter_ignore_pkgs, filter_inactive_wordpress,
    filter_unfixed, filter_unscored,
};

/// Pipeline stage of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Inventory,
    Libraries,
    OsPackages,
    Cpe,
    ThirdParty,
    Enrichment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Inventory => "inventory",
            Stage::Libraries => "library detection",
            Stage::OsPackages => "OS package detection",
            Stage::Cpe => "CPE detection",
            Stage::ThirdParty => "third-party detection",
            Stage::Enrichment => "enrichment",
        };
        f.write_str(name)
    }
}

/// A host failure together with the stage it happened in
#[derive(Debug)]
pub struct HostFailure {
    pub stage: Stage,
    pub error: DetectionError,
}

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// What happened to one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome {
    Detected,
    /// Results already carried content and no refresh was requested
    Skipped,
    Failed,
}

/// Databases and collaborators consulted by the pipeline. A missing source
/// skips the steps that need it, except where detection requires it.
#[derive(Clone, Default)]
pub struct DetectionSources {
    pub oval: Option<Arc<dyn OvalDriver>>,
    pub gost: Option<Arc<dyn GostDriver>>,
    pub cve: Option<Arc<dyn CveDriver>>,
    pub exploit: Option<Arc<dyn ExploitDriver>>,
    pub metasploit: Option<Arc<dyn MetasploitDriver>>,
    pub cwe: Option<Arc<dyn CweDriver>>,
    pub library: Option<Arc<dyn LibraryDetector>>,
}

impl DetectionSources {
    /// Every database served by one snapshot
    pub fn from_snapshot(db: Arc<SnapshotDatabase>) -> Self {
        Self {
            oval: Some(db.clone()),
            gost: Some(db.clone()),
            cve: Some(db.clone()),
            exploit: Some(db.clone()),
            metasploit: Some(db.clone()),
            cwe: Some(db),
            library: None,
        }
    }

    pub fn with_library_detector(mut self, detector: Arc<dyn LibraryDetector>) -> Self {
        self.library = Some(detector);
        self
    }
}

/// Outcome of a report run
#[derive(Debug)]
pub struct ReportRun {
    /// Result directory that was reported
    pub results_dir: PathBuf,
    pub results: Vec<ScanResult>,
    pub outcomes: Vec<HostOutcome>,
}

/// Runs detection, persistence, diff and filters over scan results
pub struct Detector {
    config: Arc<Config>,
    oval: DetectOvalUseCase,
    sources: DetectionSources,
    github: GitHubAlertsClient,
    wpscan: Option<WpScanClient>,
    reported_by: String,
}

impl Detector {
    pub fn new(
        config: Arc<Config>,
        sources: DetectionSources,
        reported_by: impl Into<String>,
    ) -> Result<Self, DetectionError> {
        let oval = DetectOvalUseCase::from_config(&config.oval, sources.oval.clone())?;
        let github = GitHubAlertsClient::new(&config.github)?;
        let wpscan = match config.wpscan.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Some(WpScanClient::new(
                &config.wpscan,
                token,
                RetryConfig::default(),
            )?),
            None => None,
        };

        Ok(Self {
            config,
            oval,
            sources,
            github,
            wpscan,
            reported_by: reported_by.into(),
        })
    }

    /// Report the newest result directory of `store`
    pub async fn run(&self, store: &ResultsStore) -> Result<ReportRun, DetectionError> {
        let results_dir = store.latest_dir().await?;
        info!(dir = %results_dir.display(), "Reporting scan results");

        let mut results = store.load_dir(&results_dir).await?;
        let outcomes = self.detect_all(&mut results).await?;

        for result in &results {
            let ignored_keys = self.config.ignored_json_keys(&result.server_name);
            store
                .write_clearing(&results_dir, result, ignored_keys)
                .await?;
        }

        let report = &self.config.report;
        if report.diff_enabled() {
            match store.previous_dir(&results_dir).await? {
                Some(previous_dir) => {
                    let previous = store.load_dir(&previous_dir).await?;
                    apply_diff(&mut results, &previous, report.diff_plus, report.diff_minus);
                }
                None => info!("No previous results, reporting without diff"),
            }
        }

        for result in &mut results {
            self.apply_filters(result)?;
        }

        Ok(ReportRun {
            results_dir,
            results,
            outcomes,
        })
    }

    /// Detect every result in order. Host failures are recorded in the
    /// result's `errors`; a batch fatal error stops the batch.
    pub async fn detect_all(
        &self,
        results: &mut [ScanResult],
    ) -> Result<Vec<HostOutcome>, DetectionError> {
        let reported_at = Utc::now();
        let mut outcomes = Vec::with_capacity(results.len());

        for result in results.iter_mut() {
            match self.detect(result, reported_at).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) if failure.error.is_batch_fatal() => {
                    error!(
                        server = %result.server_info(),
                        stage = %failure.stage,
                        error = %failure.error,
                        "Detection aborted for the whole batch"
                    );
                    return Err(failure.error);
                }
                Err(failure) => {
                    error!(
                        server = %result.server_info(),
                        stage = %failure.stage,
                        error = %failure.error,
                        "Detection failed"
                    );
                    result.errors.push(failure.to_string());
                    outcomes.push(HostOutcome::Failed);
                }
            }
        }
        Ok(outcomes)
    }

    /// Run every detection stage for one host
    #[instrument(skip(self, result), fields(server = %result.server_info()))]
    pub async fn detect(
        &self,
        result: &mut ScanResult,
        reported_at: DateTime<Utc>,
    ) -> Result<HostOutcome, HostFailure> {
        if !self.config.report.refresh_cve && !result.needs_cve_refresh() {
            info!("Results already carry vulnerability content, no need to refresh");
            return Ok(HostOutcome::Skipped);
        }
        if !result.reuses_scanned_cves() {
            result.scanned_cves = Default::default();
        }

        let cpe_names = self.resolve_cpe_names(result).await.map_err(at(Stage::Inventory))?;

        if let Some(library) = &self.sources.library {
            let detected = library.detect(result).await.map_err(at(Stage::Libraries))?;
            info!(cves = detected, "CVEs detected in libraries");
        }

        self.detect_os_packages(result)
            .await
            .map_err(at(Stage::OsPackages))?;

        detect_cpe_cves(self.sources.cve.as_deref(), result, &cpe_names)
            .await
            .map_err(at(Stage::Cpe))?;

        self.detect_third_party(result)
            .await
            .map_err(at(Stage::ThirdParty))?;

        self.enrich(result).await.map_err(at(Stage::Enrichment))?;

        result.reported_at = Some(reported_at);
        result.reported_version = concat!("v", env!("CARGO_PKG_VERSION")).to_string();
        result.reported_by = self.reported_by.clone();
        result.lang = self.config.report.lang.clone();

        info!(cves = result.scanned_cves.len(), "Detection finished");
        Ok(HostOutcome::Detected)
    }

    fn target_container<'a>(result: &'a ScanResult) -> Option<&'a str> {
        result
            .is_container()
            .then_some(result.container.name.as_str())
    }

    async fn resolve_cpe_names(&self, result: &ScanResult) -> Result<Vec<String>, DetectionError> {
        let target = self
            .config
            .target(&result.server_name, Self::target_container(result));
        let mut cpe_names = target.cpe_names;

        if let Some(path) = &target.owasp_dc_xml_path {
            for name in read_cpe_names(path).await? {
                if !cpe_names.contains(&name) {
                    cpe_names.push(name);
                }
            }
            debug!(path = %path.display(), cpes = cpe_names.len(), "Read Dependency-Check report");
        }
        Ok(cpe_names)
    }

    async fn detect_os_packages(&self, result: &mut ScanResult) -> Result<(), DetectionError> {
        if !result.release.is_empty() {
            self.oval.execute(result).await?;
            match &self.sources.gost {
                Some(gost) => {
                    detect_unfixed(gost.as_ref(), result).await?;
                }
                None => debug!("No security tracker database, skipping unfixed CVE detection"),
            }
        } else if result.reuses_scanned_cves() {
            info!("Release is empty, using the CVEs of the scan result as they are");
        } else if result.family()? == Family::Pseudo {
            info!("Pseudo server, skipping OVAL and security tracker detection");
        } else {
            return Err(DetectionError::configuration(format!(
                "{}: release is empty, cannot detect OS package CVEs",
                result.server_info()
            )));
        }

        for vinfo in result.scanned_cves.values_mut() {
            for package in &mut vinfo.affected_packages {
                if package.not_fixed_yet && package.fix_state.is_empty() {
                    package.fix_state = NOT_FIXED_YET.to_string();
                }
            }
        }
        Ok(())
    }

    async fn detect_third_party(&self, result: &mut ScanResult) -> Result<(), DetectionError> {
        if let Some(server) = self.config.servers.get(&result.server_name)
            && !server.github_repos.is_empty()
        {
            detect_github_cves(
                &self.github,
                result,
                &server.github_repos,
                self.config.github.ignore_dismissed,
            )
            .await?;
        }

        if !result.word_press_packages.is_empty() {
            match &self.wpscan {
                Some(client) => {
                    detect_wordpress_cves(client, result).await?;
                }
                None => debug!("No WPScan token configured, skipping WordPress detection"),
            }
        }
        Ok(())
    }

    async fn enrich(&self, result: &mut ScanResult) -> Result<(), DetectionError> {
        if let Some(gost) = &self.sources.gost {
            fill_tracker_contents(gost.as_ref(), result).await?;
        }
        if let Some(cve) = &self.sources.cve {
            fill_cve_details(cve.as_ref(), result).await?;
        }
        if let Some(exploit) = &self.sources.exploit {
            fill_exploits(exploit.as_ref(), result).await?;
        }
        if let Some(metasploit) = &self.sources.metasploit {
            fill_metasploits(metasploit.as_ref(), result).await?;
        }
        fill_cwe_dict(self.sources.cwe.as_deref(), result, &self.config.report.lang).await
    }

    /// Apply the configured report filters to one result
    pub fn apply_filters(&self, result: &mut ScanResult) -> Result<(), DetectionError> {
        let filters = &self.config.filters;
        let target = self
            .config
            .target(&result.server_name, Self::target_container(result));

        let vulns = &mut result.scanned_cves;
        filter_by_cvss_over(vulns, filters.cvss_score_over);
        filter_unfixed(vulns, filters.ignore_unfixed);
        filter_ignore_cves(vulns, &target.ignore_cves);
        filter_ignore_pkgs(vulns, &target.ignore_pkgs_regexp)?;
        filter_unscored(vulns, filters.ignore_unscored_cves);
        filter_inactive_wordpress(result, self.config.wpscan.detect_inactive);
        Ok(())
    }
}

fn at(stage: Stage) -> impl FnOnce(DetectionError) -> HostFailure {
    move |error| HostFailure { stage, error }
}
