//! OVAL detection use cases
//!
//! Two interchangeable strategies resolve the per-package queries of a host:
//!
//! - **Offline**: sequential lookups against a local [`OvalDriver`].
//! - **HTTP**: a fixed pool of workers pulls queries from a shared channel and
//!   sends results back over a channel. Only the coordinator evaluates and
//!   aggregates, racing every receive against one deadline for the batch.
//!
//! ```text
//! queue ──> worker 1..N ──(query, result)──> coordinator ──> OvalResult
//!                                                 ^
//!                                         deadline timer
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vigil_core::config::{OvalConfig, OvalMode};
use vigil_core::domain::{Family, Kernel, ScanResult};
use vigil_core::{DetectionError, FetchError, QueryFailure};

use crate::domain::{AdvisoryDefinition, FixStatus, OvalResult, PackageQuery, VersionGrammar};
use crate::infrastructure::{OvalDriver, OvalHttpClient};
use crate::services::{evaluate, fill_with_oval};

/// Family whose OVAL feed covers hosts of `family`
///
/// `Ok(None)` for families that intentionally have no OVAL feed.
pub fn oval_family(family: Family) -> Result<Option<Family>, DetectionError> {
    match family {
        Family::Debian | Family::Raspbian => Ok(Some(Family::Debian)),
        Family::RedHat | Family::CentOS => Ok(Some(Family::RedHat)),
        Family::Ubuntu
        | Family::Oracle
        | Family::Amazon
        | Family::SuseEnterpriseServer
        | Family::Alpine => Ok(Some(family)),
        Family::FreeBsd | Family::Windows | Family::Pseudo => Ok(None),
    }
}

/// Host facts every query of one batch is evaluated against
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Host family, selects the version grammar
    pub family: Family,
    /// Feed family, selects the definitions
    pub oval_family: Family,
    pub release: String,
    pub running_kernel: Kernel,
    pub enabled_modules: Vec<String>,
}

impl FetchContext {
    pub fn new(family: Family, oval_family: Family, result: &ScanResult) -> Self {
        Self {
            family,
            oval_family,
            release: result.release.clone(),
            running_kernel: result.running_kernel.clone(),
            enabled_modules: result.enabled_dnf_modules.clone(),
        }
    }

    /// Evaluate definitions returned for `query` and aggregate the affected ones
    fn record(&self, oval: &mut OvalResult, query: &PackageQuery, definitions: &[AdvisoryDefinition]) {
        for definition in definitions {
            let outcome = evaluate(
                definition,
                query,
                self.family,
                &self.running_kernel,
                &self.enabled_modules,
            );
            if !outcome.affected {
                continue;
            }

            if query.is_src_pack {
                for binary in &query.binary_names {
                    let status = FixStatus {
                        not_fixed_yet: outcome.not_fixed_yet,
                        fixed_in: outcome.fixed_in.clone(),
                        is_src_pack: true,
                        src_pack_name: query.package_name.clone(),
                    };
                    oval.upsert(definition, binary, status);
                }
            } else {
                let status = FixStatus {
                    not_fixed_yet: outcome.not_fixed_yet,
                    fixed_in: outcome.fixed_in.clone(),
                    ..Default::default()
                };
                oval.upsert(definition, &query.package_name, status);
            }
        }
    }
}

/// Failed HTTP batch with whatever was aggregated before the failure
#[derive(Debug)]
pub struct BatchFailure {
    pub partial: OvalResult,
    pub error: DetectionError,
}

/// Resolve every query sequentially against a local database
pub async fn fetch_offline(
    driver: &dyn OvalDriver,
    ctx: &FetchContext,
    queries: &[PackageQuery],
) -> Result<OvalResult, DetectionError> {
    let mut oval = OvalResult::new();
    for query in queries {
        let definitions = driver
            .get_by_pack_name(ctx.oval_family, &ctx.release, &query.package_name, &query.arch)
            .await
            .map_err(|e| {
                DetectionError::lookup(
                    "OVAL",
                    format!(
                        "{} {} package {}",
                        ctx.oval_family, ctx.release, query.package_name
                    ),
                    e,
                )
            })?;
        ctx.record(&mut oval, query, &definitions);
    }
    Ok(oval)
}

/// Resolve every query through the OVAL dictionary with a bounded worker pool
///
/// Per-query failures are collected until all work is drained and reported
/// together as [`DetectionError::FetchFailed`]. The deadline fails the batch
/// with [`DetectionError::Timeout`] and abandons workers still running.
pub async fn fetch_via_http(
    client: Arc<OvalHttpClient>,
    ctx: &FetchContext,
    queries: Vec<PackageQuery>,
    concurrency: usize,
    timeout: Duration,
) -> Result<OvalResult, BatchFailure> {
    let family = ctx.oval_family;
    let release = ctx.release.clone();
    let fetch = move |query: PackageQuery| {
        let client = client.clone();
        let release = release.clone();
        async move {
            client
                .get_by_pack_name(family, &release, &query.package_name)
                .await
        }
    };
    run_worker_pool(fetch, ctx, queries, concurrency, timeout).await
}

type QueryOutcome = (PackageQuery, Result<Vec<AdvisoryDefinition>, FetchError>);

/// Workers pull queries from a shared channel and send outcomes to the
/// coordinator, which is the only one touching the aggregation state
async fn run_worker_pool<F, Fut>(
    fetch: F,
    ctx: &FetchContext,
    queries: Vec<PackageQuery>,
    concurrency: usize,
    timeout: Duration,
) -> Result<OvalResult, BatchFailure>
where
    F: Fn(PackageQuery) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Vec<AdvisoryDefinition>, FetchError>> + Send + 'static,
{
    let total = queries.len();
    let mut pending: HashMap<String, usize> = HashMap::new();
    let (work_tx, work_rx) = mpsc::channel::<PackageQuery>(total.max(1));
    for query in queries {
        *pending.entry(query.package_name.clone()).or_default() += 1;
        if work_tx.try_send(query).is_err() {
            break;
        }
    }
    drop(work_tx);
    let work_rx = Arc::new(Mutex::new(work_rx));

    let (tx, mut rx) = mpsc::unbounded_channel::<QueryOutcome>();
    let mut workers = JoinSet::new();
    for _ in 0..concurrency.max(1).min(total) {
        let work_rx = work_rx.clone();
        let tx = tx.clone();
        let fetch = fetch.clone();
        workers.spawn(async move {
            loop {
                let next = work_rx.lock().await.recv().await;
                let Some(query) = next else {
                    break;
                };
                let outcome = fetch(query.clone()).await;
                if tx.send((query, outcome)).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut oval = OvalResult::new();
    let mut failures = Vec::new();
    let mut received = 0;
    while received < total {
        tokio::select! {
            message = rx.recv() => {
                let Some((query, outcome)) = message else {
                    break;
                };
                received += 1;
                if let Some(count) = pending.get_mut(&query.package_name) {
                    *count -= 1;
                }
                match outcome {
                    Ok(definitions) => ctx.record(&mut oval, &query, &definitions),
                    Err(error) => {
                        warn!(package = %query.package_name, %error, "OVAL query failed");
                        failures.push(QueryFailure {
                            package: query.package_name,
                            error,
                        });
                    }
                }
            }
            _ = &mut deadline => {
                workers.detach_all();
                return Err(BatchFailure {
                    partial: oval,
                    error: DetectionError::Timeout {
                        operation: format!(
                            "fetching OVAL for {} {}",
                            ctx.oval_family, ctx.release
                        ),
                        seconds: timeout.as_secs(),
                    },
                });
            }
        }
    }

    if received < total {
        // Every sender is gone, so the workers have all finished
        let mut reason = "worker stopped early".to_string();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                reason = format!("worker failed: {}", e);
            }
        }
        let mut lost: Vec<(String, usize)> =
            pending.into_iter().filter(|(_, count)| *count > 0).collect();
        lost.sort();
        for (package, count) in lost {
            warn!(package = %package, reason = %reason, "OVAL query got no result");
            for _ in 0..count {
                failures.push(QueryFailure {
                    package: package.clone(),
                    error: FetchError::Incomplete {
                        reason: reason.clone(),
                    },
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(BatchFailure {
            partial: oval,
            error: DetectionError::FetchFailed {
                family: ctx.oval_family.to_string(),
                release: ctx.release.clone(),
                failures,
            },
        });
    }
    Ok(oval)
}

enum OvalSource {
    Offline(Option<Arc<dyn OvalDriver>>),
    Http(Arc<OvalHttpClient>),
}

/// Use case for detecting OS package vulnerabilities with OVAL definitions
pub struct DetectOvalUseCase {
    source: OvalSource,
    concurrency: usize,
    timeout: Duration,
    stale_after: chrono::Duration,
}

impl DetectOvalUseCase {
    /// Build the strategy selected by `config.mode`. `driver` backs offline mode.
    pub fn from_config(
        config: &OvalConfig,
        driver: Option<Arc<dyn OvalDriver>>,
    ) -> Result<Self, DetectionError> {
        let source = match config.mode {
            OvalMode::Offline => OvalSource::Offline(driver),
            OvalMode::Http => OvalSource::Http(Arc::new(OvalHttpClient::new(
                config.url.clone(),
                config.request_timeout(),
                config.retry.to_retry_config(),
            )?)),
        };
        Ok(Self {
            source,
            concurrency: config.concurrency,
            timeout: config.timeout(),
            stale_after: chrono::Duration::days(config.stale_after_days),
        })
    }

    /// Match the packages of `result` and merge affected CVEs into it.
    /// Returns the number of newly detected CVEs.
    pub async fn execute(&self, result: &mut ScanResult) -> Result<usize, DetectionError> {
        let family = result.family()?;
        let Some(oval_family) = oval_family(family)? else {
            debug!(family = %family, "No OVAL feed for family, skipping");
            return Ok(0);
        };
        VersionGrammar::for_family(family)?;

        let ctx = FetchContext::new(family, oval_family, result);
        let queries = PackageQuery::from_scan_result(result);

        let oval = match &self.source {
            OvalSource::Offline(driver) => {
                let driver = driver.as_deref().ok_or_else(|| {
                    DetectionError::missing_database(format!(
                        "OVAL database for {} is not available. Fetch OVAL data before reporting",
                        family
                    ))
                })?;
                self.check_database(driver, &ctx).await?;
                fetch_offline(driver, &ctx, &queries).await?
            }
            OvalSource::Http(client) => {
                match fetch_via_http(
                    client.clone(),
                    &ctx,
                    queries,
                    self.concurrency,
                    self.timeout,
                )
                .await
                {
                    Ok(oval) => oval,
                    Err(BatchFailure { partial, error }) => {
                        if matches!(error, DetectionError::FetchFailed { .. }) {
                            fill_with_oval(result, family, &partial);
                        }
                        return Err(error);
                    }
                }
            }
        };

        let detected = fill_with_oval(result, family, &oval);
        info!(
            server = %result.server_info(),
            cves = detected,
            definitions = oval.len(),
            "CVEs detected with OVAL"
        );
        Ok(detected)
    }

    async fn check_database(
        &self,
        driver: &dyn OvalDriver,
        ctx: &FetchContext,
    ) -> Result<(), DetectionError> {
        if !driver.has_data(ctx.oval_family, &ctx.release).await? {
            return Err(DetectionError::missing_database(format!(
                "OVAL entries of {} {} are not found. Fetch OVAL before reporting",
                ctx.oval_family, ctx.release
            )));
        }

        if let Some(modified) = driver.last_modified(ctx.oval_family, &ctx.release).await?
            && Utc::now() - modified > self.stale_after
        {
            warn!(
                family = %ctx.oval_family,
                release = %ctx.release,
                last_modified = %modified,
                "OVAL definitions are outdated. Fetch OVAL again to get the latest data"
            );
        }
        Ok(())
    }
}
