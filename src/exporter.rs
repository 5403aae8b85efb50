use crate::check::{Check, CheckKey, CheckRegistry, Credential};
use crate::expiry;
use crate::metrics::ExporterStats;
use crate::query;
use crate::transport::{Exchange, ExchangeError};
use crate::trust::{self, Verdict};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Runtime parameters supplied by the shell, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Ordered; index 0 is the primary resolver.
    pub resolvers: Vec<String>,
    /// Deadline applied to every exchange in a cycle.
    pub timeout: Duration,
}

/// Why a pair did not produce a trusted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Transport,
    Untrusted(Verdict),
    Internal,
}

/// Output of one evaluation unit. Owned by that unit; never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub resolves: bool,
    /// Earliest RRSIG expiration, seconds since the Unix epoch.
    pub earliest_expiry: Option<u32>,
    pub effective_owner: String,
    pub effective_type: String,
    pub failure: Option<Failure>,
}

impl EvaluationResult {
    fn for_check(check: &Check) -> Self {
        EvaluationResult {
            resolves: false,
            earliest_expiry: None,
            effective_owner: check.record().to_string(),
            effective_type: check.type_label(),
            failure: None,
        }
    }

    pub fn failed(check: &Check, failure: Failure) -> Self {
        EvaluationResult {
            failure: Some(failure),
            ..EvaluationResult::for_check(check)
        }
    }
}

/// Renders a signature owner relative to the check's zone, `@` for the apex.
fn relative_owner(owner: &str, zone: &str) -> String {
    let owner = owner.trim_end_matches('.').to_ascii_lowercase();
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();

    if owner == zone {
        return "@".to_string();
    }

    match owner.strip_suffix(&format!(".{}", zone)) {
        Some(label) => label.to_string(),
        None => format!("{}.", owner),
    }
}

/// Evaluates one (check, resolver) pair: build, exchange, decide, select.
pub async fn evaluate<E: Exchange>(
    exchange: &E,
    check: &Check,
    credential: Option<Arc<Credential>>,
    resolver: &str,
    timeout: Duration,
) -> EvaluationResult {
    let prepared = match query::build(check, credential) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("Failed to build query for {}: {:#}", check, e);
            return EvaluationResult::failed(check, Failure::Internal);
        }
    };

    let response = match tokio::time::timeout(timeout, exchange.exchange(&prepared, resolver)).await {
        Ok(Ok(response)) => response,
        Ok(Err(ExchangeError::Timeout(_))) | Err(_) => {
            tracing::warn!(
                zone = check.zone(),
                record = check.record(),
                rtype = %check.kind(),
                resolver,
                "Error resolving {} on {}: timed out after {:?}",
                check.fqdn(),
                resolver,
                timeout
            );
            return EvaluationResult::failed(check, Failure::Timeout);
        }
        Ok(Err(e)) => {
            tracing::warn!(
                zone = check.zone(),
                record = check.record(),
                rtype = %check.kind(),
                resolver,
                "Error resolving {} on {}: {}",
                check,
                resolver,
                e
            );
            return EvaluationResult::failed(check, Failure::Transport);
        }
    };

    let verdict = trust::decide(check.kind(), &response);

    if check.kind().is_transfer() && !verdict.is_trusted() {
        tracing::warn!(
            zone = check.zone(),
            resolver,
            reason = verdict.reason(),
            "Zone transfer for {} failed on {}: {}",
            check.fqdn(),
            resolver,
            verdict
        );
        return EvaluationResult::failed(check, Failure::Untrusted(verdict));
    }

    if !verdict.is_trusted() {
        tracing::warn!(
            zone = check.zone(),
            record = check.record(),
            rtype = %check.kind(),
            resolver,
            reason = verdict.reason(),
            "{} does not resolve on {}: {}",
            check,
            resolver,
            verdict
        );
    }

    let mut result = EvaluationResult::for_check(check);
    result.resolves = trust::resolves(check.kind(), &response);
    if !result.resolves {
        result.failure = Some(Failure::Untrusted(verdict));
    }

    if let Some(signature) = expiry::select_earliest(&response.answers) {
        result.earliest_expiry = Some(signature.expiration);

        // A transfer covers many RRsets; report which one expires first.
        if check.kind().is_transfer() {
            result.effective_owner = relative_owner(&signature.owner.to_ascii(), check.zone());
            result.effective_type = signature.covered.to_string();
        }
    } else {
        tracing::debug!("No RRSIG found for {} on {}", check, resolver);
    }

    result
}

#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub check_index: usize,
    pub resolver_index: usize,
    pub result: EvaluationResult,
}

/// One gauge value with its labels.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    DaysLeft {
        zone: String,
        record: String,
        rtype: String,
        value: f64,
    },
    Resolves {
        resolver: String,
        zone: String,
        record: String,
        rtype: String,
        value: f64,
    },
    EarliestExpiry {
        resolver: String,
        zone: String,
        record: String,
        rtype: String,
        value: f64,
    },
}

/// All results of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    registry: Arc<CheckRegistry>,
    resolvers: Arc<Vec<String>>,
    pub outcomes: Vec<PairOutcome>,
    pub elapsed: Duration,
}

/// Days until `expiry`, truncated to whole hours first. An unset expiry is
/// measured from the epoch so it lands far outside any sane range.
pub fn days_left(expiry: Option<u32>, now: SystemTime) -> f64 {
    let now_secs = match now.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    let expiry_secs = i64::from(expiry.unwrap_or(0));
    let hours = (expiry_secs - now_secs) / 3600;
    hours as f64 / 24.0
}

impl CycleReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn result(&self, check_index: usize, resolver_index: usize) -> Option<&EvaluationResult> {
        self.outcomes
            .iter()
            .find(|o| o.check_index == check_index && o.resolver_index == resolver_index)
            .map(|o| &o.result)
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples_at(SystemTime::now())
    }

    /// Reduces pair results into gauge samples.
    ///
    /// * `resolves` for every pair except zone transfer checks.
    /// * `earliest_rrsig_expiry` only for pairs that resolve.
    /// * `days_left` from the primary resolver only, always present. A pair
    ///   that did not resolve counts as having no signature.
    ///
    /// Transfer checks are labelled with the RRset whose signature expires
    /// first; other checks keep their configured identity.
    pub fn samples_at(&self, now: SystemTime) -> Vec<Sample> {
        let mut samples = Vec::new();

        for outcome in &self.outcomes {
            let Some(check) = self.registry.checks().get(outcome.check_index) else {
                continue;
            };
            let Some(resolver) = self.resolvers.get(outcome.resolver_index) else {
                continue;
            };
            let result = &outcome.result;

            let (record, rtype) = self.labels_for(check, result);

            if !check.kind().is_transfer() {
                samples.push(Sample::Resolves {
                    resolver: resolver.clone(),
                    zone: check.zone().to_string(),
                    record: record.clone(),
                    rtype: rtype.clone(),
                    value: if result.resolves { 1.0 } else { 0.0 },
                });
            }

            if result.resolves
                && let Some(expiry) = result.earliest_expiry
            {
                samples.push(Sample::EarliestExpiry {
                    resolver: resolver.clone(),
                    zone: check.zone().to_string(),
                    record: record.clone(),
                    rtype: rtype.clone(),
                    value: f64::from(expiry),
                });
            }

            if outcome.resolver_index == 0 {
                samples.push(Sample::DaysLeft {
                    zone: check.zone().to_string(),
                    record,
                    rtype,
                    value: days_left(
                        result.resolves.then_some(result.earliest_expiry).flatten(),
                        now,
                    ),
                });
            }
        }

        samples
    }

    /// Series labels for a pair. A transfer check takes the identity of its
    /// earliest-expiring RRset unless another configured check already owns
    /// that identity; the gauges would otherwise overwrite that check's series.
    fn labels_for(&self, check: &Check, result: &EvaluationResult) -> (String, String) {
        let configured = (check.record().to_string(), check.type_label());
        if !check.kind().is_transfer() {
            return configured;
        }

        let effective = CheckKey {
            zone: check.zone().to_ascii_lowercase(),
            record: result.effective_owner.to_ascii_lowercase(),
            rtype: result.effective_type.clone(),
        };
        if effective != check.key() && self.registry.contains_key(&effective) {
            return configured;
        }

        (result.effective_owner.clone(), result.effective_type.clone())
    }
}

/// Fans checks out across resolvers and joins the results into one report.
pub struct Exporter<E: Exchange> {
    registry: Arc<CheckRegistry>,
    resolvers: Arc<Vec<String>>,
    timeout: Duration,
    exchange: Arc<E>,
    stats: Arc<ExporterStats>,
}

impl<E: Exchange> Exporter<E> {
    pub fn new(settings: Settings, registry: Arc<CheckRegistry>, exchange: E) -> Result<Self> {
        if settings.resolvers.is_empty() {
            anyhow::bail!("At least one resolver must be configured");
        }
        if settings.timeout.is_zero() {
            anyhow::bail!("Timeout must be greater than zero");
        }

        Ok(Exporter {
            registry,
            resolvers: Arc::new(settings.resolvers),
            timeout: settings.timeout,
            exchange: Arc::new(exchange),
            stats: Arc::new(ExporterStats::new()),
        })
    }

    pub fn stats(&self) -> Arc<ExporterStats> {
        self.stats.clone()
    }

    pub fn check_count(&self) -> usize {
        self.registry.len()
    }

    pub fn resolvers(&self) -> &[String] {
        &self.resolvers
    }

    /// Runs one cycle: one task per (check, resolver) pair, then waits for all.
    pub async fn collect(&self) -> CycleReport {
        let started = Instant::now();
        let mut handles = Vec::with_capacity(self.registry.len() * self.resolvers.len());

        for (check_index, check) in self.registry.checks().iter().enumerate() {
            let credential = self.registry.credential_for(check);

            for (resolver_index, resolver) in self.resolvers.iter().enumerate() {
                let exchange = self.exchange.clone();
                let check = check.clone();
                let credential = credential.clone();
                let resolver = resolver.clone();
                let timeout = self.timeout;

                let handle = tokio::spawn(async move {
                    evaluate(&*exchange, &check, credential, &resolver, timeout).await
                });
                handles.push((check_index, resolver_index, handle));
            }
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (check_index, resolver_index, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let check = &self.registry.checks()[check_index];
                    tracing::error!(
                        "Evaluation of {} on {} aborted: {}",
                        check,
                        self.resolvers[resolver_index],
                        e
                    );
                    EvaluationResult::failed(check, Failure::Internal)
                }
            };

            outcomes.push(PairOutcome {
                check_index,
                resolver_index,
                result,
            });
        }

        let report = CycleReport {
            registry: self.registry.clone(),
            resolvers: self.resolvers.clone(),
            outcomes,
            elapsed: started.elapsed(),
        };

        self.stats.record_cycle(&report);
        tracing::debug!(
            "Cycle complete: {} pairs in {:?}",
            report.len(),
            report.elapsed
        );

        report
    }
}
