use crate::exporter::{CycleReport, Failure, Sample};
use crate::trust::Verdict;
use anyhow::{Context, Result};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const DAYS_LEFT: &str = "dnssec_zone_record_days_left";
pub const RESOLVES: &str = "dnssec_zone_record_resolves";
pub const EARLIEST_RRSIG_EXPIRY: &str = "dnssec_zone_record_earliest_rrsig_expiry";

/// Gauges for one cycle, registered in a registry of their own.
pub struct CycleGauges {
    registry: Registry,
    days_left: GaugeVec,
    resolves: GaugeVec,
    expiry: GaugeVec,
}

impl CycleGauges {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let days_left = GaugeVec::new(
            Opts::new(DAYS_LEFT, "Number of days the signature will be valid"),
            &["zone", "record", "type"],
        )?;
        let resolves = GaugeVec::new(
            Opts::new(
                RESOLVES,
                "Does the record resolve using the specified DNSSEC enabled resolvers",
            ),
            &["resolver", "zone", "record", "type"],
        )?;
        let expiry = GaugeVec::new(
            Opts::new(
                EARLIEST_RRSIG_EXPIRY,
                "Earliest expiring RRSIG covering the record on resolver in unixtime",
            ),
            &["resolver", "zone", "record", "type"],
        )?;

        registry
            .register(Box::new(days_left.clone()))
            .context("Failed to register days_left gauge")?;
        registry
            .register(Box::new(resolves.clone()))
            .context("Failed to register resolves gauge")?;
        registry
            .register(Box::new(expiry.clone()))
            .context("Failed to register expiry gauge")?;

        Ok(CycleGauges {
            registry,
            days_left,
            resolves,
            expiry,
        })
    }

    pub fn record(&self, sample: &Sample) {
        match sample {
            Sample::DaysLeft {
                zone,
                record,
                rtype,
                value,
            } => self
                .days_left
                .with_label_values(&[zone.as_str(), record.as_str(), rtype.as_str()])
                .set(*value),
            Sample::Resolves {
                resolver,
                zone,
                record,
                rtype,
                value,
            } => self
                .resolves
                .with_label_values(&[resolver.as_str(), zone.as_str(), record.as_str(), rtype.as_str()])
                .set(*value),
            Sample::EarliestExpiry {
                resolver,
                zone,
                record,
                rtype,
                value,
            } => self
                .expiry
                .with_label_values(&[resolver.as_str(), zone.as_str(), record.as_str(), rtype.as_str()])
                .set(*value),
        }
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }
}

/// Renders a completed cycle.
pub fn render_report(report: &CycleReport) -> Result<String> {
    let gauges = CycleGauges::new()?;
    for sample in report.samples() {
        gauges.record(&sample);
    }
    gauges.render()
}

/// Running counters about the exporter itself.
#[derive(Debug)]
pub struct ExporterStats {
    pub cycles: AtomicU64,
    pub pairs: AtomicU64,
    pub resolved: AtomicU64,
    pub unresolved: AtomicU64,
    pub timeouts: AtomicU64,
    pub transport_errors: AtomicU64,
    pub transfer_failures: AtomicU64,
    pub internal_errors: AtomicU64,

    pub last_cycle_us: AtomicU64,
    pub max_cycle_us: AtomicU64,

    start_time: Instant,
}

impl ExporterStats {
    pub fn new() -> Self {
        ExporterStats {
            cycles: AtomicU64::new(0),
            pairs: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            transfer_failures: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
            last_cycle_us: AtomicU64::new(0),
            max_cycle_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.pairs.fetch_add(report.len() as u64, Ordering::Relaxed);

        for outcome in &report.outcomes {
            let result = &outcome.result;
            if result.resolves {
                self.resolved.fetch_add(1, Ordering::Relaxed);
            } else {
                self.unresolved.fetch_add(1, Ordering::Relaxed);
            }

            match result.failure {
                Some(Failure::Timeout) => {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                Some(Failure::Transport) => {
                    self.transport_errors.fetch_add(1, Ordering::Relaxed);
                }
                Some(Failure::Untrusted(Verdict::TransferRefused(_))) => {
                    self.transfer_failures.fetch_add(1, Ordering::Relaxed);
                }
                Some(Failure::Internal) => {
                    self.internal_errors.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        let elapsed_us = report.elapsed.as_micros() as u64;
        self.last_cycle_us.store(elapsed_us, Ordering::Relaxed);
        self.max_cycle_us.fetch_max(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            pairs: self.pairs.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            last_cycle: Duration::from_micros(self.last_cycle_us.load(Ordering::Relaxed)),
            max_cycle: Duration::from_micros(self.max_cycle_us.load(Ordering::Relaxed)),
            uptime: self.start_time.elapsed(),
        }
    }

    pub fn log_summary(&self) {
        self.snapshot().log();
    }
}

impl Default for ExporterStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub pairs: u64,
    pub resolved: u64,
    pub unresolved: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub transfer_failures: u64,
    pub internal_errors: u64,
    pub last_cycle: Duration,
    pub max_cycle: Duration,
    pub uptime: Duration,
}

impl StatsSnapshot {
    pub fn log(&self) {
        tracing::info!("=== DNSSEC Exporter Stats ===");
        tracing::info!("Uptime: {:?}", self.uptime);
        tracing::info!("Cycles: {} ({} pairs evaluated)", self.cycles, self.pairs);
        tracing::info!(
            "Results: resolved={} unresolved={}",
            self.resolved,
            self.unresolved
        );

        if self.cycles > 0 {
            tracing::info!(
                "Cycle time: last={:.2}ms max={:.2}ms",
                self.last_cycle.as_secs_f64() * 1000.0,
                self.max_cycle.as_secs_f64() * 1000.0
            );
        }

        if self.timeouts + self.transport_errors > 0 {
            tracing::info!(
                "Network: timeouts={} errors={}",
                self.timeouts,
                self.transport_errors
            );
        }

        if self.transfer_failures > 0 {
            tracing::info!("Zone transfer failures: {}", self.transfer_failures);
        }

        if self.internal_errors > 0 {
            tracing::info!("Internal errors: {}", self.internal_errors);
        }
    }
}
