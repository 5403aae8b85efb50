use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "dnssec-exporter",
    version,
    about = "Exports DNSSEC signature expiry and validation status as Prometheus metrics"
)]
pub struct Cli {
    /// Address the metrics endpoint listens on
    #[arg(long, default_value = "0.0.0.0:9204")]
    pub listen_address: SocketAddr,

    /// Path to the YAML configuration file
    #[arg(long, default_value = "/etc/dnssec-checks.yaml")]
    pub config: PathBuf,

    /// Resolvers to query, comma separated; the first is the primary
    #[arg(long, value_delimiter = ',', default_values = ["8.8.8.8:53", "1.1.1.1:53"])]
    pub resolvers: Vec<String>,

    /// Timeout for network operations (e.g. 10s, 500ms, 1m)
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Log level, overrides the configuration file
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Resolver list with blanks dropped, order preserved.
    pub fn resolvers(&self) -> Vec<String> {
        self.resolvers
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration {:?}", s))?;

    let seconds = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, s)),
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("duration must be positive: {:?}", s));
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| format!("duration out of range: {:?}", s))
}
