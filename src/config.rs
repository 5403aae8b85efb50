use crate::check::{Check, CheckRegistry, Credential};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub records: Vec<RecordConfig>,

    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordConfig {
    pub zone: String,

    #[serde(default = "default_record")]
    pub record: String,

    #[serde(rename = "type")]
    pub rtype: String,
}

/// TSIG key for the transfer check with the same zone/record/type.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CredentialConfig {
    pub zone: String,

    #[serde(default = "default_record")]
    pub record: String,

    #[serde(rename = "type", default = "default_credential_type")]
    pub rtype: String,

    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    pub key_name: String,

    pub secret: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_record() -> String {
    "@".to_string()
}

fn default_credential_type() -> String {
    crate::check::TRANSFER_MNEMONIC.to_string()
}

fn default_algorithm() -> String {
    "hmac-sha256".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

        Ok(config)
    }

    /// Turns the file model into the immutable registry the engine runs on.
    pub fn build_registry(&self) -> Result<CheckRegistry> {
        if self.records.is_empty() {
            anyhow::bail!("At least one record must be configured");
        }

        let mut checks = Vec::with_capacity(self.records.len());
        for (i, record) in self.records.iter().enumerate() {
            let check = Check::new(&record.zone, &record.record, &record.rtype)
                .with_context(|| format!("Invalid record #{} ({})", i + 1, record.zone))?;
            checks.push(check);
        }

        let mut registry = CheckRegistry::new(checks);

        for credential in &self.credentials {
            let key = Check::new(&credential.zone, &credential.record, &credential.rtype)
                .with_context(|| format!("Invalid credential target {}", credential.zone))?
                .key();

            let parsed = Credential::new(&credential.algorithm, &credential.key_name, &credential.secret)
                .with_context(|| format!("Invalid credential {}", credential.key_name))?;

            registry
                .add_credential(key, parsed)
                .with_context(|| format!("Invalid credential {}", credential.key_name))?;
        }

        Ok(registry)
    }
}
