use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hickory_proto::rr::dnssec::rdata::tsig::TsigAlgorithm;
use hickory_proto::rr::dnssec::tsig::TSigner;
use hickory_proto::rr::{Name, RecordType};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Type mnemonic used in configuration for a full zone transfer.
pub const TRANSFER_MNEMONIC: &str = "AXFR";

/// Allowed clock skew for TSIG-signed transfers, in seconds (RFC 8945 default).
const TSIG_FUDGE: u16 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("zone name cannot be empty")]
    EmptyZone,

    #[error("unrecognised record type {0:?}")]
    UnknownType(String),

    #[error("invalid owner name {0:?}")]
    InvalidName(String),

    #[error("TSIG key name cannot be empty")]
    EmptyKeyName,

    #[error("TSIG secret must be valid base64")]
    InvalidSecret,

    #[error("unsupported TSIG algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("credential for {0} does not match any configured check")]
    UnmatchedCredential(CheckKey),

    #[error("credential for {0} is not attached to a zone transfer check")]
    CredentialOnLookup(CheckKey),

    #[error("failed to build TSIG signer: {0}")]
    Signer(String),
}

/// What a check asks the resolver for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// A single record set of the given type.
    Record(RecordType),
    /// The whole zone via AXFR.
    Transfer,
}

impl CheckKind {
    pub fn parse(mnemonic: &str) -> Result<Self, CheckError> {
        let upper = mnemonic.trim().to_ascii_uppercase();
        if upper == TRANSFER_MNEMONIC {
            return Ok(CheckKind::Transfer);
        }

        match RecordType::from_str(&upper) {
            Ok(RecordType::Unknown(_)) | Err(_) => Err(CheckError::UnknownType(mnemonic.to_string())),
            Ok(RecordType::AXFR) => Ok(CheckKind::Transfer),
            Ok(rtype) => Ok(CheckKind::Record(rtype)),
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, CheckKind::Transfer)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Record(rtype) => write!(f, "{}", rtype),
            CheckKind::Transfer => f.write_str(TRANSFER_MNEMONIC),
        }
    }
}

/// A configured (zone, record, type) triple. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    zone: String,
    record: String,
    kind: CheckKind,
}

impl Check {
    pub fn new(zone: &str, record: &str, rtype: &str) -> Result<Self, CheckError> {
        let zone = zone.trim().trim_end_matches('.');
        if zone.is_empty() {
            return Err(CheckError::EmptyZone);
        }

        let record = match record.trim() {
            "" => "@",
            other => other,
        };

        let kind = CheckKind::parse(rtype)?;

        let check = Check {
            zone: zone.to_string(),
            record: record.to_string(),
            kind,
        };

        // Reject names the codec would refuse later, so every unit starts from a valid check.
        let fqdn = check.fqdn();
        Name::from_ascii(&fqdn).map_err(|_| CheckError::InvalidName(fqdn))?;

        Ok(check)
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn record(&self) -> &str {
        &self.record
    }

    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    pub fn type_label(&self) -> String {
        self.kind.to_string()
    }

    pub fn is_apex(&self) -> bool {
        self.record == "@"
    }

    /// Fully-qualified owner name: `zone.` for the apex, `record.zone.` otherwise.
    pub fn fqdn(&self) -> String {
        if self.is_apex() {
            format!("{}.", self.zone)
        } else {
            format!("{}.{}.", self.record, self.zone)
        }
    }

    pub fn key(&self) -> CheckKey {
        CheckKey {
            zone: self.zone.to_ascii_lowercase(),
            record: self.record.to_ascii_lowercase(),
            rtype: self.type_label(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.fqdn(), self.kind)
    }
}

/// Composite lookup key for credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckKey {
    pub zone: String,
    pub record: String,
    pub rtype: String,
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zone, self.record, self.rtype)
    }
}

/// TSIG material for authenticating a zone transfer.
#[derive(Clone)]
pub struct Credential {
    algorithm: TsigAlgorithm,
    key_name: Name,
    secret: Vec<u8>,
    signer: TSigner,
}

impl Credential {
    pub fn new(algorithm: &str, key_name: &str, secret_base64: &str) -> Result<Self, CheckError> {
        let algorithm = parse_algorithm(algorithm)?;

        let key_name = key_name.trim();
        if key_name.is_empty() {
            return Err(CheckError::EmptyKeyName);
        }
        let key_name = Name::from_ascii(key_name)
            .map_err(|_| CheckError::InvalidName(key_name.to_string()))?;

        let secret = STANDARD
            .decode(secret_base64.trim())
            .map_err(|_| CheckError::InvalidSecret)?;

        let signer = TSigner::new(secret.clone(), algorithm.clone(), key_name.clone(), TSIG_FUDGE)
            .map_err(|e| CheckError::Signer(e.to_string()))?;

        Ok(Credential {
            algorithm,
            key_name,
            secret,
            signer,
        })
    }

    /// Decoded shared secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn algorithm(&self) -> &TsigAlgorithm {
        &self.algorithm
    }

    pub fn key_name(&self) -> &Name {
        &self.key_name
    }

    pub fn signer(&self) -> &TSigner {
        &self.signer
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret
        f.debug_struct("Credential")
            .field("algorithm", &self.algorithm)
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

fn parse_algorithm(name: &str) -> Result<TsigAlgorithm, CheckError> {
    match name.trim().trim_end_matches('.').to_ascii_lowercase().as_str() {
        "hmac-sha256" => Ok(TsigAlgorithm::HmacSha256),
        "hmac-sha384" => Ok(TsigAlgorithm::HmacSha384),
        "hmac-sha512" => Ok(TsigAlgorithm::HmacSha512),
        _ => Err(CheckError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Process-wide, read-only set of checks and their transfer credentials.
#[derive(Debug, Default)]
pub struct CheckRegistry {
    checks: Vec<Check>,
    credentials: HashMap<CheckKey, Arc<Credential>>,
}

impl CheckRegistry {
    pub fn new(checks: Vec<Check>) -> Self {
        CheckRegistry {
            checks,
            credentials: HashMap::new(),
        }
    }

    /// Associates a credential with the check matching `key` exactly.
    pub fn add_credential(&mut self, key: CheckKey, credential: Credential) -> Result<(), CheckError> {
        let check = self
            .checks
            .iter()
            .find(|c| c.key() == key)
            .ok_or_else(|| CheckError::UnmatchedCredential(key.clone()))?;

        if !check.kind().is_transfer() {
            return Err(CheckError::CredentialOnLookup(key));
        }

        self.credentials.insert(key, Arc::new(credential));
        Ok(())
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn credential_for(&self, check: &Check) -> Option<Arc<Credential>> {
        self.credentials.get(&check.key()).cloned()
    }

    /// True when a configured check has exactly this identity.
    pub fn contains_key(&self, key: &CheckKey) -> bool {
        self.checks.iter().any(|c| &c.key() == key)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apex_fqdn() {
        let check = Check::new("example.org", "@", "SOA").unwrap();
        assert_eq!(check.fqdn(), "example.org.");
        assert!(check.is_apex());
    }

    #[test]
    fn test_relative_fqdn() {
        let check = Check::new("example.org", "www", "A").unwrap();
        assert_eq!(check.fqdn(), "www.example.org.");
    }

    #[test]
    fn test_trailing_dot_zone() {
        let check = Check::new("example.org.", "@", "SOA").unwrap();
        assert_eq!(check.zone(), "example.org");
        assert_eq!(check.fqdn(), "example.org.");
    }

    #[test]
    fn test_empty_record_means_apex() {
        let check = Check::new("example.org", "", "NS").unwrap();
        assert_eq!(check.record(), "@");
    }

    #[test]
    fn test_empty_zone_rejected() {
        assert_eq!(Check::new("", "@", "SOA"), Err(CheckError::EmptyZone));
        assert_eq!(Check::new(" . ", "@", "SOA"), Err(CheckError::EmptyZone));
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(
            Check::new("example.org", "@", "soa").unwrap().kind(),
            CheckKind::Record(RecordType::SOA)
        );
        assert_eq!(
            Check::new("example.org", "@", "DNSKEY").unwrap().kind(),
            CheckKind::Record(RecordType::DNSKEY)
        );
        assert_eq!(
            Check::new("example.org", "@", "axfr").unwrap().kind(),
            CheckKind::Transfer
        );
        assert!(matches!(
            Check::new("example.org", "@", "BOGUS"),
            Err(CheckError::UnknownType(_))
        ));
    }

    #[test]
    fn test_type_label() {
        let check = Check::new("example.org", "@", "AXFR").unwrap();
        assert_eq!(check.type_label(), "AXFR");

        let check = Check::new("example.org", "mail", "mx").unwrap();
        assert_eq!(check.type_label(), "MX");
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = Check::new("Example.ORG", "WWW", "a").unwrap();
        let b = Check::new("example.org", "www", "A").unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_credential_algorithms() {
        assert!(Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").is_ok());
        assert!(Credential::new("HMAC-SHA512.", "xfr-key", "c2VjcmV0").is_ok());
        assert!(matches!(
            Credential::new("hmac-md5", "xfr-key", "c2VjcmV0"),
            Err(CheckError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_credential_bad_secret() {
        assert!(matches!(
            Credential::new("hmac-sha256", "xfr-key", "not base64!"),
            Err(CheckError::InvalidSecret)
        ));
    }

    #[test]
    fn test_credential_empty_key_name() {
        assert!(matches!(
            Credential::new("hmac-sha256", "  ", "c2VjcmV0"),
            Err(CheckError::EmptyKeyName)
        ));
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let credential = Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap();
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("xfr-key"));
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn test_registry_credential_lookup() {
        let axfr = Check::new("example.org", "@", "AXFR").unwrap();
        let soa = Check::new("example.org", "@", "SOA").unwrap();
        let mut registry = CheckRegistry::new(vec![soa.clone(), axfr.clone()]);

        let credential = Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap();
        registry.add_credential(axfr.key(), credential).unwrap();

        assert!(registry.credential_for(&axfr).is_some());
        assert!(registry.credential_for(&soa).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_contains_key() {
        let registry = CheckRegistry::new(vec![Check::new("Example.org", "@", "soa").unwrap()]);
        assert!(registry.contains_key(&Check::new("example.org", "@", "SOA").unwrap().key()));
        assert!(!registry.contains_key(&Check::new("example.org", "@", "NS").unwrap().key()));
    }

    #[test]
    fn test_registry_rejects_unmatched_credential() {
        let axfr = Check::new("example.org", "@", "AXFR").unwrap();
        let mut registry = CheckRegistry::new(vec![axfr]);

        let other = Check::new("example.net", "@", "AXFR").unwrap();
        let credential = Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap();
        let result = registry.add_credential(other.key(), credential);
        assert!(matches!(result, Err(CheckError::UnmatchedCredential(_))));
    }

    #[test]
    fn test_registry_rejects_credential_on_lookup() {
        let soa = Check::new("example.org", "@", "SOA").unwrap();
        let mut registry = CheckRegistry::new(vec![soa.clone()]);

        let credential = Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap();
        let result = registry.add_credential(soa.key(), credential);
        assert!(matches!(result, Err(CheckError::CredentialOnLookup(_))));
    }
}
