use hickory_proto::rr::dnssec::rdata::DNSSECRData;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::cmp::Ordering;

/// The RRSIG chosen as the earliest to expire in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Expiration as seconds since the Unix epoch.
    pub expiration: u32,
    pub owner: Name,
    pub covered: RecordType,
}

impl Signature {
    fn from_record(record: &Record) -> Option<Self> {
        match record.data() {
            Some(RData::DNSSEC(DNSSECRData::SIG(sig))) => Some(Signature {
                expiration: sig.sig_expiration(),
                owner: record.name().clone(),
                covered: sig.type_covered(),
            }),
            _ => None,
        }
    }

    /// Total order: expiration first, then owner name, then covered type code.
    fn precedes(&self, other: &Signature) -> bool {
        let ordering = self
            .expiration
            .cmp(&other.expiration)
            .then_with(|| self.owner.cmp(&other.owner))
            .then_with(|| u16::from(self.covered).cmp(&u16::from(other.covered)));
        ordering == Ordering::Less
    }
}

/// Scans `answers` for RRSIGs and returns the one expiring soonest.
///
/// Signatures with a zero expiration are malformed and never selected, even
/// when they are the only candidate. Ties on expiration are broken by owner
/// and covered type so the choice does not depend on record order, which
/// matters for zone transfers where unrelated RRsets arrive interleaved.
pub fn select_earliest(answers: &[Record]) -> Option<Signature> {
    let mut best: Option<Signature> = None;

    for candidate in answers.iter().filter_map(Signature::from_record) {
        if candidate.expiration == 0 {
            tracing::debug!(
                "Ignoring RRSIG with zero expiration: {} {}",
                candidate.owner,
                candidate.covered
            );
            continue;
        }

        let replace = match &best {
            None => true,
            Some(current) => candidate.precedes(current),
        };

        if replace {
            best = Some(candidate);
        }
    }

    best
}
