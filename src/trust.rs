use crate::check::CheckKind;
use crate::transport::Response;
use hickory_proto::op::ResponseCode;
use std::fmt;

/// Outcome of the trust decision, with the reason when the answer is not trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Trusted,
    /// Lookup answered with a failure code.
    Rcode(ResponseCode),
    /// Lookup succeeded but carried neither AD nor AA.
    Unauthenticated,
    /// Zone transfer rejected, usually ACL or TSIG rather than DNSSEC.
    TransferRefused(ResponseCode),
}

impl Verdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verdict::Trusted)
    }

    /// Short reason code for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Verdict::Trusted => "ok",
            Verdict::Rcode(_) => "lookup_rcode",
            Verdict::Unauthenticated => "lookup_unauthenticated",
            Verdict::TransferRefused(_) => "transfer_refused",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Trusted => f.write_str("trusted"),
            Verdict::Rcode(code) => write!(f, "lookup failed with {}", code),
            Verdict::Unauthenticated => {
                f.write_str("lookup not authenticated (neither AD nor AA set)")
            }
            Verdict::TransferRefused(code) => {
                write!(f, "zone transfer failed with {} (check ACL or TSIG key)", code)
            }
        }
    }
}

pub fn decide(kind: CheckKind, response: &Response) -> Verdict {
    match kind {
        CheckKind::Transfer => {
            if response.rcode == ResponseCode::NoError {
                Verdict::Trusted
            } else {
                Verdict::TransferRefused(response.rcode)
            }
        }
        CheckKind::Record(_) => {
            if response.rcode != ResponseCode::NoError {
                Verdict::Rcode(response.rcode)
            } else if response.authentic_data || response.authoritative {
                // validating resolvers set AD, authoritative servers set AA
                Verdict::Trusted
            } else {
                Verdict::Unauthenticated
            }
        }
    }
}

pub fn resolves(kind: CheckKind, response: &Response) -> bool {
    decide(kind, response).is_trusted()
}
