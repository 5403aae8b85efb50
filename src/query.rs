use crate::check::{Check, CheckKind, Credential};
use anyhow::{Context, Result};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::sync::Arc;

/// Advertised EDNS0 UDP payload size.
pub const EDNS_PAYLOAD: u16 = 4096;

/// A request ready to hand to an [`Exchange`](crate::transport::Exchange).
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub message: Message,
    pub kind: CheckKind,
    /// TSIG key applied by the transport when the message is sent.
    pub credential: Option<Arc<Credential>>,
}

impl PreparedQuery {
    pub fn is_transfer(&self) -> bool {
        self.kind.is_transfer()
    }
}

pub fn owner_name(check: &Check) -> Result<Name> {
    Name::from_ascii(check.fqdn()).context(format!("Invalid owner name for {}", check))
}

/// Builds the request for one check. Credentials only apply to transfers.
pub fn build(check: &Check, credential: Option<Arc<Credential>>) -> Result<PreparedQuery> {
    let name = owner_name(check)?;

    let mut message = Message::new();
    message.set_id(rand::random::<u16>());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);

    let credential = match check.kind() {
        CheckKind::Record(rtype) => {
            message.set_recursion_desired(true);
            message.add_query(Query::query(name, rtype));

            let mut edns = Edns::new();
            edns.set_max_payload(EDNS_PAYLOAD);
            edns.set_version(0);
            edns.set_dnssec_ok(true);
            message.set_edns(edns);

            None
        }
        CheckKind::Transfer => {
            message.add_query(Query::query(name, RecordType::AXFR));
            credential
        }
    };

    Ok(PreparedQuery {
        message,
        kind: check.kind(),
        credential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_query() {
        let check = Check::new("example.org", "@", "SOA").unwrap();
        let prepared = build(&check, None).unwrap();

        let message = &prepared.message;
        assert_eq!(message.message_type(), MessageType::Query);
        assert_eq!(message.op_code(), OpCode::Query);
        assert!(message.recursion_desired());
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].name().to_ascii(), "example.org.");
        assert_eq!(message.queries()[0].query_type(), RecordType::SOA);
        assert!(!prepared.is_transfer());
        assert!(prepared.credential.is_none());
    }

    #[test]
    fn test_lookup_query_edns() {
        let check = Check::new("example.org", "www", "A").unwrap();
        let prepared = build(&check, None).unwrap();

        let edns = prepared.message.extensions().as_ref().unwrap();
        assert_eq!(edns.max_payload(), EDNS_PAYLOAD);
        assert!(edns.dnssec_ok());
        assert_eq!(prepared.message.queries()[0].name().to_ascii(), "www.example.org.");
    }

    #[test]
    fn test_transfer_query() {
        let check = Check::new("example.org", "@", "AXFR").unwrap();
        let prepared = build(&check, None).unwrap();

        assert!(prepared.is_transfer());
        assert_eq!(prepared.message.queries()[0].query_type(), RecordType::AXFR);
        assert_eq!(prepared.message.queries()[0].name().to_ascii(), "example.org.");
        assert!(prepared.message.extensions().is_none());
        assert!(prepared.credential.is_none());
    }

    #[test]
    fn test_transfer_query_carries_credential() {
        let check = Check::new("example.org", "@", "AXFR").unwrap();
        let credential = Arc::new(Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap());
        let prepared = build(&check, Some(credential)).unwrap();

        let attached = prepared.credential.as_ref().unwrap();
        assert_eq!(attached.key_name().to_ascii(), "xfr-key");
    }

    #[test]
    fn test_lookup_ignores_credential() {
        let check = Check::new("example.org", "@", "SOA").unwrap();
        let credential = Arc::new(Credential::new("hmac-sha256", "xfr-key", "c2VjcmV0").unwrap());
        let prepared = build(&check, Some(credential)).unwrap();
        assert!(prepared.credential.is_none());
    }

    #[test]
    fn test_build_is_deterministic_apart_from_id() {
        let check = Check::new("example.org", "@", "DNSKEY").unwrap();
        let a = build(&check, None).unwrap();
        let b = build(&check, None).unwrap();
        assert_eq!(a.message.queries(), b.message.queries());
        assert_eq!(a.kind, b.kind);
    }
}
