#![allow(dead_code)]

use hickory_proto::rr::dnssec::Algorithm;
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, SIG};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use proptest::prelude::*;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Builds an RRSIG record over `covered` at `owner` expiring at `expiration`.
pub fn rrsig(owner: &str, covered: RecordType, expiration: u32) -> Record {
    let owner = Name::from_str(owner).unwrap();
    let inception = expiration.saturating_sub(14 * 86400);
    let sig = SIG::new(
        covered,
        Algorithm::ECDSAP256SHA256,
        owner.num_labels(),
        3600,
        expiration,
        inception,
        12345,
        Name::from_str("example.org.").unwrap(),
        vec![1, 2, 3, 4],
    );

    Record::from_rdata(owner, 3600, RData::DNSSEC(DNSSECRData::SIG(sig)))
}

pub fn arb_dns_label() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('a', 'z'), 1..=12)
        .prop_map(|chars| chars.into_iter().collect::<String>())
}

/// Names under example.org, which is what transferred zones look like.
pub fn arb_owner_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("example.org.".to_string()),
        arb_dns_label().prop_map(|label| format!("{}.example.org.", label)),
    ]
}

pub fn arb_covered_type() -> impl Strategy<Value = RecordType> {
    prop_oneof![
        Just(RecordType::SOA),
        Just(RecordType::NS),
        Just(RecordType::A),
        Just(RecordType::AAAA),
        Just(RecordType::MX),
        Just(RecordType::TXT),
        Just(RecordType::DNSKEY),
        Just(RecordType::NSEC),
    ]
}

/// Expirations cluster on a few values so ties and zeros show up often.
pub fn arb_expiration() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(0u32),
        Just(1_900_000_000u32),
        Just(2_000_000_000u32),
        1u32..=u32::MAX,
    ]
}

pub fn arb_rrsig() -> impl Strategy<Value = Record> {
    (arb_owner_name(), arb_covered_type(), arb_expiration())
        .prop_map(|(owner, covered, expiration)| rrsig(&owner, covered, expiration))
}

pub fn arb_a_record() -> impl Strategy<Value = Record> {
    (arb_owner_name(), any::<[u8; 4]>()).prop_map(|(owner, ip)| {
        Record::from_rdata(
            Name::from_str(&owner).unwrap(),
            3600,
            RData::A(hickory_proto::rr::rdata::A(Ipv4Addr::from(ip))),
        )
    })
}

/// A transfer-like answer section: signatures interleaved with plain data.
pub fn arb_signature_set() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(prop_oneof![3 => arb_rrsig(), 1 => arb_a_record()], 0..24)
}
