//! DNS wire codec: decode a query, encode a single-A-record answer.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::net::Ipv4Addr;

use crate::error::DnsError;

/// The parts of a query the responder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Transaction id, echoed in the response.
    pub id: u16,
    /// Question name exactly as received, echoed in the response.
    pub name: Name,
    /// Requested name, lowercase, without the trailing dot.
    pub domain: String,
}

/// Normalize a domain name for zone comparison.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}

/// Decode a query datagram. Only the first question is considered.
pub fn parse_query(bytes: &[u8]) -> Result<ParsedQuery, DnsError> {
    let msg = Message::from_vec(bytes)?;

    if msg.message_type() != MessageType::Query {
        return Err(DnsError::Malformed("message is a response".to_string()));
    }
    if msg.op_code() != OpCode::Query {
        return Err(DnsError::Malformed(format!(
            "unsupported opcode {:?}",
            msg.op_code()
        )));
    }

    let query = msg
        .queries()
        .first()
        .ok_or_else(|| DnsError::Malformed("no question".to_string()))?;

    Ok(ParsedQuery {
        id: msg.id(),
        name: query.name().clone(),
        domain: normalize_domain(&query.name().to_ascii()),
    })
}

/// Encode an authoritative response carrying one A record for `name`.
///
/// The name is written with the case it was asked with.
pub fn build_response(id: u16, name: &Name, ip: Ipv4Addr, ttl: u32) -> Result<Vec<u8>, DnsError> {
    let mut query = Query::query(name.clone(), RecordType::A);
    query.set_query_class(DNSClass::IN);

    let mut answer = Record::from_rdata(name.clone(), ttl, RData::A(A::from(ip)));
    answer.set_dns_class(DNSClass::IN);

    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_authoritative(true)
        .set_response_code(ResponseCode::NoError)
        .add_query(query)
        .add_answer(answer);

    Ok(msg.to_vec()?)
}
