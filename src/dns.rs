//! DNS reply construction.
//!
//! Wire encoding and decoding is left to `hickory-proto`; this module only
//! builds the handful of replies the forwarder synthesizes itself.

use std::net::IpAddr;

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record};

/// Returns the first question of a query, if any.
pub fn question(query: &Message) -> Option<&Query> {
    query.queries().first()
}

/// Hostname of a question with a single trailing root dot removed.
///
/// This is the form hosts entries are registered under
/// (`raspberrypi`, not `raspberrypi.`).
pub fn host_name(name: &Name) -> String {
    let ascii = name.to_ascii();
    match ascii.strip_suffix('.') {
        Some(trimmed) => trimmed.to_string(),
        None => ascii,
    }
}

/// Build an empty reply to `query`.
///
/// Copies the transaction id, opcode, RD and CD bits and the first question.
pub fn reply_to(query: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_checking_disabled(query.checking_disabled())
        .set_response_code(ResponseCode::NoError);

    if let Some(question) = question(query) {
        reply.add_query(question.clone());
    }

    reply
}

/// Build the answer for a statically configured host.
///
/// The single record is an A record for IPv4 addresses and AAAA for IPv6.
pub fn host_response(query: &Message, name: &Name, address: IpAddr, ttl: u32) -> Message {
    let rdata = match address {
        IpAddr::V4(v4) => RData::A(A(v4)),
        IpAddr::V6(v6) => RData::AAAA(AAAA(v6)),
    };

    let mut reply = reply_to(query);
    reply.add_answer(Record::from_rdata(name.clone(), ttl, rdata));
    reply
}

/// Build the standard "resolution failed" reply (SERVFAIL).
pub fn failure_response(query: &Message) -> Message {
    let mut reply = reply_to(query);
    reply.set_response_code(ResponseCode::ServFail);
    reply
}

/// Re-address a cached answer to the query currently being served.
///
/// The question section is replaced with the query's own, so the letter case
/// the client sent is echoed back even though the cache ignores case.
pub fn response_from_cache(query: &Message, mut cached: Message) -> Message {
    cached
        .set_id(query.id())
        .set_recursion_desired(query.recursion_desired())
        .set_checking_disabled(query.checking_disabled());

    if let Some(question) = question(query) {
        cached.take_queries();
        cached.add_query(question.clone());
    }

    cached
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::RecordType;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::str::FromStr;

    fn query(id: u16, name: &str, record_type: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_str(name).unwrap(), record_type));
        message
    }

    #[test]
    fn host_name_strips_single_trailing_dot() {
        assert_eq!(host_name(&Name::from_str("raspberrypi.").unwrap()), "raspberrypi");
        assert_eq!(host_name(&Name::from_str("nas.lan").unwrap()), "nas.lan");
    }

    #[test]
    fn reply_copies_id_and_question() {
        let request = query(0x4242, "example.com.", RecordType::A);

        let reply = reply_to(&request);

        assert_eq!(reply.id(), 0x4242);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries(), request.queries());
        assert!(reply.answers().is_empty());
    }

    #[test]
    fn host_response_builds_a_record() {
        let request = query(7, "raspberrypi.", RecordType::A);
        let name = request.queries()[0].name().clone();

        let reply = host_response(&request, &name, Ipv4Addr::new(192, 168, 1, 201).into(), 600);

        assert_eq!(reply.id(), 7);
        assert_eq!(reply.response_code(), ResponseCode::NoError);
        assert_eq!(reply.answers().len(), 1);
        let record = &reply.answers()[0];
        assert_eq!(record.record_type(), RecordType::A);
        assert_eq!(record.ttl(), 600);
        assert_eq!(record.data(), Some(&RData::A(A(Ipv4Addr::new(192, 168, 1, 201)))));
    }

    #[test]
    fn host_response_builds_aaaa_record_for_ipv6() {
        let request = query(8, "nas.", RecordType::AAAA);
        let name = request.queries()[0].name().clone();

        let reply = host_response(&request, &name, Ipv6Addr::LOCALHOST.into(), 60);

        assert_eq!(reply.answers()[0].record_type(), RecordType::AAAA);
    }

    #[test]
    fn failure_response_is_servfail() {
        let request = query(99, "example.com.", RecordType::A);

        let reply = failure_response(&request);

        assert_eq!(reply.id(), 99);
        assert_eq!(reply.response_code(), ResponseCode::ServFail);
        assert_eq!(reply.queries().len(), 1);
    }

    #[test]
    fn failure_response_without_question() {
        let mut request = Message::new();
        request.set_id(5);

        let reply = failure_response(&request);

        assert_eq!(reply.id(), 5);
        assert!(reply.queries().is_empty());
    }

    #[test]
    fn response_from_cache_rewrites_id() {
        let request = query(1000, "example.com.", RecordType::A);
        let cached = reply_to(&query(1, "example.com.", RecordType::A));

        let reply = response_from_cache(&request, cached);

        assert_eq!(reply.id(), 1000);
    }

    #[test]
    fn response_from_cache_echoes_question_case_and_flags() {
        let mut request = query(7, "eXaMpLe.COM.", RecordType::A);
        request.set_recursion_desired(false).set_checking_disabled(true);
        let cached = reply_to(&query(1, "example.com.", RecordType::A));

        let reply = response_from_cache(&request, cached);

        assert_eq!(reply.queries().len(), 1);
        assert_eq!(reply.queries()[0].name().to_ascii(), "eXaMpLe.COM.");
        assert!(!reply.recursion_desired());
        assert!(reply.checking_disabled());
    }
}
