//! Benchmarks for DNS message encoding and decoding.
//!
//! Uses a signed referral-sized response: a few answers, NS records in the
//! authority section, glue and an OPT record, which is what the iterator
//! handles on most upstream round trips.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use anchorage::dns::{Message, Question, Record, class, parse_records, rtype};

fn build_response() -> Message {
    let question = Question::new("www.example.com.".parse().unwrap(), rtype::A, class::IN);
    let query = Message::query(0x1234, question, false);
    let mut response = Message::response_to(&query);
    response.header.aa = true;

    let section = |text: &str| -> Vec<Record> { parse_records(text).unwrap() };
    response.answers = section(
        "www.example.com. 300 IN CNAME web.example.com.
         web.example.com. 300 IN A 192.0.2.80
         web.example.com. 300 IN A 192.0.2.81
         web.example.com. 300 IN RRSIG A 13 3 300 20300101000000 20200101000000 12345 example.com. \
             dGVzdHNpZ25hdHVyZXRlc3RzaWduYXR1cmV0ZXN0c2lnbmF0dXJldGVzdHNpZ25hdHVyZQ==",
    );
    response.authority = section(
        "example.com. 86400 IN NS ns1.example.com.
         example.com. 86400 IN NS ns2.example.com.",
    );
    response.additional = section(
        "ns1.example.com. 86400 IN A 192.0.2.1
         ns2.example.com. 86400 IN A 192.0.2.2
         ns1.example.com. 86400 IN AAAA 2001:db8::1",
    );
    response.set_edns(1232, true);
    response
}

fn bench_encode(c: &mut Criterion) {
    let message = build_response();
    let size = message.encode().len() as u64;

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(size));
    group.bench_function(BenchmarkId::new("response", size), |b| {
        b.iter(|| black_box(&message).encode())
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let wire = build_response().encode();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function(BenchmarkId::new("response", wire.len()), |b| {
        b.iter(|| Message::decode(black_box(&wire)).unwrap())
    });

    // A bare query, the common case on the receiving side of a test server.
    let question = Question::new("example.com.".parse().unwrap(), rtype::A, class::IN);
    let query = Message::query(1, question, true).encode();
    group.bench_function(BenchmarkId::new("query", query.len()), |b| {
        b.iter(|| Message::decode(black_box(&query)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
