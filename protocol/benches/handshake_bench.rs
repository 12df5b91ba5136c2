// Handshake and framing benchmarks for local association.
//
// Covers association key generation, HELLO_REQ signing, a complete
// HELLO_REQ/HELLO_RSP exchange, and sealing/opening frames of several sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mwa_protocol::crypto::{AssociationKeypair, EcdhKeypair, SharedSecret};
use mwa_protocol::handshake::{
    build_hello_req, build_hello_rsp, parse_hello_rsp, verify_hello_req, SessionProperties,
};
use mwa_protocol::jsonrpc::{encode_request, JsonRpcRequest, RpcMethod};

fn bench_association_keygen(c: &mut Criterion) {
    c.bench_function("p256/association_keygen", |b| {
        b.iter(AssociationKeypair::generate);
    });
}

fn bench_hello_req(c: &mut Criterion) {
    c.bench_function("handshake/build_hello_req", |b| {
        b.iter_batched(
            || (AssociationKeypair::generate(), EcdhKeypair::generate()),
            |(association, ecdh)| build_hello_req(ecdh.public_key(), association),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_full_handshake(c: &mut Criterion) {
    c.bench_function("handshake/full_exchange", |b| {
        b.iter(|| {
            let association = AssociationKeypair::generate();
            let ecdh = EcdhKeypair::generate();
            let (hello_req, association_public_key) =
                build_hello_req(ecdh.public_key(), association);

            let dapp_public = verify_hello_req(&hello_req, &association_public_key).unwrap();
            let (hello_rsp, _wallet_secret) = build_hello_rsp(
                &dapp_public,
                &association_public_key,
                &SessionProperties::default(),
            )
            .unwrap();
            parse_hello_rsp(&hello_rsp, ecdh, &association_public_key).unwrap()
        });
    });
}

fn bench_frame_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("aes128gcm/frame_roundtrip");
    let key = [0x42u8; 16];

    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![0xabu8; size];
        let mut outbound = SharedSecret::from_key(&key).unwrap();
        let mut inbound = SharedSecret::from_key(&key).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let frame = outbound.encrypt(payload).unwrap();
                inbound.decrypt(&frame).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_encode_request(c: &mut Criterion) {
    let mut secret = SharedSecret::from_key(&[7u8; 16]).unwrap();
    let request = JsonRpcRequest::new(
        1,
        RpcMethod::SignTransactions,
        serde_json::json!({ "payloads": vec!["AQIDBAUGBwgJCgsMDQ4PEA=="; 8] }),
    );

    c.bench_function("jsonrpc/encode_request", |b| {
        b.iter(|| encode_request(&request, &mut secret).unwrap());
    });
}

criterion_group!(
    benches,
    bench_association_keygen,
    bench_hello_req,
    bench_full_handshake,
    bench_frame_roundtrip,
    bench_encode_request,
);
criterion_main!(benches);
