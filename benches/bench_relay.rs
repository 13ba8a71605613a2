//! Microbenchmarks for the hot data-plane pieces: address parsing, header
//! write/peek/verify, the replay window, and token decryption.
//!
//! ## Run
//! ```bash
//! cargo bench --bench bench_relay
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hoplink_relay_lib::crypto;
use hoplink_relay_lib::net::RelayAddress;
use hoplink_relay_lib::protocol::{
    peek_header, verify_header, write_header, Direction, CLIENT_TO_SERVER_PACKET, HEADER_BYTES,
};
use hoplink_relay_lib::session::replay::ReplayProtection;
use hoplink_relay_lib::token::{RouteToken, ENCRYPTED_ROUTE_TOKEN_BYTES};

fn bench_address_parse(c: &mut Criterion) {
    c.bench_function("address_parse_ipv4", |b| {
        b.iter(|| black_box("107.77.207.77:40000").parse::<RelayAddress>().unwrap())
    });
    c.bench_function("address_parse_ipv6", |b| {
        b.iter(|| {
            black_box("[fe80::202:b3ff:fe1e:8329]:40000")
                .parse::<RelayAddress>()
                .unwrap()
        })
    });
}

fn bench_header(c: &mut Criterion) {
    let mut key = [0u8; 32];
    crypto::random_bytes(&mut key);

    c.bench_function("header_write", |b| {
        let mut buffer = [0u8; HEADER_BYTES];
        let mut sequence = 0u64;
        b.iter(|| {
            sequence += 1;
            write_header(
                Direction::ClientToServer,
                CLIENT_TO_SERVER_PACKET,
                sequence,
                0x12313131,
                0x12,
                &key,
                &mut buffer,
            )
            .unwrap();
            black_box(&buffer);
        })
    });

    let mut buffer = [0u8; HEADER_BYTES];
    write_header(
        Direction::ClientToServer,
        CLIENT_TO_SERVER_PACKET,
        12345,
        0x12313131,
        0x12,
        &key,
        &mut buffer,
    )
    .unwrap();

    c.bench_function("header_peek", |b| {
        b.iter(|| peek_header(Direction::ClientToServer, black_box(&buffer)).unwrap())
    });

    c.bench_function("header_verify", |b| {
        b.iter(|| verify_header(Direction::ClientToServer, &key, black_box(&buffer)).unwrap())
    });
}

fn bench_replay_window(c: &mut Criterion) {
    c.bench_function("replay_window_advance", |b| {
        let mut replay = ReplayProtection::new();
        let mut sequence = 0u64;
        b.iter(|| {
            sequence += 1;
            if !replay.already_received(sequence) {
                replay.advance(sequence);
            }
        })
    });
}

fn bench_route_token_decrypt(c: &mut Criterion) {
    let mut sender_secret = [0u8; 32];
    crypto::random_bytes(&mut sender_secret);
    let sender_public = crypto::box_public_key(&sender_secret);
    let mut receiver_secret = [0u8; 32];
    crypto::random_bytes(&mut receiver_secret);
    let receiver_public = crypto::box_public_key(&receiver_secret);

    let mut private_key = [0u8; 32];
    crypto::random_bytes(&mut private_key);
    let token = RouteToken {
        expire_timestamp: u64::MAX,
        session_id: 1,
        session_version: 1,
        session_flags: 0,
        kbps_up: 1024,
        kbps_down: 1024,
        next_address: "127.0.0.1:40000".parse().unwrap(),
        private_key,
    };
    let mut buffer = [0u8; ENCRYPTED_ROUTE_TOKEN_BYTES];
    token
        .write_encrypted(&mut buffer, &sender_secret, &receiver_public)
        .unwrap();

    c.bench_function("route_token_decrypt", |b| {
        b.iter(|| {
            RouteToken::read_encrypted(black_box(&buffer), &sender_public, &receiver_secret)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_address_parse,
    bench_header,
    bench_replay_window,
    bench_route_token_decrypt
);
criterion_main!(benches);
