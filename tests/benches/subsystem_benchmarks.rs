//! # Universal Client Subsystem Benchmarks
//!
//! Throughput checks for the paths every event and every coordination tick
//! runs through:
//!
//! | Subsystem | Operation | Why it matters |
//! |-----------|-----------|-----------------|
//! | C1 store | insert / CAS | runs once per ingested event, per status hop |
//! | C5 registry | chain id sanitization | runs once per worker spawn |
//! | C7 coordinator | epoch election, subset draw | runs every scan tick, every chain |
//! | shared-types | status transition check | guards every store write |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_types::entities::sanitize_chain_id;
use shared_types::{ChainId, Event, EventStatus, EventType, ConfirmationType};
use std::sync::Arc;
use uc_coordinator::{
    coordinator_for_epoch, epoch_for_height, select_sign_subset, ValidatorInfo, ValidatorStatus,
    DEFAULT_COORDINATOR_RANGE,
};
use uc_store::ChainStore;

fn make_event(id: &str, status: EventStatus) -> Event {
    Event {
        event_id: id.into(),
        chain_id: ChainId::from("eip155:1"),
        block_height: 100,
        expiry_block_height: 500,
        event_type: EventType::Sign,
        confirmation_type: ConfirmationType::Standard,
        status,
        event_data: serde_json::json!({ "destination_chain_id": "eip155:1" }),
        broadcasted_tx_hash: None,
        vote_tx_hash: None,
        terminal_at: None,
    }
}

fn bench_chain_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("uc-store-chain-store");

    group.bench_function("insert_if_not_exists", |b| {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let event = make_event(&format!("0xabc:{n}"), EventStatus::Pending);
            black_box(store.insert_if_not_exists(&event).unwrap())
        })
    });

    group.bench_function("compare_and_swap_status", |b| {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let id = format!("0xabc:{n}");
            store.insert_if_not_exists(&make_event(&id, EventStatus::Pending)).unwrap();
            black_box(store.compare_and_swap_status(&id, EventStatus::Pending, EventStatus::Confirmed).unwrap())
        })
    });

    let batch_sizes = [100, 1_000, 5_000];
    for size in batch_sizes {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("oldest_by_status_scan", size), &size, |b, &size| {
            let dir = tempfile::tempdir().unwrap();
            let store = ChainStore::open(dir.path()).unwrap();
            for i in 0..size {
                store.insert_if_not_exists(&make_event(&format!("0xabc:{i}"), EventStatus::Pending)).unwrap();
            }
            b.iter(|| black_box(store.oldest_by_status(EventStatus::Pending, size).unwrap()))
        });
    }

    group.finish();
}

fn bench_status_transitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared-types-event-status");

    group.bench_function("can_transition_to_happy_path", |b| {
        b.iter(|| {
            black_box(EventStatus::Pending.can_transition_to(EventStatus::Confirmed))
                && black_box(EventStatus::Confirmed.can_transition_to(EventStatus::InProgress))
        })
    });

    group.bench_function("sanitize_chain_id", |b| {
        b.iter(|| black_box(sanitize_chain_id("eip155:11155111")))
    });

    group.finish();
}

fn bench_coordinator_election(c: &mut Criterion) {
    let mut group = c.benchmark_group("uc-coordinator-election");

    let validator_counts = [10, 100, 500, 1000];
    for count in validator_counts {
        let addrs: Vec<String> = (0..count).map(|i| format!("pushvaloper1{i:06}")).collect();
        let infos: Vec<ValidatorInfo> = addrs
            .iter()
            .map(|addr| ValidatorInfo {
                operator_address: addr.clone(),
                status: ValidatorStatus::Active,
                public_key_hex: "aa".into(),
                network_address: "http://unused".into(),
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("coordinator_for_epoch", count), &addrs, |b, addrs| {
            let mut height = 0u64;
            b.iter(|| {
                height += DEFAULT_COORDINATOR_RANGE;
                let epoch = epoch_for_height(height, DEFAULT_COORDINATOR_RANGE);
                black_box(coordinator_for_epoch(epoch, addrs))
            })
        });

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("select_sign_subset", count), &infos, |b, infos| {
            let mut epoch = 0u64;
            b.iter(|| {
                epoch += 1;
                black_box(select_sign_subset(infos, "push-process-0:0", epoch))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain_store, bench_status_transitions, bench_coordinator_election);
criterion_main!(benches);
