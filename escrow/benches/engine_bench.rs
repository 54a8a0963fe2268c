// Escrow engine benchmarks.
//
// Covers earnest deposits, sale finalization, the full listing-to-closing
// pipeline, and the escrowed-total scan across growing books.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use escritura_escrow::engine::EscrowEngine;
use escritura_escrow::identity::{Address, Roles};
use escritura_escrow::ledger::AccountLedger;
use escritura_escrow::registry::{DeedId, DeedRegistry};

const PRICE: u64 = 1_000_000;
const EARNEST: u64 = 200_000;

fn addr(tag: u8) -> Address {
    Address::from_bytes([tag; 32])
}

/// Sets up books with one minted deed approved for engine transfer but
/// not yet listed. Seller is addr(1), inspector addr(2), lender addr(3),
/// buyer addr(4).
fn setup_unlisted() -> (EscrowEngine, DeedRegistry, AccountLedger, DeedId) {
    let roles = Roles {
        seller: addr(1),
        inspector: addr(2),
        lender: addr(3),
    };
    let engine = EscrowEngine::new(addr(9), roles);
    let mut registry = DeedRegistry::new();
    let mut ledger = AccountLedger::new();

    ledger.credit(addr(4), 2 * PRICE).unwrap();
    ledger.credit(roles.lender, 10 * PRICE).unwrap();

    let deed = registry.mint(roles.seller, "ipfs://deeds/parcel-0.json");
    registry
        .approve(roles.seller, engine.address(), deed)
        .unwrap();
    (engine, registry, ledger, deed)
}

/// Sets up books with `n` listed deeds and no deposits yet. Same party
/// addresses as [`setup_unlisted`]; the buyer and lender are funded for
/// every listing.
fn setup_listed(n: usize) -> (EscrowEngine, DeedRegistry, AccountLedger, Vec<DeedId>) {
    let roles = Roles {
        seller: addr(1),
        inspector: addr(2),
        lender: addr(3),
    };
    let buyer = addr(4);
    let mut engine = EscrowEngine::new(addr(9), roles);
    let mut registry = DeedRegistry::new();
    let mut ledger = AccountLedger::new();

    ledger.credit(buyer, (n as u64 + 1) * PRICE).unwrap();
    ledger.credit(roles.lender, (n as u64 + 1) * PRICE).unwrap();

    let mut deeds = Vec::with_capacity(n);
    for i in 0..n {
        let deed = registry.mint(roles.seller, format!("ipfs://deeds/parcel-{i}.json"));
        registry
            .approve(roles.seller, engine.address(), deed)
            .unwrap();
        engine
            .list(&mut registry, roles.seller, deed, buyer, PRICE, EARNEST)
            .unwrap();
        deeds.push(deed);
    }

    (engine, registry, ledger, deeds)
}

fn bench_deposit_earnest(c: &mut Criterion) {
    c.bench_function("escrow/deposit_earnest", |b| {
        b.iter_with_setup(
            || setup_listed(1),
            |(mut engine, _registry, mut ledger, deeds)| {
                engine
                    .deposit_earnest(&mut ledger, addr(4), deeds[0], EARNEST)
                    .unwrap();
            },
        );
    });
}

fn bench_finalize_sale(c: &mut Criterion) {
    c.bench_function("escrow/finalize_sale", |b| {
        b.iter_with_setup(
            || {
                let (mut engine, registry, mut ledger, deeds) = setup_listed(1);
                let deed = deeds[0];
                engine
                    .deposit_earnest(&mut ledger, addr(4), deed, PRICE)
                    .unwrap();
                engine.update_inspection_status(addr(2), deed, true).unwrap();
                for party in [addr(4), addr(1), addr(3)] {
                    engine.approve_sale(party, deed).unwrap();
                }
                (engine, registry, ledger, deed)
            },
            |(mut engine, mut registry, mut ledger, deed)| {
                engine
                    .finalize_sale(&mut registry, &mut ledger, addr(1), deed)
                    .unwrap();
            },
        );
    });
}

fn bench_full_sale(c: &mut Criterion) {
    c.bench_function("escrow/full_sale", |b| {
        b.iter_with_setup(
            setup_unlisted,
            |(mut engine, mut registry, mut ledger, deed)| {
                let (seller, inspector, lender, buyer) = (addr(1), addr(2), addr(3), addr(4));
                engine
                    .list(&mut registry, seller, deed, buyer, PRICE, EARNEST)
                    .unwrap();
                engine
                    .deposit_earnest(&mut ledger, buyer, deed, EARNEST)
                    .unwrap();
                engine
                    .fund_sale(&mut ledger, lender, deed, PRICE - EARNEST)
                    .unwrap();
                engine
                    .update_inspection_status(inspector, deed, true)
                    .unwrap();
                for party in [buyer, seller, lender] {
                    engine.approve_sale(party, deed).unwrap();
                }
                engine
                    .finalize_sale(&mut registry, &mut ledger, seller, deed)
                    .unwrap();
            },
        );
    });
}

fn bench_total_escrowed(c: &mut Criterion) {
    let mut group = c.benchmark_group("escrow/total_escrowed");

    for listings in [10, 100, 1000] {
        group.throughput(Throughput::Elements(listings as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(listings),
            &listings,
            |b, &n| {
                let (mut engine, _registry, mut ledger, deeds) = setup_listed(n);
                for deed in &deeds {
                    engine
                        .deposit_earnest(&mut ledger, addr(4), *deed, EARNEST)
                        .unwrap();
                }
                b.iter(|| engine.total_escrowed());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_deposit_earnest,
    bench_finalize_sale,
    bench_full_sale,
    bench_total_escrowed,
);
criterion_main!(benches);
