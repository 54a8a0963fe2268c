//! Integration tests for deed custody and fund partitioning.
//!
//! The engine holds every listed deed and every escrowed unit on its own
//! address. These tests pin down the custody chain across transfers and
//! prove that concurrent sales never draw on each other's deposits, even
//! though the ledger pools them under a single account.

use escritura_escrow::engine::{Blocker, EngineError, EscrowEngine};
use escritura_escrow::identity::{Address, Roles};
use escritura_escrow::ledger::AccountLedger;
use escritura_escrow::registry::{DeedId, DeedRegistry};

const PRICE: u64 = 1_000_000;
const EARNEST: u64 = 200_000;

/// One listed deed with a funded buyer and lender. Mirrors the fixture
/// in `sale_lifecycle_test`.
struct Deployment {
    engine: EscrowEngine,
    registry: DeedRegistry,
    ledger: AccountLedger,
    deed: DeedId,
    buyer: Address,
    roles: Roles,
}

fn addr(tag: u8) -> Address {
    Address::from_bytes([tag; 32])
}

fn deployment() -> Deployment {
    let roles = Roles {
        seller: addr(1),
        inspector: addr(2),
        lender: addr(3),
    };
    let buyer = addr(4);
    let mut engine = EscrowEngine::new(addr(9), roles);
    let mut registry = DeedRegistry::new();
    let mut ledger = AccountLedger::new();

    ledger.credit(buyer, 2 * PRICE).unwrap();
    ledger.credit(roles.lender, 10 * PRICE).unwrap();

    let deed = registry.mint(roles.seller, "ipfs://deeds/parcel-7.json");
    registry
        .approve(roles.seller, engine.address(), deed)
        .unwrap();
    engine
        .list(&mut registry, roles.seller, deed, buyer, PRICE, EARNEST)
        .unwrap();

    Deployment {
        engine,
        registry,
        ledger,
        deed,
        buyer,
        roles,
    }
}

/// Lists a second deed for a second funded buyer on the same books.
fn second_listing(d: &mut Deployment) -> (DeedId, Address) {
    let buyer = addr(5);
    d.ledger.credit(buyer, 2 * PRICE).unwrap();
    let deed = d.registry.mint(d.roles.seller, "ipfs://deeds/parcel-8.json");
    d.registry
        .approve(d.roles.seller, d.engine.address(), deed)
        .unwrap();
    d.engine
        .list(&mut d.registry, d.roles.seller, deed, buyer, PRICE, EARNEST)
        .unwrap();
    (deed, buyer)
}

/// Drives `deed` to a closeable state with exactly `funded` units held.
/// `funded` must clear the earnest minimum.
fn make_closeable(d: &mut Deployment, deed: DeedId, buyer: Address, funded: u64) {
    d.engine
        .deposit_earnest(&mut d.ledger, buyer, deed, funded)
        .unwrap();
    d.engine
        .update_inspection_status(d.roles.inspector, deed, true)
        .unwrap();
    for party in [buyer, d.roles.seller, d.roles.lender] {
        d.engine.approve_sale(party, deed).unwrap();
    }
}

fn assert_books_balance(d: &Deployment) {
    assert_eq!(
        d.ledger.balance_of(d.engine.address()),
        d.engine.total_escrowed()
    );
}

// ---------------------------------------------------------------------------
// Custody Chain
// ---------------------------------------------------------------------------

#[test]
fn custody_chain_through_a_completed_sale() {
    let mut d = deployment();
    let (deed, buyer) = (d.deed, d.buyer);

    // Listing moved the deed to the engine and consumed the approval.
    assert_eq!(d.registry.owner_of(deed).unwrap(), d.engine.address());
    assert_eq!(d.registry.approved_operator(deed).unwrap(), None);

    make_closeable(&mut d, deed, buyer, PRICE);
    d.engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed)
        .unwrap();

    // Closing handed the deed to the buyer with no lingering operator.
    assert_eq!(d.registry.owner_of(deed).unwrap(), buyer);
    assert_eq!(d.registry.approved_operator(deed).unwrap(), None);
    assert_eq!(d.registry.deeds_of(buyer), vec![deed]);
    assert!(d.registry.deeds_of(d.engine.address()).is_empty());
}

#[test]
fn cancellation_returns_the_deed_to_the_seller() {
    let mut d = deployment();
    let (deed, buyer) = (d.deed, d.buyer);
    assert_eq!(d.registry.owner_of(deed).unwrap(), d.engine.address());

    d.engine
        .cancel_sale(&mut d.registry, &mut d.ledger, buyer, deed)
        .unwrap();

    assert_eq!(d.registry.owner_of(deed).unwrap(), d.roles.seller);
    assert_eq!(d.registry.approved_operator(deed).unwrap(), None);
    assert_eq!(d.registry.deeds_of(d.roles.seller), vec![deed]);
}

// ---------------------------------------------------------------------------
// Fund Partitioning
// ---------------------------------------------------------------------------

#[test]
fn sales_cannot_draw_on_each_others_funds() {
    let mut d = deployment();
    let (deed_a, buyer_a) = (d.deed, d.buyer);
    let (deed_b, buyer_b) = second_listing(&mut d);

    // Sale A is short; sale B is fully funded. The pooled engine account
    // holds enough for either, but only B's own sub-balance covers B.
    let partial = 300_000;
    make_closeable(&mut d, deed_a, buyer_a, partial);
    make_closeable(&mut d, deed_b, buyer_b, PRICE);
    assert_eq!(d.ledger.balance_of(d.engine.address()), partial + PRICE);

    let result = d
        .engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed_a);
    match result {
        Err(EngineError::FinalizationBlocked { blockers }) => {
            assert_eq!(
                blockers,
                vec![Blocker::InsufficientEscrow {
                    held: partial,
                    required: PRICE,
                }]
            );
        }
        other => panic!("expected FinalizationBlocked, got {:?}", other),
    }

    // B closes on its own funds alone.
    let statement = d
        .engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed_b)
        .unwrap();
    assert_eq!(statement.seller_proceeds, PRICE);
    assert_eq!(d.ledger.balance_of(d.engine.address()), partial);
    assert_eq!(d.engine.escrow_balance(deed_a), partial);

    // A settles under its own terms: inspection passed, so the walkaway
    // forfeits A's funds to the seller.
    let receipt = d
        .engine
        .cancel_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed_a)
        .unwrap();
    assert_eq!(receipt.payout_to, d.roles.seller);
    assert_eq!(receipt.amount, partial);
    assert_eq!(d.ledger.balance_of(d.roles.seller), PRICE + partial);
    assert_eq!(d.ledger.balance_of(d.engine.address()), 0);
    assert_eq!(d.registry.owner_of(deed_a).unwrap(), d.roles.seller);
}

#[test]
fn cancellation_settles_only_its_own_sale() {
    let mut d = deployment();
    let (deed_a, buyer_a) = (d.deed, d.buyer);
    let (deed_b, buyer_b) = second_listing(&mut d);

    d.engine
        .deposit_earnest(&mut d.ledger, buyer_a, deed_a, EARNEST)
        .unwrap();
    d.engine
        .deposit_earnest(&mut d.ledger, buyer_b, deed_b, 2 * EARNEST)
        .unwrap();

    d.engine
        .cancel_sale(&mut d.registry, &mut d.ledger, buyer_a, deed_a)
        .unwrap();

    // Only A's deposit left the engine account.
    assert_eq!(d.ledger.balance_of(buyer_a), 2 * PRICE);
    assert_eq!(d.ledger.balance_of(d.engine.address()), 2 * EARNEST);
    assert_eq!(d.engine.escrow_balance(deed_b), 2 * EARNEST);
    assert!(d.engine.is_listed(deed_b));
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[test]
fn escrowed_totals_track_the_engine_account_exactly() {
    let mut d = deployment();
    let (deed_a, buyer_a) = (d.deed, d.buyer);
    let (deed_b, buyer_b) = second_listing(&mut d);
    let circulation = d.ledger.total_in_circulation();
    assert_books_balance(&d);

    d.engine
        .deposit_earnest(&mut d.ledger, buyer_a, deed_a, EARNEST)
        .unwrap();
    assert_books_balance(&d);

    d.engine
        .fund_sale(&mut d.ledger, d.roles.lender, deed_a, PRICE - EARNEST)
        .unwrap();
    assert_books_balance(&d);

    d.engine
        .deposit_earnest(&mut d.ledger, buyer_b, deed_b, EARNEST)
        .unwrap();
    assert_books_balance(&d);

    d.engine
        .update_inspection_status(d.roles.inspector, deed_a, true)
        .unwrap();
    for party in [buyer_a, d.roles.seller, d.roles.lender] {
        d.engine.approve_sale(party, deed_a).unwrap();
    }
    d.engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed_a)
        .unwrap();
    assert_books_balance(&d);

    d.engine
        .cancel_sale(&mut d.registry, &mut d.ledger, buyer_b, deed_b)
        .unwrap();
    assert_books_balance(&d);

    // Escrow moves money around; it never mints or burns it.
    assert_eq!(d.ledger.total_in_circulation(), circulation);
}

#[test]
fn closing_returns_funds_beyond_the_price_to_the_buyer() {
    let mut d = deployment();
    let (deed, buyer) = (d.deed, d.buyer);

    // Earnest plus a full lender draw overshoots the price by EARNEST.
    d.engine
        .deposit_earnest(&mut d.ledger, buyer, deed, EARNEST)
        .unwrap();
    d.engine
        .fund_sale(&mut d.ledger, d.roles.lender, deed, PRICE)
        .unwrap();
    d.engine
        .update_inspection_status(d.roles.inspector, deed, true)
        .unwrap();
    for party in [buyer, d.roles.seller, d.roles.lender] {
        d.engine.approve_sale(party, deed).unwrap();
    }

    let statement = d
        .engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed)
        .unwrap();
    assert_eq!(statement.seller_proceeds, PRICE);
    assert_eq!(statement.buyer_refund, EARNEST);
    assert_eq!(d.ledger.balance_of(d.roles.seller), PRICE);
    assert_eq!(d.ledger.balance_of(buyer), 2 * PRICE);
    assert_eq!(d.ledger.balance_of(d.engine.address()), 0);
}

#[test]
fn failed_operations_leave_the_books_unchanged() {
    let mut d = deployment();
    let (deed, buyer) = (d.deed, d.buyer);
    let pauper = addr(7);

    d.engine
        .deposit_earnest(&mut d.ledger, buyer, deed, EARNEST)
        .unwrap();
    let engine_before = d.ledger.balance_of(d.engine.address());
    let circulation = d.ledger.total_in_circulation();

    // A contributor with no balance cannot stage funds.
    assert!(d.engine.fund_sale(&mut d.ledger, pauper, deed, 1).is_err());
    // A blocked closing moves neither money nor the deed.
    assert!(d
        .engine
        .finalize_sale(&mut d.registry, &mut d.ledger, d.roles.seller, deed)
        .is_err());

    assert_eq!(d.ledger.balance_of(d.engine.address()), engine_before);
    assert_eq!(d.engine.escrow_balance(deed), EARNEST);
    assert_eq!(d.ledger.total_in_circulation(), circulation);
    assert_eq!(d.registry.owner_of(deed).unwrap(), d.engine.address());
    assert!(d.engine.is_listed(deed));
}
