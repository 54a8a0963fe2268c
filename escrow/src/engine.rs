//! # Escrow Engine
//!
//! Drives a conditional deed sale between four parties. The lifecycle is:
//!
//! 1. **List** — the seller lists a deed, naming the buyer, the purchase
//!    price, and the earnest minimum; the deed moves into engine custody.
//! 2. **Deposit** — the buyer places earnest money at or above the minimum;
//!    the lender (or anyone else) tops the sale up toward the price.
//! 3. **Inspect** — the inspector files the property report; a failing
//!    report blocks closing until a passing one replaces it.
//! 4. **Approve** — buyer, seller, and lender each sign off.
//! 5. **Finalize** — the seller closes: deed to the buyer, price to the
//!    seller, any excess back to the buyer, all in one step.
//!
//! A sale that falls through is cancelled instead: the held funds settle
//! by the inspection outcome and the deed returns to the seller.
//!
//! ## Custody Model
//!
//! Deed and funds stay on the engine's own address between listing and
//! settlement. Sale funds are partitioned per deed: each record tracks the
//! amount deposited toward it, and payouts draw only on that amount.
//! Operations validate fully before mutating, flip the sale record before
//! moving money out, and pre-check the external transfers so a record can
//! never reach a terminal status with a payout left hanging.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::identity::{Address, Role, Roles};
use crate::ledger::{AccountLedger, LedgerError};
use crate::registry::{DeedId, DeedRegistry, RegistryError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller does not hold the role this operation requires.
    #[error("unauthorized: {caller:?} is not the {required}")]
    Unauthorized {
        /// The account that attempted the operation.
        caller: Address,
        /// The role the operation requires.
        required: &'static str,
    },

    /// The deed already has an active listing.
    #[error("deed {0} is already listed for sale")]
    AlreadyListed(DeedId),

    /// The deed has no active listing. Terminal records reject operations
    /// the same way absent ones do.
    #[error("deed {0} is not listed for sale")]
    NotListed(DeedId),

    /// An earnest deposit fell short of the listing's minimum.
    #[error("insufficient deposit: offered {offered}, listing requires at least {minimum}")]
    InsufficientDeposit {
        /// The amount the buyer offered.
        offered: u64,
        /// The listing's earnest minimum.
        minimum: u64,
    },

    /// One or more closing conditions are unmet.
    #[error("finalization blocked: {}", blockers_summary(.blockers))]
    FinalizationBlocked {
        /// Every condition still unmet, in evaluation order.
        blockers: Vec<Blocker>,
    },

    /// A contribution would push the sale's held funds past `u64::MAX`.
    #[error("amount overflow: sale funds would exceed representable limits")]
    AmountOverflow,

    /// A deed registry operation rejected the request.
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    /// A ledger operation rejected the request.
    #[error("funds: {0}")]
    Funds(#[from] LedgerError),
}

/// A single unmet closing condition.
///
/// [`EscrowEngine::finalize_sale`] collects every blocker it finds, so a
/// blocked closing can be repaired in one round instead of retry by retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blocker {
    /// The inspector has not recorded a passing inspection.
    InspectionNotPassed,
    /// A required party has not signed off yet.
    MissingApproval(Role),
    /// The funds held for the sale do not cover the purchase price.
    InsufficientEscrow {
        /// Funds currently held for this sale.
        held: u64,
        /// The purchase price they must cover.
        required: u64,
    },
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::InspectionNotPassed => write!(f, "inspection has not passed"),
            Blocker::MissingApproval(role) => write!(f, "{} has not approved", role),
            Blocker::InsufficientEscrow { held, required } => write!(
                f,
                "escrowed funds {} do not cover the purchase price {}",
                held, required
            ),
        }
    }
}

/// Joins blockers into one line for [`EngineError::FinalizationBlocked`].
fn blockers_summary(blockers: &[Blocker]) -> String {
    blockers
        .iter()
        .map(|blocker| blocker.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The lifecycle status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleStatus {
    /// No sale record exists for the deed. Never stored on a record;
    /// returned by status queries only.
    Unlisted,
    /// Listed and open. The engine holds the deed in custody.
    Listed,
    /// Closed successfully. Deed with the buyer, proceeds with the seller.
    Finalized,
    /// Called off. Funds were settled per the inspection outcome.
    Cancelled,
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleStatus::Unlisted => write!(f, "Unlisted"),
            SaleStatus::Listed => write!(f, "Listed"),
            SaleStatus::Finalized => write!(f, "Finalized"),
            SaleStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// The engine's record for a single sale.
///
/// Created by [`EscrowEngine::list`] and kept on the books after the sale
/// reaches a terminal status, so closed and cancelled sales stay
/// inspectable. Relisting the same deed replaces the terminal record with
/// a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// The deed being sold.
    pub deed: DeedId,
    /// The account allowed to deposit earnest money and receive the deed.
    pub buyer: Address,
    /// Price the held funds must reach before the sale can close.
    pub purchase_price: u64,
    /// Minimum earnest deposit the buyer must place.
    pub escrow_amount: u64,
    /// Funds held for this sale. Payouts never draw on any other sale.
    pub escrowed: u64,
    /// Latest inspection outcome. `false` until the inspector passes the
    /// property; a later failing report overwrites a passing one.
    pub inspection_passed: bool,
    /// Closing sign-offs recorded so far, keyed by approver.
    #[serde(with = "crate::identity::address_map")]
    pub approvals: HashMap<Address, bool>,
    /// Current lifecycle status.
    pub status: SaleStatus,
    /// Timestamp when the deed was listed.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent state change.
    pub updated_at: DateTime<Utc>,
}

/// Receipt produced by a successful finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingStatement {
    /// Unique reference for this closing.
    pub reference: Uuid,
    /// The deed that changed hands.
    pub deed: DeedId,
    /// The buyer who took ownership.
    pub buyer: Address,
    /// Amount paid to the seller. Always exactly the purchase price.
    pub seller_proceeds: u64,
    /// Held funds beyond the purchase price, returned to the buyer.
    pub buyer_refund: u64,
    /// When the sale closed (UTC).
    pub closed_at: DateTime<Utc>,
}

/// Receipt produced by a cancelled sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationReceipt {
    /// Unique reference for this cancellation.
    pub reference: Uuid,
    /// The deed whose sale was called off.
    pub deed: DeedId,
    /// Account that received the held funds.
    pub payout_to: Address,
    /// Amount paid out. Zero when nothing was held.
    pub amount: u64,
    /// Account the deed was returned to. Always the seller.
    pub deed_returned_to: Address,
    /// When the sale was cancelled (UTC).
    pub cancelled_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The conditional-sale escrow engine.
///
/// Holds listed deeds and sale funds in custody under its own address and
/// releases both only when the closing conditions are met. One engine
/// serves one deployment: seller, inspector, and lender are fixed at
/// construction, while each listing names its own buyer.
///
/// The engine owns the sale records but not the deed registry or the
/// ledger; both collaborators are passed into each operation that touches
/// them. Exclusive access to all three during a call is what keeps every
/// transition atomic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEngine {
    /// The engine's own account. Owns deeds and funds while in custody.
    address: Address,
    /// Fixed role assignments for this deployment.
    roles: Roles,
    /// Sale records keyed by deed, terminal records included.
    sales: HashMap<DeedId, SaleRecord>,
}

impl EscrowEngine {
    /// Creates an engine with no sales on its books.
    pub fn new(address: Address, roles: Roles) -> Self {
        Self {
            address,
            roles,
            sales: HashMap::new(),
        }
    }

    /// The engine's own account address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The deployment's fixed role assignments.
    pub fn roles(&self) -> Roles {
        self.roles
    }

    /// The active sale record for `deed`. Terminal and absent records both
    /// report [`EngineError::NotListed`].
    fn active_record(&self, deed: DeedId) -> Result<&SaleRecord, EngineError> {
        match self.sales.get(&deed) {
            Some(record) if record.status == SaleStatus::Listed => Ok(record),
            _ => Err(EngineError::NotListed(deed)),
        }
    }

    fn active_record_mut(&mut self, deed: DeedId) -> Result<&mut SaleRecord, EngineError> {
        match self.sales.get_mut(&deed) {
            Some(record) if record.status == SaleStatus::Listed => Ok(record),
            _ => Err(EngineError::NotListed(deed)),
        }
    }

    /// Moves `amount` from `from` into the sale's held funds.
    ///
    /// The overflow check runs before the ledger transfer, and the record
    /// update after it cannot fail, so the two books move together or not
    /// at all.
    fn stage_funds(
        &mut self,
        ledger: &mut AccountLedger,
        deed: DeedId,
        from: Address,
        amount: u64,
    ) -> Result<u64, EngineError> {
        let engine = self.address;
        let record = self.active_record_mut(deed)?;

        let new_escrowed = record
            .escrowed
            .checked_add(amount)
            .ok_or(EngineError::AmountOverflow)?;

        ledger.transfer(from, engine, amount)?;

        record.escrowed = new_escrowed;
        record.updated_at = Utc::now();
        Ok(new_escrowed)
    }

    // -- operations ---------------------------------------------------------

    /// Lists a deed for sale and takes it into engine custody.
    ///
    /// Only the seller may list. The deed must be owned by the seller and
    /// have its transfer pre-approved to the engine; custody moves as part
    /// of this call. Relisting is allowed once a previous sale has reached
    /// a terminal status, and starts from a clean record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] if the caller is not the
    /// seller, [`EngineError::AlreadyListed`] if the deed has an active
    /// listing, and [`EngineError::Registry`] if the deed is missing, not
    /// the seller's, or not approved for engine transfer.
    pub fn list(
        &mut self,
        registry: &mut DeedRegistry,
        caller: Address,
        deed: DeedId,
        buyer: Address,
        purchase_price: u64,
        escrow_amount: u64,
    ) -> Result<(), EngineError> {
        if caller != self.roles.seller {
            return Err(EngineError::Unauthorized {
                caller,
                required: "seller",
            });
        }
        if matches!(self.sales.get(&deed), Some(record) if record.status == SaleStatus::Listed) {
            return Err(EngineError::AlreadyListed(deed));
        }

        let owner = registry.owner_of(deed)?;
        if owner != caller {
            return Err(EngineError::Registry(RegistryError::OwnerMismatch {
                deed,
                expected: caller,
                actual: owner,
            }));
        }
        if !registry.is_approved_or_owner(self.address, deed)? {
            return Err(EngineError::Registry(RegistryError::NotAuthorized {
                caller: self.address,
                deed,
            }));
        }

        // Custody first. The record insert below cannot fail, so a deed is
        // never on the books without being on the engine's address.
        registry.transfer_from(self.address, caller, self.address, deed)?;

        let now = Utc::now();
        self.sales.insert(
            deed,
            SaleRecord {
                deed,
                buyer,
                purchase_price,
                escrow_amount,
                escrowed: 0,
                inspection_passed: false,
                approvals: HashMap::new(),
                status: SaleStatus::Listed,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    /// Records the buyer's earnest deposit toward a listed sale.
    ///
    /// Any amount at or above the listing's minimum is accepted, including
    /// amounts beyond the purchase price. Only the listing's named buyer
    /// may deposit.
    ///
    /// Returns the sale's total held funds after the deposit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotListed`] if the deed has no active sale,
    /// [`EngineError::Unauthorized`] for any caller but the buyer,
    /// [`EngineError::InsufficientDeposit`] below the minimum, and
    /// [`EngineError::Funds`] if the buyer's balance cannot cover it.
    pub fn deposit_earnest(
        &mut self,
        ledger: &mut AccountLedger,
        caller: Address,
        deed: DeedId,
        amount: u64,
    ) -> Result<u64, EngineError> {
        let record = self.active_record(deed)?;
        if caller != record.buyer {
            return Err(EngineError::Unauthorized {
                caller,
                required: "buyer",
            });
        }
        if amount < record.escrow_amount {
            return Err(EngineError::InsufficientDeposit {
                offered: amount,
                minimum: record.escrow_amount,
            });
        }

        self.stage_funds(ledger, deed, caller, amount)
    }

    /// Adds funds toward a sale's purchase price.
    ///
    /// Any account may contribute; in the ordinary flow the lender covers
    /// the gap between the earnest deposit and the purchase price.
    ///
    /// Returns the sale's total held funds after the contribution.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotListed`] if the deed has no active sale
    /// and [`EngineError::Funds`] if the contributor cannot cover it.
    pub fn fund_sale(
        &mut self,
        ledger: &mut AccountLedger,
        caller: Address,
        deed: DeedId,
        amount: u64,
    ) -> Result<u64, EngineError> {
        self.stage_funds(ledger, deed, caller, amount)
    }

    /// Records the inspector's report for a listed sale.
    ///
    /// Last write wins: a failing report filed after a passing one stands,
    /// and closing is blocked again until a new passing report lands.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotListed`] if the deed has no active sale
    /// and [`EngineError::Unauthorized`] for any caller but the inspector.
    pub fn update_inspection_status(
        &mut self,
        caller: Address,
        deed: DeedId,
        passed: bool,
    ) -> Result<(), EngineError> {
        let inspector = self.roles.inspector;
        let record = self.active_record_mut(deed)?;
        if caller != inspector {
            return Err(EngineError::Unauthorized {
                caller,
                required: "inspector",
            });
        }

        record.inspection_passed = passed;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Records the caller's closing sign-off on a listed sale.
    ///
    /// Only the sale's principals may approve: the listing's buyer, the
    /// seller, and the lender. Each party writes its own flag, and
    /// approving twice is a harmless no-op. The inspector influences
    /// closing through the inspection report, not through an approval.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotListed`] if the deed has no active sale
    /// and [`EngineError::Unauthorized`] for callers outside the sale.
    pub fn approve_sale(&mut self, caller: Address, deed: DeedId) -> Result<(), EngineError> {
        let roles = self.roles;
        let record = self.active_record_mut(deed)?;
        if caller != record.buyer && caller != roles.seller && caller != roles.lender {
            return Err(EngineError::Unauthorized {
                caller,
                required: "buyer, seller, or lender",
            });
        }

        record.approvals.insert(caller, true);
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Closes a listed sale, swapping deed and funds in one step.
    ///
    /// Requires a passing inspection, sign-offs from buyer, seller, and
    /// lender, and held funds covering the purchase price. On success the
    /// deed transfers to the buyer, the seller receives exactly the
    /// purchase price, and any held funds beyond it return to the buyer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] if the caller is not the
    /// seller, [`EngineError::NotListed`] if the deed has no active sale,
    /// and [`EngineError::FinalizationBlocked`] naming every unmet closing
    /// condition at once.
    pub fn finalize_sale(
        &mut self,
        registry: &mut DeedRegistry,
        ledger: &mut AccountLedger,
        caller: Address,
        deed: DeedId,
    ) -> Result<ClosingStatement, EngineError> {
        if caller != self.roles.seller {
            return Err(EngineError::Unauthorized {
                caller,
                required: "seller",
            });
        }

        let engine = self.address;
        let roles = self.roles;
        let record = self.active_record(deed)?;
        let buyer = record.buyer;
        let purchase_price = record.purchase_price;
        let escrowed = record.escrowed;

        let mut blockers = Vec::new();
        if !record.inspection_passed {
            blockers.push(Blocker::InspectionNotPassed);
        }
        for (role, party) in [
            (Role::Buyer, buyer),
            (Role::Seller, roles.seller),
            (Role::Lender, roles.lender),
        ] {
            if !record.approvals.get(&party).copied().unwrap_or(false) {
                blockers.push(Blocker::MissingApproval(role));
            }
        }
        if escrowed < purchase_price {
            blockers.push(Blocker::InsufficientEscrow {
                held: escrowed,
                required: purchase_price,
            });
        }
        if !blockers.is_empty() {
            return Err(EngineError::FinalizationBlocked { blockers });
        }

        let buyer_refund = escrowed - purchase_price;

        // Pre-flight both external books so that nothing can fail once the
        // record flips to Finalized.
        let owner = registry.owner_of(deed)?;
        if owner != engine {
            return Err(EngineError::Registry(RegistryError::OwnerMismatch {
                deed,
                expected: engine,
                actual: owner,
            }));
        }
        let engine_balance = ledger.balance_of(engine);
        if engine_balance < escrowed {
            return Err(EngineError::Funds(LedgerError::InsufficientFunds {
                account: engine,
                available: engine_balance,
                requested: escrowed,
            }));
        }
        for destination in [roles.seller, buyer] {
            if destination == engine {
                continue;
            }
            let current = ledger.balance_of(destination);
            if current.checked_add(escrowed).is_none() {
                return Err(EngineError::Funds(LedgerError::Overflow {
                    account: destination,
                    current,
                    credit: escrowed,
                }));
            }
        }

        let now = Utc::now();
        let record = self.active_record_mut(deed)?;
        record.status = SaleStatus::Finalized;
        record.escrowed = 0;
        record.updated_at = now;

        if purchase_price > 0 {
            ledger.transfer(engine, roles.seller, purchase_price)?;
        }
        if buyer_refund > 0 {
            ledger.transfer(engine, buyer, buyer_refund)?;
        }
        registry.transfer_from(engine, engine, buyer, deed)?;

        Ok(ClosingStatement {
            reference: Uuid::new_v4(),
            deed,
            buyer,
            seller_proceeds: purchase_price,
            buyer_refund,
            closed_at: now,
        })
    }

    /// Calls off a listed sale and settles its funds.
    ///
    /// Either principal may cancel: the buyer walking away or the seller
    /// withdrawing the listing. Settlement follows the inspection outcome.
    /// While the inspection has not passed, the held funds go back to the
    /// buyer; once it has passed, the buyer is walking away from a sound
    /// property and forfeits the held funds to the seller. The deed leaves
    /// custody and returns to the seller either way.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotListed`] if the deed has no active sale
    /// and [`EngineError::Unauthorized`] for callers that are neither the
    /// sale's buyer nor the seller.
    pub fn cancel_sale(
        &mut self,
        registry: &mut DeedRegistry,
        ledger: &mut AccountLedger,
        caller: Address,
        deed: DeedId,
    ) -> Result<CancellationReceipt, EngineError> {
        let engine = self.address;
        let roles = self.roles;
        let record = self.active_record(deed)?;
        if caller != record.buyer && caller != roles.seller {
            return Err(EngineError::Unauthorized {
                caller,
                required: "buyer or seller",
            });
        }

        let amount = record.escrowed;
        let payout_to = if record.inspection_passed {
            roles.seller
        } else {
            record.buyer
        };

        // Same pre-flight discipline as finalize_sale.
        let owner = registry.owner_of(deed)?;
        if owner != engine {
            return Err(EngineError::Registry(RegistryError::OwnerMismatch {
                deed,
                expected: engine,
                actual: owner,
            }));
        }
        let engine_balance = ledger.balance_of(engine);
        if engine_balance < amount {
            return Err(EngineError::Funds(LedgerError::InsufficientFunds {
                account: engine,
                available: engine_balance,
                requested: amount,
            }));
        }
        if payout_to != engine {
            let current = ledger.balance_of(payout_to);
            if current.checked_add(amount).is_none() {
                return Err(EngineError::Funds(LedgerError::Overflow {
                    account: payout_to,
                    current,
                    credit: amount,
                }));
            }
        }

        let now = Utc::now();
        let record = self.active_record_mut(deed)?;
        record.status = SaleStatus::Cancelled;
        record.escrowed = 0;
        record.updated_at = now;

        if amount > 0 {
            ledger.transfer(engine, payout_to, amount)?;
        }
        registry.transfer_from(engine, engine, roles.seller, deed)?;

        Ok(CancellationReceipt {
            reference: Uuid::new_v4(),
            deed,
            payout_to,
            amount,
            deed_returned_to: roles.seller,
            cancelled_at: now,
        })
    }

    // -- queries ------------------------------------------------------------

    /// The lifecycle status of `deed`'s sale. Deeds with no record are
    /// [`SaleStatus::Unlisted`].
    pub fn status(&self, deed: DeedId) -> SaleStatus {
        self.sales
            .get(&deed)
            .map(|record| record.status)
            .unwrap_or(SaleStatus::Unlisted)
    }

    /// The full sale record for `deed`, terminal records included.
    pub fn sale(&self, deed: DeedId) -> Option<&SaleRecord> {
        self.sales.get(&deed)
    }

    /// Whether `deed` currently has an active listing.
    pub fn is_listed(&self, deed: DeedId) -> bool {
        self.status(deed) == SaleStatus::Listed
    }

    /// The buyer named by `deed`'s active listing.
    pub fn buyer(&self, deed: DeedId) -> Option<Address> {
        self.active_record(deed).ok().map(|record| record.buyer)
    }

    /// The purchase price of `deed`'s active listing.
    pub fn purchase_price(&self, deed: DeedId) -> Option<u64> {
        self.active_record(deed)
            .ok()
            .map(|record| record.purchase_price)
    }

    /// The earnest minimum of `deed`'s active listing.
    pub fn escrow_amount(&self, deed: DeedId) -> Option<u64> {
        self.active_record(deed)
            .ok()
            .map(|record| record.escrow_amount)
    }

    /// Whether the latest inspection for `deed`'s active listing passed.
    pub fn inspection_passed(&self, deed: DeedId) -> bool {
        self.active_record(deed)
            .map(|record| record.inspection_passed)
            .unwrap_or(false)
    }

    /// Whether `party` has signed off on `deed`'s active sale.
    pub fn approval(&self, deed: DeedId, party: Address) -> bool {
        self.active_record(deed)
            .ok()
            .and_then(|record| record.approvals.get(&party).copied())
            .unwrap_or(false)
    }

    /// Funds held for `deed`'s sale. Terminal and unlisted deeds hold 0.
    pub fn escrow_balance(&self, deed: DeedId) -> u64 {
        self.sales
            .get(&deed)
            .map(|record| record.escrowed)
            .unwrap_or(0)
    }

    /// Funds held across every sale on the books.
    ///
    /// Terminal records hold nothing, so whenever funds only move through
    /// engine operations this equals the engine's ledger balance.
    pub fn total_escrowed(&self) -> u64 {
        self.sales.values().map(|record| record.escrowed).sum()
    }

    /// Every sale record on the books, keyed by deed.
    pub fn sales(&self) -> &HashMap<DeedId, SaleRecord> {
        &self.sales
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
