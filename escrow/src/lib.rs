// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escritura Escrow
//!
//! Conditional escrow for tokenized property deed sales. A seller lists a
//! deed, a buyer places earnest money, an inspector files a report, and the
//! sale closes only once the buyer, seller, and lender have all signed off.
//! Until then every asset and every unit of sale funds stays under engine
//! custody:
//!
//! - **Identity**: 32-byte account addresses and the fixed role
//!   assignments (seller, inspector, lender) of a deployment.
//! - **Deed Registry**: ownership records for tokenized deeds, with
//!   per-deed transfer approvals in the style of a token registry.
//! - **Account Ledger**: single-currency balances used to move earnest
//!   money and lender funds in and out of escrow.
//! - **Escrow Engine**: the sale state machine, from listing through
//!   finalization or cancellation.
//!
//! ## Design Principles
//!
//! 1. All balance math is checked: `checked_add` and `checked_sub` guard
//!    every credit and debit, because wrapping arithmetic and money do not
//!    mix.
//! 2. Validate first, mutate second: an operation that fails leaves both the
//!    registry and the ledger exactly as it found them.
//! 3. Escrowed funds are partitioned per sale. A sale can only ever pay out
//!    what was deposited toward that sale.
//! 4. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod engine;
pub mod identity;
pub mod ledger;
pub mod registry;
