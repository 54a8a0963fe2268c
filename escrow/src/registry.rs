//! # Deed Registry
//!
//! Ownership records for tokenized property deeds. Each deed is a
//! non-fungible record carrying an owner, a metadata URI pointing at the
//! property file, and an optional per-deed transfer approval.
//!
//! ## Transfer Model
//!
//! - **Sequential identifiers**: deeds are numbered from 1 in mint order.
//!   Deed 0 never exists.
//! - **Single-operator approval**: an owner may authorize one operator to
//!   transfer a specific deed on their behalf. Granting a new approval
//!   replaces the previous one.
//! - **Approvals do not survive transfer**: every ownership change clears
//!   the deed's approval, so delegated authority never outlives the
//!   custody it was granted under. The escrow engine depends on this when
//!   it takes a listed deed into custody.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during deed registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The referenced deed has never been minted.
    #[error("unknown deed: {0}")]
    UnknownDeed(DeedId),

    /// The caller is neither the deed's owner nor its approved operator.
    #[error("not authorized: {caller:?} may not act on deed {deed}")]
    NotAuthorized {
        /// The account that attempted the operation.
        caller: Address,
        /// The deed it tried to operate on.
        deed: DeedId,
    },

    /// The stated current owner does not match the record.
    #[error("owner mismatch for deed {deed}: expected {expected:?}, found {actual:?}")]
    OwnerMismatch {
        /// The deed whose ownership was asserted.
        deed: DeedId,
        /// The owner the caller asserted.
        expected: Address,
        /// The owner on record.
        actual: Address,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of a minted deed, assigned sequentially starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeedId(u64);

impl DeedId {
    /// Creates a `DeedId` from its raw numeric value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric identifier.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registry's record for a single deed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeedRecord {
    /// Current owner of the deed.
    pub owner: Address,
    /// URI of the off-ledger property file (survey, title, photographs).
    pub metadata_uri: String,
    /// Operator currently authorized to transfer this deed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<Address>,
    /// When the deed was minted (UTC).
    pub minted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The deed registry — tracks deed ownership and transfer approvals.
///
/// In production this state would live in a dedicated title service. The
/// in-memory representation here backs validation logic, testing, and the
/// devnet CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeedRegistry {
    /// Deed records keyed by identifier.
    deeds: HashMap<DeedId, DeedRecord>,
    /// Identifier assigned to the next mint. Starts at 1.
    next_id: u64,
}

impl DeedRegistry {
    /// Creates a new, empty deed registry.
    pub fn new() -> Self {
        Self {
            deeds: HashMap::new(),
            next_id: 1,
        }
    }

    /// Mints a new deed owned by `owner` and returns its identifier.
    pub fn mint(&mut self, owner: Address, metadata_uri: impl Into<String>) -> DeedId {
        let id = DeedId(self.next_id);
        self.next_id += 1;
        self.deeds.insert(
            id,
            DeedRecord {
                owner,
                metadata_uri: metadata_uri.into(),
                approved: None,
                minted_at: Utc::now(),
            },
        );
        id
    }

    /// Authorizes `operator` to transfer `deed` on the owner's behalf.
    ///
    /// Only the current owner may grant approval. Granting replaces any
    /// previous approval for the deed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDeed`] if the deed does not exist.
    /// Returns [`RegistryError::NotAuthorized`] if `caller` is not the owner.
    pub fn approve(
        &mut self,
        caller: Address,
        operator: Address,
        deed: DeedId,
    ) -> Result<(), RegistryError> {
        let record = self
            .deeds
            .get_mut(&deed)
            .ok_or(RegistryError::UnknownDeed(deed))?;

        if record.owner != caller {
            return Err(RegistryError::NotAuthorized { caller, deed });
        }

        record.approved = Some(operator);
        Ok(())
    }

    /// Transfers `deed` from `from` to `to`, initiated by `caller`.
    ///
    /// `caller` must be the deed's owner or its approved operator, and
    /// `from` must match the owner on record. The deed's approval is
    /// cleared on success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDeed`] if the deed does not exist.
    /// Returns [`RegistryError::OwnerMismatch`] if `from` is not the owner.
    /// Returns [`RegistryError::NotAuthorized`] if `caller` holds neither
    /// ownership nor approval.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        deed: DeedId,
    ) -> Result<(), RegistryError> {
        let record = self
            .deeds
            .get_mut(&deed)
            .ok_or(RegistryError::UnknownDeed(deed))?;

        if record.owner != from {
            return Err(RegistryError::OwnerMismatch {
                deed,
                expected: from,
                actual: record.owner,
            });
        }
        if record.owner != caller && record.approved != Some(caller) {
            return Err(RegistryError::NotAuthorized { caller, deed });
        }

        record.owner = to;
        record.approved = None;
        Ok(())
    }

    /// Returns the current owner of `deed`.
    pub fn owner_of(&self, deed: DeedId) -> Result<Address, RegistryError> {
        self.deeds
            .get(&deed)
            .map(|record| record.owner)
            .ok_or(RegistryError::UnknownDeed(deed))
    }

    /// Returns the operator currently approved for `deed`, if any.
    pub fn approved_operator(&self, deed: DeedId) -> Result<Option<Address>, RegistryError> {
        self.deeds
            .get(&deed)
            .map(|record| record.approved)
            .ok_or(RegistryError::UnknownDeed(deed))
    }

    /// Whether `operator` may transfer `deed`, either as its owner or as
    /// the approved operator.
    pub fn is_approved_or_owner(
        &self,
        operator: Address,
        deed: DeedId,
    ) -> Result<bool, RegistryError> {
        let record = self.deeds.get(&deed).ok_or(RegistryError::UnknownDeed(deed))?;
        Ok(record.owner == operator || record.approved == Some(operator))
    }

    /// Returns the metadata URI recorded for `deed`.
    pub fn metadata_uri(&self, deed: DeedId) -> Result<&str, RegistryError> {
        self.deeds
            .get(&deed)
            .map(|record| record.metadata_uri.as_str())
            .ok_or(RegistryError::UnknownDeed(deed))
    }

    /// Returns the full record for `deed`, or `None` if never minted.
    pub fn get_record(&self, deed: DeedId) -> Option<&DeedRecord> {
        self.deeds.get(&deed)
    }

    /// Returns how many deeds have been minted.
    pub fn total_minted(&self) -> u64 {
        self.next_id - 1
    }

    /// Returns the deeds currently owned by `owner`, in identifier order.
    pub fn deeds_of(&self, owner: Address) -> Vec<DeedId> {
        let mut owned: Vec<DeedId> = self
            .deeds
            .iter()
            .filter(|(_, record)| record.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        owned.sort();
        owned
    }
}

impl Default for DeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> Address {
        Address::from_bytes([tag; 32])
    }

    #[test]
    fn mint_assigns_sequential_ids() {
        let mut registry = DeedRegistry::new();
        let first = registry.mint(addr(1), "ipfs://one");
        let second = registry.mint(addr(1), "ipfs://two");
        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 2);
        assert_eq!(registry.total_minted(), 2);
    }

    #[test]
    fn mint_records_owner_and_uri() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://parcel-42");
        let record = registry.get_record(deed).unwrap();
        assert_eq!(record.owner, addr(1));
        assert_eq!(record.metadata_uri, "ipfs://parcel-42");
        assert!(record.approved.is_none());
        assert_eq!(registry.metadata_uri(deed).unwrap(), "ipfs://parcel-42");
    }

    #[test]
    fn unknown_deed_rejected() {
        let registry = DeedRegistry::new();
        let missing = DeedId::new(9);
        assert!(matches!(
            registry.owner_of(missing),
            Err(RegistryError::UnknownDeed(_))
        ));
        assert!(registry.get_record(missing).is_none());
    }

    #[test]
    fn approve_by_owner_sets_operator() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.approve(addr(1), addr(9), deed).unwrap();
        assert_eq!(registry.approved_operator(deed).unwrap(), Some(addr(9)));
        assert!(registry.is_approved_or_owner(addr(9), deed).unwrap());
    }

    #[test]
    fn approve_by_non_owner_rejected() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        let result = registry.approve(addr(2), addr(9), deed);
        assert!(matches!(result, Err(RegistryError::NotAuthorized { .. })));
    }

    #[test]
    fn approve_replaces_previous_operator() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.approve(addr(1), addr(8), deed).unwrap();
        registry.approve(addr(1), addr(9), deed).unwrap();
        assert_eq!(registry.approved_operator(deed).unwrap(), Some(addr(9)));
        assert!(!registry.is_approved_or_owner(addr(8), deed).unwrap());
    }

    #[test]
    fn owner_transfers_own_deed() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.transfer_from(addr(1), addr(1), addr(2), deed).unwrap();
        assert_eq!(registry.owner_of(deed).unwrap(), addr(2));
    }

    #[test]
    fn approved_operator_transfers_deed() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.approve(addr(1), addr(9), deed).unwrap();
        registry.transfer_from(addr(9), addr(1), addr(2), deed).unwrap();
        assert_eq!(registry.owner_of(deed).unwrap(), addr(2));
    }

    #[test]
    fn transfer_clears_approval() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.approve(addr(1), addr(9), deed).unwrap();
        registry.transfer_from(addr(9), addr(1), addr(2), deed).unwrap();
        assert_eq!(registry.approved_operator(deed).unwrap(), None);
        assert!(!registry.is_approved_or_owner(addr(9), deed).unwrap());
    }

    #[test]
    fn transfer_by_stranger_rejected() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        let result = registry.transfer_from(addr(3), addr(1), addr(3), deed);
        assert!(matches!(result, Err(RegistryError::NotAuthorized { .. })));
        assert_eq!(registry.owner_of(deed).unwrap(), addr(1));
    }

    #[test]
    fn transfer_with_wrong_from_rejected() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        let result = registry.transfer_from(addr(1), addr(2), addr(3), deed);
        match result {
            Err(RegistryError::OwnerMismatch { expected, actual, .. }) => {
                assert_eq!(expected, addr(2));
                assert_eq!(actual, addr(1));
            }
            other => panic!("expected OwnerMismatch, got {:?}", other),
        }
    }

    #[test]
    fn deeds_of_lists_only_owned_in_order() {
        let mut registry = DeedRegistry::new();
        let first = registry.mint(addr(1), "ipfs://a");
        let other = registry.mint(addr(2), "ipfs://b");
        let second = registry.mint(addr(1), "ipfs://c");
        assert_eq!(registry.deeds_of(addr(1)), vec![first, second]);
        assert_eq!(registry.deeds_of(addr(2)), vec![other]);
        assert!(registry.deeds_of(addr(3)).is_empty());
    }

    #[test]
    fn registry_serde_roundtrip() {
        let mut registry = DeedRegistry::new();
        let deed = registry.mint(addr(1), "ipfs://a");
        registry.approve(addr(1), addr(9), deed).unwrap();
        registry.mint(addr(2), "ipfs://b");

        let json = serde_json::to_string(&registry).unwrap();
        let mut recovered: DeedRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.total_minted(), 2);
        assert_eq!(recovered.get_record(deed), registry.get_record(deed));

        // The id sequence continues where the original left off.
        let next = recovered.mint(addr(3), "ipfs://c");
        assert_eq!(next.value(), 3);
    }
}
