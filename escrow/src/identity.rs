//! # Identity
//!
//! Account addresses and the fixed role assignments of an escrow deployment.
//!
//! An [`Address`] is the BLAKE3 hash of an account's public key. Hashing
//! gives a uniform 32-byte identifier regardless of the underlying key
//! scheme and keeps raw keys off the books. Addresses render as 64-character
//! hex strings.
//!
//! [`Roles`] pins down who may act as seller, inspector, and lender for a
//! deployment. The three assignments are fixed at engine construction and
//! never change. The buyer is not a deployment role: each listing names its
//! own buyer.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 32-byte account address.
///
/// Computed as `BLAKE3(public_key)` for key-backed accounts. The escrow
/// engine itself also holds an address so that deeds and funds in custody
/// have a concrete owner on both books.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Creates an `Address` from raw 32 bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 32-byte address.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives the address owned by a public key.
    ///
    /// Hashes the key bytes with BLAKE3, so the address commits to the key
    /// without exposing it.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(*blake3::hash(public_key).as_bytes())
    }

    /// Returns the hex-encoded address.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded address.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ---------------------------------------------------------------------------
// Serde helper: serialize HashMap<Address, V> with hex-string keys
// ---------------------------------------------------------------------------

/// Serde helper module for serializing/deserializing `HashMap<Address, V>`
/// as a JSON object with hex-encoded string keys.
///
/// JSON requires map keys to be strings, but `Address` wraps `[u8; 32]`
/// which serde would serialize as an array. This module converts keys
/// to/from their hex representation so the map serializes correctly.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct MyStruct {
///     #[serde(with = "crate::identity::address_map")]
///     balances: HashMap<Address, u64>,
/// }
/// ```
pub mod address_map {
    use super::Address;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<V, S>(map: &HashMap<Address, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut ser_map = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            ser_map.serialize_entry(&key.to_hex(), value)?;
        }
        ser_map.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<HashMap<Address, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let string_map: HashMap<String, V> = HashMap::deserialize(deserializer)?;
        string_map
            .into_iter()
            .map(|(key, value)| {
                Address::from_hex(&key)
                    .map(|addr| (addr, value))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A party's function within a sale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Lists deeds, receives proceeds, and signs off on closing.
    Seller,
    /// Named per listing; deposits earnest money and signs off on closing.
    Buyer,
    /// Files the inspection report. Cannot approve a sale.
    Inspector,
    /// Supplies remaining funds and signs off on closing.
    Lender,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Seller => write!(f, "seller"),
            Role::Buyer => write!(f, "buyer"),
            Role::Inspector => write!(f, "inspector"),
            Role::Lender => write!(f, "lender"),
        }
    }
}

/// The fixed role assignments of an escrow deployment.
///
/// Set once when the engine is constructed. There is deliberately no
/// re-assignment operation: swapping out the inspector mid-sale would
/// invalidate every pending report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    /// The only account allowed to list deeds and finalize sales.
    pub seller: Address,
    /// The only account allowed to record inspection results.
    pub inspector: Address,
    /// The account expected to supply funds beyond the earnest deposit.
    pub lender: Address,
}

impl Roles {
    /// Returns the deployment role held by `address`, if any.
    ///
    /// Buyers are named per sale, so this never returns [`Role::Buyer`].
    pub fn role_of(&self, address: &Address) -> Option<Role> {
        if *address == self.seller {
            Some(Role::Seller)
        } else if *address == self.inspector {
            Some(Role::Inspector)
        } else if *address == self.lender {
            Some(Role::Lender)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
