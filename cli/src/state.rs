//! # Deployment State
//!
//! Persistence for the escrow deployment: the engine, the deed registry,
//! and the account ledger serialize together into one JSON file between
//! invocations. Writes go through a temp file and a rename so that an
//! interrupted save never truncates the previous state.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escritura_escrow::engine::EscrowEngine;
use escritura_escrow::identity::{Address, Roles};
use escritura_escrow::ledger::AccountLedger;
use escritura_escrow::registry::DeedRegistry;

/// Derives a stable devnet address from a human-readable label.
///
/// The label is hashed once to stand in for a public key, which the
/// address derivation then hashes again. `alice` resolves to the same
/// address on every machine without any key material on disk.
pub fn devnet_address(label: &str) -> Address {
    Address::from_public_key(blake3::hash(label.as_bytes()).as_bytes())
}

/// Resolves a label outside any deployment: a 64-character string parses
/// as a hex address, anything else derives a devnet address.
pub fn parse_account(label: &str) -> Result<Address> {
    if label.len() == 64 {
        return Address::from_hex(label)
            .with_context(|| format!("invalid hex address: {}", label));
    }
    Ok(devnet_address(label))
}

/// The whole deployment as persisted between invocations.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentState {
    pub engine: EscrowEngine,
    pub registry: DeedRegistry,
    pub ledger: AccountLedger,
    pub saved_at: DateTime<Utc>,
}

impl DeploymentState {
    /// Builds a fresh deployment around a new engine account.
    pub fn new(roles: Roles) -> Self {
        Self {
            engine: EscrowEngine::new(devnet_address("engine"), roles),
            registry: DeedRegistry::new(),
            ledger: AccountLedger::new(),
            saved_at: Utc::now(),
        }
    }

    /// Loads the deployment from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read state file: {}", path.display()))?;
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("state file is not valid JSON: {}", path.display()))?;
        Ok(state)
    }

    /// Saves the deployment to `path`, replacing it atomically.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Utc::now();
        let raw = serde_json::to_string_pretty(self).context("failed to serialize state")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .with_context(|| format!("failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to move state file into place: {}", path.display()))?;
        Ok(())
    }

    /// Resolves an account argument against this deployment.
    ///
    /// Role names (`seller`, `inspector`, `lender`, `engine`) resolve to
    /// the deployment's own addresses; everything else goes through
    /// [`parse_account`].
    pub fn resolve_account(&self, label: &str) -> Result<Address> {
        let roles = self.engine.roles();
        match label {
            "seller" => Ok(roles.seller),
            "inspector" => Ok(roles.inspector),
            "lender" => Ok(roles.lender),
            "engine" => Ok(self.engine.address()),
            other => parse_account(other),
        }
    }
}
