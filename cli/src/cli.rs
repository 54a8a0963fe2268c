//! # CLI Interface
//!
//! Defines the command-line argument structure for `escritura` using
//! `clap` derive. One subcommand per escrow operation, plus deployment
//! management (`init`, `seed`, `status`).
//!
//! Account arguments accept a role name (`seller`, `inspector`, `lender`,
//! `engine`), a 64-character hex address, or any other label, which
//! resolves to a deterministic devnet address.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Escritura escrow console.
///
/// Drives a conditional-escrow deployment for tokenized property deeds
/// from the command line. The deployment lives in a JSON state file
/// between invocations; every subcommand loads it, applies one
/// operation, and writes it back.
#[derive(Parser, Debug)]
#[command(
    name = "escritura",
    about = "Conditional escrow console for tokenized property deeds",
    version,
    propagate_version = true
)]
pub struct EscrituraCli {
    /// Path to the deployment state file.
    #[arg(
        long,
        short = 's',
        env = "ESCRITURA_STATE",
        default_value = "escritura-state.json",
        global = true
    )]
    pub state: PathBuf,

    /// Log output format: "pretty" or "json".
    #[arg(
        long,
        env = "ESCRITURA_LOG_FORMAT",
        default_value = "pretty",
        global = true
    )]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the escritura binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a fresh deployment state file with named role accounts.
    Init(InitArgs),
    /// Populate an empty deployment with funded demo listings.
    Seed,
    /// Mint a new deed into the registry.
    Mint(MintArgs),
    /// Authorize an operator to transfer a deed on the owner's behalf.
    Approve(ApproveArgs),
    /// List a deed for sale and move it into engine custody.
    List(ListArgs),
    /// Deposit earnest money toward a listed sale (buyer only).
    Deposit(DepositArgs),
    /// Contribute funds toward a sale's purchase price (any account).
    Fund(FundArgs),
    /// File the inspector's report for a listed sale.
    Inspect(InspectArgs),
    /// Record a party's closing sign-off on a sale.
    ApproveSale(ApproveSaleArgs),
    /// Close a fully-conditioned sale: deed to buyer, price to seller.
    Finalize(FinalizeArgs),
    /// Call off a listed sale and settle its funds.
    Cancel(CancelArgs),
    /// Show one sale or the whole deployment.
    Status(StatusArgs),
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Account for the seller role.
    #[arg(long, default_value = "seller")]
    pub seller: String,

    /// Account for the inspector role.
    #[arg(long, default_value = "inspector")]
    pub inspector: String,

    /// Account for the lender role.
    #[arg(long, default_value = "lender")]
    pub lender: String,

    /// Initial ledger funding, repeatable.
    #[arg(long, value_name = "ACCOUNT=AMOUNT")]
    pub fund: Vec<String>,

    /// Overwrite an existing state file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `mint` subcommand.
#[derive(Parser, Debug)]
pub struct MintArgs {
    /// Account to mint the deed to.
    #[arg(long, default_value = "seller")]
    pub owner: String,

    /// Metadata URI describing the property.
    #[arg(long)]
    pub uri: String,
}

/// Arguments for the `approve` subcommand.
#[derive(Parser, Debug)]
pub struct ApproveArgs {
    /// Deed to approve an operator for.
    pub deed: u64,

    /// Deed owner granting the approval.
    #[arg(long, default_value = "seller")]
    pub caller: String,

    /// Operator to authorize. Defaults to the engine, which is the
    /// approval every listing needs.
    #[arg(long)]
    pub operator: Option<String>,
}

/// Arguments for the `list` subcommand.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Deed to list for sale.
    pub deed: u64,

    /// Account of the intended buyer.
    #[arg(long)]
    pub buyer: String,

    /// Purchase price in ledger units.
    #[arg(long)]
    pub price: u64,

    /// Minimum earnest deposit in ledger units.
    #[arg(long)]
    pub earnest: u64,

    /// Listing account. Must be the seller.
    #[arg(long, default_value = "seller")]
    pub caller: String,
}

/// Arguments for the `deposit` subcommand.
#[derive(Parser, Debug)]
pub struct DepositArgs {
    /// Deed whose sale receives the deposit.
    pub deed: u64,

    /// Depositing account. Must be the sale's buyer.
    #[arg(long)]
    pub caller: String,

    /// Deposit amount in ledger units.
    #[arg(long)]
    pub amount: u64,
}

/// Arguments for the `fund` subcommand.
#[derive(Parser, Debug)]
pub struct FundArgs {
    /// Deed whose sale receives the funds.
    pub deed: u64,

    /// Contributing account, typically the lender.
    #[arg(long)]
    pub caller: String,

    /// Contribution amount in ledger units.
    #[arg(long)]
    pub amount: u64,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Deed the report covers.
    pub deed: u64,

    /// Whether the inspection passed.
    #[arg(long, action = ArgAction::Set)]
    pub passed: bool,

    /// Reporting account. Must be the inspector.
    #[arg(long, default_value = "inspector")]
    pub caller: String,
}

/// Arguments for the `approve-sale` subcommand.
#[derive(Parser, Debug)]
pub struct ApproveSaleArgs {
    /// Deed whose sale is being signed off.
    pub deed: u64,

    /// Signing account: the sale's buyer, the seller, or the lender.
    #[arg(long)]
    pub caller: String,
}

/// Arguments for the `finalize` subcommand.
#[derive(Parser, Debug)]
pub struct FinalizeArgs {
    /// Deed whose sale closes.
    pub deed: u64,

    /// Closing account. Must be the seller.
    #[arg(long, default_value = "seller")]
    pub caller: String,
}

/// Arguments for the `cancel` subcommand.
#[derive(Parser, Debug)]
pub struct CancelArgs {
    /// Deed whose sale is called off.
    pub deed: u64,

    /// Cancelling account: the sale's buyer or the seller.
    #[arg(long)]
    pub caller: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Deed to show. Omit for the whole deployment.
    pub deed: Option<u64>,
}
