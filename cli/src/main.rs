// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escritura Console
//!
//! Entry point for the `escritura` binary. Parses CLI arguments,
//! initializes logging, loads the deployment state file, applies one
//! escrow operation, and writes the state back.
//!
//! The binary supports one subcommand per escrow operation:
//!
//! - `init`         — create a fresh deployment state file
//! - `seed`         — populate the deployment with demo listings
//! - `mint`         — mint a deed to an owner
//! - `approve`      — authorize a deed operator
//! - `list`         — list a deed for sale
//! - `deposit`      — deposit earnest money
//! - `fund`         — contribute toward the purchase price
//! - `inspect`      — file the inspection report
//! - `approve-sale` — record a closing sign-off
//! - `finalize`     — close a sale
//! - `cancel`       — call off a sale
//! - `status`       — show one sale or the whole deployment

mod cli;
mod logging;
mod state;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;

use escritura_escrow::identity::Roles;
use escritura_escrow::registry::DeedId;

use cli::{Commands, EscrituraCli};
use logging::LogFormat;
use state::DeploymentState;

/// One whole token in ledger units, used by the demo listings so their
/// prices read like the round figures in a listing sheet.
const DEMO_UNIT: u64 = 1_000_000;

fn main() -> Result<()> {
    let EscrituraCli {
        state,
        log_format,
        command,
    } = EscrituraCli::parse();

    logging::init_logging(
        "escritura=info,escritura_escrow=info",
        LogFormat::from_str_lossy(&log_format),
    );

    match command {
        Commands::Init(args) => init_deployment(&state, args),
        Commands::Seed => seed_deployment(&state),
        Commands::Mint(args) => mint_deed(&state, args),
        Commands::Approve(args) => approve_operator(&state, args),
        Commands::List(args) => list_deed(&state, args),
        Commands::Deposit(args) => deposit_earnest(&state, args),
        Commands::Fund(args) => fund_sale(&state, args),
        Commands::Inspect(args) => file_inspection(&state, args),
        Commands::ApproveSale(args) => approve_sale(&state, args),
        Commands::Finalize(args) => finalize_sale(&state, args),
        Commands::Cancel(args) => cancel_sale(&state, args),
        Commands::Status(args) => print_status(&state, args),
    }
}

/// Creates a fresh deployment state file with the named role accounts
/// and any initial ledger funding.
fn init_deployment(path: &Path, args: cli::InitArgs) -> Result<()> {
    if path.exists() && !args.force {
        bail!(
            "state file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let roles = Roles {
        seller: state::parse_account(&args.seller)?,
        inspector: state::parse_account(&args.inspector)?,
        lender: state::parse_account(&args.lender)?,
    };
    let mut st = DeploymentState::new(roles);

    for entry in &args.fund {
        let (account, amount) = entry
            .split_once('=')
            .with_context(|| format!("funding entry must be ACCOUNT=AMOUNT: {}", entry))?;
        let amount: u64 = amount
            .parse()
            .with_context(|| format!("invalid funding amount: {}", amount))?;
        let account = st.resolve_account(account)?;
        st.ledger.credit(account, amount)?;
    }

    st.save(path)?;
    tracing::info!(path = %path.display(), "deployment initialized");

    println!("Deployment initialized.");
    println!("  State file : {}", path.display());
    println!("  Engine     : {}", st.engine.address());
    println!("  Seller     : {}", roles.seller);
    println!("  Inspector  : {}", roles.inspector);
    println!("  Lender     : {}", roles.lender);
    Ok(())
}

/// Populates an empty deployment with three listed demo deeds and a
/// funded buyer and lender.
fn seed_deployment(path: &Path) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    if st.registry.total_minted() > 0 {
        bail!("deployment already has deeds; seed expects a fresh init");
    }

    let roles = st.engine.roles();
    let buyer = state::devnet_address("buyer1");
    st.ledger.credit(buyer, 100 * DEMO_UNIT)?;
    st.ledger.credit(roles.lender, 100 * DEMO_UNIT)?;

    let listings: [(&str, u64, u64); 3] = [
        ("ipfs://demo-properties/1.json", 20, 10),
        ("ipfs://demo-properties/2.json", 15, 5),
        ("ipfs://demo-properties/3.json", 10, 5),
    ];
    for (uri, price, earnest) in listings {
        let deed = st.registry.mint(roles.seller, uri);
        st.registry.approve(roles.seller, st.engine.address(), deed)?;
        st.engine.list(
            &mut st.registry,
            roles.seller,
            deed,
            buyer,
            price * DEMO_UNIT,
            earnest * DEMO_UNIT,
        )?;
        tracing::info!(deed = %deed, uri, "demo deed listed");
    }

    st.save(path)?;
    println!("Seeded {} demo listings.", listings.len());
    println!("  Buyer account : buyer1 ({})", buyer);
    Ok(())
}

/// Mints a new deed into the registry.
fn mint_deed(path: &Path, args: cli::MintArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let owner = st.resolve_account(&args.owner)?;
    let deed = st.registry.mint(owner, args.uri.as_str());
    st.save(path)?;

    tracing::info!(deed = %deed, owner = %owner, "deed minted");
    println!("Minted deed {} to {}.", deed, owner);
    println!("  Metadata : {}", args.uri);
    Ok(())
}

/// Authorizes an operator for a deed. With no `--operator`, authorizes
/// the engine, which every listing requires.
fn approve_operator(path: &Path, args: cli::ApproveArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let operator = match &args.operator {
        Some(label) => st.resolve_account(label)?,
        None => st.engine.address(),
    };
    let deed = DeedId::new(args.deed);
    st.registry.approve(caller, operator, deed)?;
    st.save(path)?;

    tracing::info!(deed = %deed, operator = %operator, "operator approved");
    println!("Approved {} as operator for deed {}.", operator, deed);
    Ok(())
}

/// Lists a deed for sale, moving it into engine custody.
fn list_deed(path: &Path, args: cli::ListArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let buyer = st.resolve_account(&args.buyer)?;
    let deed = DeedId::new(args.deed);
    st.engine.list(
        &mut st.registry,
        caller,
        deed,
        buyer,
        args.price,
        args.earnest,
    )?;
    st.save(path)?;

    tracing::info!(
        deed = %deed,
        buyer = %buyer,
        price = args.price,
        earnest = args.earnest,
        "deed listed"
    );
    println!(
        "Listed deed {} at {} (earnest minimum {}).",
        deed, args.price, args.earnest
    );
    println!("  Buyer : {}", buyer);
    Ok(())
}

/// Deposits earnest money toward a listed sale.
fn deposit_earnest(path: &Path, args: cli::DepositArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    let held = st
        .engine
        .deposit_earnest(&mut st.ledger, caller, deed, args.amount)?;
    st.save(path)?;

    tracing::info!(deed = %deed, amount = args.amount, held, "earnest deposited");
    println!(
        "Deposited {} toward deed {} (sale now holds {}).",
        args.amount, deed, held
    );
    Ok(())
}

/// Contributes funds toward a sale's purchase price.
fn fund_sale(path: &Path, args: cli::FundArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    let held = st
        .engine
        .fund_sale(&mut st.ledger, caller, deed, args.amount)?;
    st.save(path)?;

    tracing::info!(deed = %deed, amount = args.amount, held, "sale funded");
    println!(
        "Funded {} toward deed {} (sale now holds {}).",
        args.amount, deed, held
    );
    Ok(())
}

/// Files the inspector's report for a listed sale.
fn file_inspection(path: &Path, args: cli::InspectArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    st.engine
        .update_inspection_status(caller, deed, args.passed)?;
    st.save(path)?;

    tracing::info!(deed = %deed, passed = args.passed, "inspection filed");
    println!(
        "Inspection for deed {}: {}.",
        deed,
        if args.passed { "passed" } else { "failed" }
    );
    Ok(())
}

/// Records a party's closing sign-off on a sale.
fn approve_sale(path: &Path, args: cli::ApproveSaleArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    st.engine.approve_sale(caller, deed)?;
    st.save(path)?;

    // role_of never reports the buyer, so a None here means the sale's
    // named buyer signed.
    let role = st
        .engine
        .roles()
        .role_of(&caller)
        .map(|role| role.to_string())
        .unwrap_or_else(|| "buyer".to_string());
    tracing::info!(deed = %deed, party = %caller, role = %role, "sale approved");
    println!("Recorded {} sign-off on deed {}.", role, deed);
    Ok(())
}

/// Closes a fully-conditioned sale.
fn finalize_sale(path: &Path, args: cli::FinalizeArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    let statement = st
        .engine
        .finalize_sale(&mut st.registry, &mut st.ledger, caller, deed)?;
    st.save(path)?;

    tracing::info!(
        deed = %deed,
        reference = %statement.reference,
        proceeds = statement.seller_proceeds,
        refund = statement.buyer_refund,
        "sale finalized"
    );
    println!("Sale closed for deed {}.", deed);
    println!("  Reference       : {}", statement.reference);
    println!("  New owner       : {}", statement.buyer);
    println!("  Seller proceeds : {}", statement.seller_proceeds);
    println!("  Buyer refund    : {}", statement.buyer_refund);
    Ok(())
}

/// Calls off a listed sale and settles its funds.
fn cancel_sale(path: &Path, args: cli::CancelArgs) -> Result<()> {
    let mut st = DeploymentState::load(path)?;
    let caller = st.resolve_account(&args.caller)?;
    let deed = DeedId::new(args.deed);
    let receipt = st
        .engine
        .cancel_sale(&mut st.registry, &mut st.ledger, caller, deed)?;
    st.save(path)?;

    tracing::info!(
        deed = %deed,
        reference = %receipt.reference,
        payout = receipt.amount,
        "sale cancelled"
    );
    println!("Sale cancelled for deed {}.", deed);
    println!("  Reference     : {}", receipt.reference);
    println!("  Payout        : {} to {}", receipt.amount, receipt.payout_to);
    println!("  Deed returned : {}", receipt.deed_returned_to);
    Ok(())
}

/// Shows one sale in detail, or the whole deployment.
fn print_status(path: &Path, args: cli::StatusArgs) -> Result<()> {
    let st = DeploymentState::load(path)?;
    let roles = st.engine.roles();

    if let Some(raw) = args.deed {
        let deed = DeedId::new(raw);
        let record = st
            .engine
            .sale(deed)
            .with_context(|| format!("no sale on record for deed {}", deed))?;

        println!("Deed {} ({})", deed, record.status);
        println!("  Owner       : {}", st.registry.owner_of(deed)?);
        println!("  Buyer       : {}", record.buyer);
        println!("  Price       : {}", record.purchase_price);
        println!("  Earnest min : {}", record.escrow_amount);
        println!("  Held funds  : {}", record.escrowed);
        println!(
            "  Inspection  : {}",
            if record.inspection_passed {
                "passed"
            } else {
                "pending"
            }
        );
        for (label, party) in [
            ("buyer", record.buyer),
            ("seller", roles.seller),
            ("lender", roles.lender),
        ] {
            let signed = record.approvals.get(&party).copied().unwrap_or(false);
            println!(
                "  Sign-off    : {:<7} {}",
                label,
                if signed { "yes" } else { "no" }
            );
        }
        return Ok(());
    }

    println!("Deployment at {}", path.display());
    println!("  Saved at  : {}", st.saved_at);
    println!("  Engine    : {}", st.engine.address());
    println!("  Seller    : {}", roles.seller);
    println!("  Inspector : {}", roles.inspector);
    println!("  Lender    : {}", roles.lender);
    println!(
        "  Deeds     : {} minted, {} in custody",
        st.registry.total_minted(),
        st.registry.deeds_of(st.engine.address()).len()
    );
    println!("  Escrowed  : {}", st.engine.total_escrowed());

    let mut sales: Vec<_> = st.engine.sales().values().collect();
    sales.sort_by_key(|record| record.deed);
    if !sales.is_empty() {
        println!("Sales:");
        for record in sales {
            println!(
                "  deed {:<4} {:<10} price {:<12} held {}",
                record.deed.value(),
                record.status.to_string(),
                record.purchase_price,
                record.escrowed
            );
        }
    }

    let mut balances = st.ledger.all_balances();
    balances.sort_by_key(|(account, _)| account.to_hex());
    if !balances.is_empty() {
        println!("Balances:");
        for (account, balance) in balances {
            println!("  {} {}", account, balance);
        }
    }
    Ok(())
}
