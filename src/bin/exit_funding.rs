use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use exit_factors::core::funding::{
    allocate_support, load_factors, FundingParams, Ledger, DEFAULT_MAX_MONTHLY_SUPPORT,
};
use exit_factors::utils::logger;

#[derive(Parser)]
#[command(name = "exit-funding")]
#[command(about = "Allocate monthly financial support to exit relay operators")]
struct Args {
    /// Month being funded (YYYY-MM)
    month: String,

    /// Amount distributed this month
    monthly_amount: f64,

    /// TOML ledger of partners, relays and consensus status entries
    #[arg(short, long)]
    ledger: String,

    /// Country factors produced by exit-factors (factors.json) or a flat {cc: factor} map
    #[arg(short, long)]
    factors: String,

    /// Upper bound on a single partner's monthly support
    #[arg(long, default_value_t = DEFAULT_MAX_MONTHLY_SUPPORT)]
    max_support: f64,

    /// Print the allocation as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

const TERM_WIDTH: usize = 72;

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    if NaiveDate::parse_from_str(&format!("{}-01", args.month), "%Y-%m-%d").is_err() {
        bail!("month must be formatted as YYYY-MM, got '{}'", args.month);
    }

    tracing::info!("🚀 Computing exit funding for {}", args.month);

    let ledger_content = std::fs::read_to_string(&args.ledger)
        .with_context(|| format!("failed to read ledger '{}'", args.ledger))?;
    let partners = Ledger::from_toml_str(&ledger_content)?.into_partners()?;
    tracing::info!("📋 Loaded {} partners", partners.len());

    let factor_bytes = std::fs::read(&args.factors)
        .with_context(|| format!("failed to read factors '{}'", args.factors))?;
    let factors = load_factors(&factor_bytes)?;
    tracing::info!("📐 Loaded factors for {} countries", factors.len());

    let params = FundingParams {
        monthly_amount: args.monthly_amount,
        max_monthly_support: args.max_support,
    };
    let report = allocate_support(partners, &factors, params)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for partner in &report.partners {
        let mark = "=".repeat(TERM_WIDTH.saturating_sub(partner.name.len() + 2) / 2);
        println!("{} {} {}", mark, partner.name, mark);
        for relay in &partner.relays {
            println!(
                "  {}  {:.2} Mbit/s  {}  {:.2} €",
                relay.nickname,
                relay.exit_bandwidth_mbits(),
                relay.country,
                relay.support.unwrap_or(0.0)
            );
        }
        println!("Financial support: {:.2} €", partner.support.unwrap_or(0.0));
        println!();
    }
    println!("Total: {:.2} €", report.total_support);

    Ok(())
}
