//! Ore Calculator
//!
//! Mining throughput and reprocessing value calculator.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use rusqlite::Connection;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ore_calculator::calculator::{self, Report, SortDirection, SortKey, format_amount};
use ore_calculator::models::{
    Breakdown, DataKind, HarvestInput, MaterialRef, PriceBasis, PriceQuote, RigTier, SecurityClass,
    TypeId,
};
use ore_calculator::profile::{
    CacheSection, DEFAULT_CYCLE_TIME_SECONDS, HarvestSection, Profile, ReprocessingSection,
};
use ore_calculator::provider::SqliteStore;
use ore_calculator::{CalcOutcome, CalcRequest, db, import, sample};

const DEFAULT_DURATION_MINUTES: f64 = 60.0;

#[derive(Parser)]
#[command(name = "ore-calculator")]
#[command(about = "Mining throughput and reprocessing value calculator")]
struct Cli {
    /// Path to the SQLite cache database
    #[arg(short, long, default_value = "ore_data.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import reference data and price snapshots from a directory of JSON files
    Import {
        /// Directory holding the JSON exports
        source_dir: PathBuf,

        /// Clear cached data before importing
        #[arg(long)]
        clear: bool,
    },

    /// Estimate throughput and value for one or more materials
    Calc(CalcArgs),

    /// Show the effective reprocessing yield for a set of modifiers
    Yield {
        #[command(flatten)]
        reprocessing: ReprocessingArgs,

        /// Profile with default settings
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// List all cached items
    ListTypes,

    /// Show reference data and price for one item
    Type {
        /// Type id or name
        reference: String,
    },

    /// Record a market price by hand
    SetPrice {
        type_id: TypeId,

        /// Lowest sell price
        #[arg(long)]
        sell: Option<f64>,

        /// Highest buy price
        #[arg(long)]
        buy: Option<f64>,
    },

    /// Initialize empty database with schema
    Init,

    /// Load sample data for testing (without an import)
    LoadSample,
}

#[derive(Args)]
struct ReprocessingArgs {
    /// Facility base yield in percent
    #[arg(long)]
    base: Option<f64>,

    /// Rig bonus in percentage points
    #[arg(long)]
    rig_bonus: Option<f64>,

    /// Rig preset, used when --rig-bonus is not given
    #[arg(long, value_enum)]
    rig: Option<RigTier>,

    /// Security modifier in percent (only applies with a rig)
    #[arg(long)]
    security_mod: Option<f64>,

    /// Security preset, used when --security-mod is not given
    #[arg(long, value_enum)]
    security: Option<SecurityClass>,

    /// Reprocessing skill level (0-5)
    #[arg(long)]
    reprocessing: Option<f64>,

    /// Reprocessing Efficiency skill level (0-5)
    #[arg(long)]
    efficiency: Option<f64>,

    /// Ore or ice processing skill level (0-5)
    #[arg(long)]
    ore_processing: Option<f64>,

    /// Implant bonus in percent
    #[arg(long)]
    implant: Option<f64>,

    /// Reprocessing tax in percent
    #[arg(long)]
    tax: Option<f64>,
}

impl ReprocessingArgs {
    fn section(&self) -> ReprocessingSection {
        ReprocessingSection {
            facility_base_pct: self.base,
            rig_bonus_points: self.rig_bonus,
            rig: self.rig,
            security_mod_pct: self.security_mod,
            security: self.security,
            reprocessing: self.reprocessing,
            reprocessing_efficiency: self.efficiency,
            ore_processing: self.ore_processing,
            implant_pct: self.implant,
            tax_pct: self.tax,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct CalcArgs {
    /// Materials to compare: names or type ids separated by commas (e.g., "Veldspar, 1228")
    materials: String,

    /// Volume harvested per cycle in m3
    #[arg(long)]
    cycle_yield: Option<f64>,

    /// Cycle time in seconds
    #[arg(long)]
    cycle_time: Option<f64>,

    /// Harvesting duration in minutes
    #[arg(short, long)]
    minutes: Option<f64>,

    #[command(flatten)]
    reprocessing: ReprocessingArgs,

    /// Market side used for valuation
    #[arg(long, value_enum, default_value = "sell")]
    price_basis: PriceBasis,

    /// Column to rank candidates by
    #[arg(long, value_enum, default_value = "reprocess-per-hour")]
    sort: SortKey,

    /// Rank smallest first
    #[arg(long)]
    ascending: bool,

    /// Type id to show in detail instead of the best candidate
    #[arg(long)]
    select: Option<TypeId>,

    /// Maximum price age in minutes (0 accepts any age)
    #[arg(long)]
    price_max_age: Option<i64>,

    /// Maximum reference data age in days (0 accepts any age)
    #[arg(long)]
    type_max_age: Option<i64>,

    /// Profile with default settings
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ore_calculator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { source_dir, clear } => {
            if clear {
                info!("Clearing cached data...");
                db::clear_reference_data(&conn)?;
            }

            let stats = import::import_directory(&conn, &source_dir, Utc::now().timestamp())?;
            println!("{}", stats);
        }

        Commands::Calc(args) => run_calc(&conn, &args)?,

        Commands::Yield {
            reprocessing,
            profile,
        } => {
            let profile = load_profile(profile.as_ref())?;
            let config = reprocessing.section().or(profile.reprocessing).to_config();
            let effective = calculator::effective_yield(&config);

            println!("Facility base:   {:.2}%", config.facility_base_pct);
            println!("Rig bonus:       {:.2} points", config.rig_bonus_points);
            println!("Security mod:    {:.2}%", config.security_mod_pct);
            println!(
                "Skills:          {} / {} / {}",
                calculator::skill_level(config.reprocessing_level),
                calculator::skill_level(config.reprocessing_efficiency_level),
                calculator::skill_level(config.ore_processing_level)
            );
            println!("Implant:         {:.2}%", config.implant_pct);
            println!("Effective yield: {:.2}%", effective * 100.0);
        }

        Commands::ListTypes => {
            let types = db::list_types(&conn)?;
            if types.is_empty() {
                println!("No items in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<10} {:<30} {:>12} {:>8}", "Type", "Name", "Volume (m3)", "Portion");
                println!("{}", "-".repeat(63));
                for t in types {
                    println!("{:<10} {:<30} {:>12} {:>8}", t.type_id, t.name, t.volume, t.portion_size);
                }
            }
        }

        Commands::Type { reference } => show_type(&conn, &reference)?,

        Commands::SetPrice { type_id, sell, buy } => {
            if sell.is_none() && buy.is_none() {
                bail!("Give --sell, --buy or both");
            }
            let quote = PriceQuote {
                sell_min: sell,
                buy_max: buy,
            };
            db::upsert_price(&conn, type_id, &quote, Utc::now().timestamp())?;
            println!("Price recorded for {}", type_id);
        }

        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            let count = sample::load_sample_data(&conn, Utc::now().timestamp())?;
            info!("Loaded {} sample items", count);
            println!("Sample data loaded successfully!");
        }
    }

    Ok(())
}

fn load_profile(path: Option<&PathBuf>) -> Result<Profile> {
    match path {
        Some(path) => Profile::load(path),
        None => Ok(Profile::default()),
    }
}

/// Split a comma, semicolon or newline separated list into material references.
/// Bare numbers (optionally prefixed with '#') are type ids, anything else a name.
fn parse_material_list(input: &str) -> Result<Vec<MaterialRef>> {
    let separator = Regex::new(r"[,;\n]+")?;
    let id_re = Regex::new(r"^#?(\d+)$")?;

    let mut refs = Vec::new();
    for token in separator.split(input).map(str::trim).filter(|t| !t.is_empty()) {
        match id_re.captures(token) {
            Some(cap) => {
                let id = cap[1]
                    .parse::<TypeId>()
                    .with_context(|| format!("Type id out of range: {}", token))?;
                refs.push(MaterialRef::Id(id));
            }
            None => refs.push(MaterialRef::Name(token.to_string())),
        }
    }
    Ok(refs)
}

fn run_calc(conn: &Connection, args: &CalcArgs) -> Result<()> {
    let profile = load_profile(args.profile.as_ref())?;

    let harvest = HarvestSection {
        cycle_yield: args.cycle_yield,
        cycle_time: args.cycle_time,
        minutes: args.minutes,
    }
    .or(profile.harvest);
    let Some(cycle_yield) = harvest.cycle_yield else {
        bail!("Cycle yield is required (--cycle-yield or [harvest] cycle_yield in a profile)");
    };
    let input = HarvestInput {
        cycle_yield_volume: cycle_yield,
        cycle_time_seconds: harvest.cycle_time.unwrap_or(DEFAULT_CYCLE_TIME_SECONDS),
        duration_minutes: harvest.minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
    };

    let policy = CacheSection {
        price_max_age_minutes: args.price_max_age,
        type_max_age_days: args.type_max_age,
    }
    .or(profile.cache)
    .to_policy();
    let store = SqliteStore::new(conn, policy);

    let request = CalcRequest {
        harvest: input,
        materials: parse_material_list(&args.materials)?,
        yield_config: args.reprocessing.section().or(profile.reprocessing).to_config(),
        price_basis: args.price_basis,
    };

    let outcome = calculator::calculate(&request, &store, &store, &store)?;

    if let CalcOutcome::Computed(calc) = &outcome {
        for gap in calc.gaps.iter().filter(|g| g.kind == DataKind::Price) {
            warn!("No price for {}: {}", gap.type_id, gap.reason);
        }
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => match &outcome {
            CalcOutcome::NothingHarvested { cycles } => {
                println!(
                    "Nothing harvested: {:.1}s does not cover a single {:.1}s cycle",
                    cycles.total_seconds, input.cycle_time_seconds
                );
            }
            CalcOutcome::Computed(calc) => {
                let direction = if args.ascending {
                    SortDirection::Ascending
                } else {
                    SortDirection::Descending
                };
                print!("{}", Report::new(calc, args.sort, direction, args.select));
            }
        },
    }

    Ok(())
}

fn show_type(conn: &Connection, reference: &str) -> Result<()> {
    let type_id = match parse_material_list(reference)?.into_iter().next() {
        Some(MaterialRef::Id(id)) => Some(id),
        Some(MaterialRef::Name(name)) => db::find_type_id(conn, &name)?,
        None => bail!("Give a type id or name"),
    };

    let Some(cached) = type_id.map(|id| db::get_type(conn, id)).transpose()?.flatten() else {
        println!("Item '{}' not found", reference);
        return Ok(());
    };
    let item = cached.item;

    println!("Item: {}", item.name);
    println!("  ID: {}", item.type_id);
    println!("  Volume: {} m3", item.volume);
    println!("  Portion size: {}", item.effective_portion_size());

    if !item.materials.is_empty() {
        println!("  Reprocesses into (per portion):");
        for entry in &item.materials {
            match entry.classify() {
                Breakdown::Valid {
                    material_type_id,
                    quantity,
                } => {
                    let name = db::get_type(conn, material_type_id)?
                        .map(|c| c.item.name)
                        .unwrap_or_else(|| format!("Type {}", material_type_id));
                    println!("    {} x {}", quantity, name);
                }
                Breakdown::Invalid => println!(
                    "    (ignored malformed entry: {} x {})",
                    entry.quantity, entry.material_type_id
                ),
            }
        }
    }

    match db::get_price(conn, item.type_id)? {
        Some((quote, fetched_at)) => {
            let taken = DateTime::<Utc>::from_timestamp(fetched_at, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| fetched_at.to_string());
            println!(
                "  Sell: {}  Buy: {}  (as of {})",
                format_amount(quote.sell_min),
                format_amount(quote.buy_max),
                taken
            );
        }
        None => println!("  Price: unknown"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_list_mixes_ids_and_names() {
        let refs = parse_material_list("Veldspar, 1228;#18\n Clear Icicle ,,").unwrap();
        assert_eq!(
            refs,
            vec![
                MaterialRef::Name("Veldspar".to_string()),
                MaterialRef::Id(1228),
                MaterialRef::Id(18),
                MaterialRef::Name("Clear Icicle".to_string()),
            ]
        );
    }

    #[test]
    fn material_list_rejects_huge_ids() {
        assert!(parse_material_list("99999999999").is_err());
        assert!(parse_material_list(" , ").unwrap().is_empty());
    }

    #[test]
    fn cli_parses_calc() {
        let cli = Cli::try_parse_from([
            "ore-calculator",
            "calc",
            "Veldspar,Scordite",
            "--cycle-yield",
            "1000",
            "--cycle-time",
            "92.2",
            "-m",
            "15",
            "--rig",
            "t2",
            "--security",
            "null",
            "--sort",
            "raw-per-hour",
        ])
        .unwrap();
        let Commands::Calc(args) = cli.command else {
            panic!("expected calc");
        };
        assert_eq!(args.minutes, Some(15.0));
        assert_eq!(args.sort, SortKey::RawPerHour);
        assert_eq!(args.reprocessing.section().to_config().rig_bonus_points, 3.0);
    }
}
