use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use catalog_enricher::app::enrich_use_case::{EnrichReport, EnrichStep, EnrichUseCase};
use catalog_enricher::config::Config;
use catalog_enricher::domain::sky::parse_designation;
use catalog_enricher::domain::{Coordinate, EnrichmentResult, Radius, SourceTable};
use catalog_enricher::infra::{build_context, table_io};
use catalog_enricher::observability::{logging, metrics};
use catalog_enricher::pipeline::processing::{
    lookup_source, prepare_table, resolve_name, resolve_region, ColumnOptions, DuplicatePolicy, EnrichRequest,
    LookupRequest, MatchMode, PrepareOptions, ResolveFilter,
};

#[derive(Parser)]
#[command(name = "catalog-enricher")]
#[command(about = "Enrich astronomical source tables with data from remote catalogs")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $ENRICHER_CONFIG, then enricher.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for JSON log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: String,

    /// Serve Prometheus metrics on this address, e.g. 127.0.0.1:9000
    #[arg(long, global = true)]
    metrics_listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PositionArgs {
    /// Right ascension in decimal degrees
    #[arg(long, requires = "dec", allow_hyphen_values = true)]
    ra: Option<f64>,
    /// Declination in decimal degrees
    #[arg(long, requires = "ra", allow_hyphen_values = true)]
    dec: Option<f64>,
    /// IAU-style designation carrying the position, e.g. J055919.14-140448.8
    #[arg(long, conflicts_with_all = ["ra", "dec"])]
    designation: Option<String>,
}

impl PositionArgs {
    fn coordinate(&self) -> anyhow::Result<Option<Coordinate>> {
        match (&self.designation, self.ra, self.dec) {
            (Some(designation), _, _) => Ok(Some(parse_designation(designation)?)),
            (None, Some(ra), Some(dec)) => Ok(Some(Coordinate::new(ra, dec)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in missing coordinates and designations
    Prepare {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Text placed before generated designations (e.g. "2MASS J")
        #[arg(long)]
        designation_prefix: Option<String>,
    },
    /// Search one catalog around a single position
    Lookup {
        #[command(flatten)]
        position: PositionArgs,
        /// Catalog alias or VizieR identifier
        #[arg(long)]
        catalog: String,
        /// Search radius: bare arcseconds or with a unit (5arcsec, 0.5arcmin, 0.01deg)
        #[arg(long)]
        radius: Option<Radius>,
        /// Only return the nearest entry
        #[arg(long)]
        nearest: bool,
    },
    /// Cross-match a whole table against one catalog
    Xmatch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        catalog: String,
        #[arg(long)]
        radius: Option<Radius>,
        /// Comma-separated catalog columns to keep
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
        /// Keep the catalog's default magnitude columns
        #[arg(long)]
        default_columns: bool,
        /// Column prefix (defaults to the catalog alias)
        #[arg(long)]
        alias: Option<String>,
        /// Suffix the prefix instead of failing when the table already has it
        #[arg(long)]
        allow_repeat: bool,
        /// One cone search per row instead of batched uploads
        #[arg(long)]
        per_source: bool,
        /// Prepare the table before matching
        #[arg(long)]
        prepare: bool,
        /// Where to write the JSON run report (defaults next to the output)
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Look up an object by name, or list objects around a position
    Resolve {
        #[arg(long, conflicts_with_all = ["ra", "dec", "designation"])]
        name: Option<String>,
        #[command(flatten)]
        position: PositionArgs,
        #[arg(long)]
        radius: Option<Radius>,
        /// Object types to drop (repeatable)
        #[arg(long = "exclude-type")]
        exclude_types: Vec<String>,
        #[arg(long)]
        nearest: bool,
    },
    /// Run every [[steps]] entry of the configuration over a table
    Enrich {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        prepare: bool,
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn default_report_path(output: &Path) -> PathBuf {
    output.with_extension("report.json")
}

fn print_result(result: &EnrichmentResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn load_table(config: &Config, input: &Path, prepare: bool) -> anyhow::Result<SourceTable> {
    let table = table_io::read_csv(input, &config.table.layout)
        .with_context(|| format!("reading {}", input.display()))?;
    if !prepare {
        return Ok(table);
    }
    let options = PrepareOptions {
        designation_prefix: config.table.designation_prefix.clone(),
    };
    Ok(prepare_table(&table, &options)?)
}

async fn run_steps(
    config: &Config,
    steps: Vec<EnrichStep>,
    table: SourceTable,
    output: &Path,
    report_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if steps.is_empty() {
        bail!("no enrichment steps configured; add [[steps]] to the configuration");
    }
    let ctx = build_context(config)?;
    let use_case = EnrichUseCase::new(ctx, steps);
    let (table, report) = use_case.execute(table).await?;

    table_io::write_csv(&table, output, &config.table.layout)
        .with_context(|| format!("writing {}", output.display()))?;
    let report_path = report_path.unwrap_or_else(|| default_report_path(output));
    std::fs::write(&report_path, report.to_json()?)
        .with_context(|| format!("writing {}", report_path.display()))?;

    print_summary(&report, output, &report_path);
    Ok(())
}

fn print_summary(report: &EnrichReport, output: &Path, report_path: &Path) {
    let stats = EnrichUseCase::get_run_stats(report);
    println!("\n📊 Enrichment run {}:", report.run_id);
    println!("   Rows: {}", report.rows);
    for step in &report.steps {
        println!(
            "   {} ({}): matched {}, unmatched {}, failed {} ({:.1}% match rate)",
            step.catalog,
            step.prefix,
            step.stats.matched,
            step.stats.unmatched,
            step.stats.failed,
            step.stats.match_rate()
        );
    }
    if stats.degraded_steps > 0 {
        warn!(degraded_steps = stats.degraded_steps, "some rows were left at sentinel values");
        println!("\n⚠️  {} diagnostics recorded; see the report", report.total_diagnostics());
    }
    println!("   Output file: {}", output.display());
    println!("   Report: {}", report_path.display());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);

    if let Some(addr) = cli.metrics_listen {
        metrics::install_prometheus(addr)?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let default_radius = config.xmatch.default_radius_arcsec;

    match cli.command {
        Commands::Prepare {
            input,
            output,
            designation_prefix,
        } => {
            let table = table_io::read_csv(&input, &config.table.layout)?;
            let options = PrepareOptions {
                designation_prefix: designation_prefix.unwrap_or_else(|| config.table.designation_prefix.clone()),
            };
            let prepared = prepare_table(&table, &options)?;
            table_io::write_csv(&prepared, &output, &config.table.layout)?;
            println!("✅ Prepared {} rows into {}", prepared.len(), output.display());
        }
        Commands::Lookup {
            position,
            catalog,
            radius,
            nearest,
        } => {
            let Some(center) = position.coordinate()? else {
                bail!("give --ra and --dec, or --designation");
            };
            let ctx = build_context(&config)?;
            let request = LookupRequest {
                catalog,
                radius_arcsec: Some(radius.map(|r| r.arcsec()).unwrap_or(default_radius)),
                mode: if nearest { MatchMode::Nearest } else { MatchMode::All },
            };
            let result = lookup_source(&ctx, center, &request).await?;
            print_result(&result)?;
        }
        Commands::Xmatch {
            input,
            output,
            catalog,
            radius,
            columns,
            default_columns,
            alias,
            allow_repeat,
            per_source,
            prepare,
            report,
        } => {
            let table = load_table(&config, &input, prepare)?;
            let request = EnrichRequest {
                catalog,
                radius_arcsec: Some(radius.map(|r| r.arcsec()).unwrap_or(default_radius)),
                columns: ColumnOptions {
                    allow_list: columns,
                    use_default_columns: default_columns,
                },
                alias,
                duplicates: if allow_repeat {
                    DuplicatePolicy::Suffix
                } else {
                    DuplicatePolicy::Reject
                },
            };
            let step = if per_source {
                EnrichStep::lookup(request)
            } else {
                EnrichStep::xmatch(request)
            };
            run_steps(&config, vec![step], table, &output, report).await?;
        }
        Commands::Resolve {
            name,
            position,
            radius,
            exclude_types,
            nearest,
        } => {
            let ctx = build_context(&config)?;
            let filter = ResolveFilter {
                exclude_types,
                nearest_only: nearest,
            };
            let result = match (name, position.coordinate()?) {
                (Some(name), _) => resolve_name(&ctx, &name, &filter).await?,
                (None, Some(center)) => {
                    let radius = radius.map(|r| r.arcsec()).unwrap_or(default_radius);
                    resolve_region(&ctx, center, Some(radius), &filter).await?
                }
                (None, None) => bail!("give --name, or a position with --ra/--dec or --designation"),
            };
            print_result(&result)?;
        }
        Commands::Enrich {
            input,
            output,
            prepare,
            report,
        } => {
            let table = load_table(&config, &input, prepare)?;
            run_steps(&config, config.enrich_steps(), table, &output, report).await?;
        }
    }

    Ok(())
}
