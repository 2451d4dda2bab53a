use fpd_client::Engine;
use fpd_common::{PushdownConfig, SessionProperties};
use fpd_storage::Catalog;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty()
        || args
            .first()
            .map(|a| a == "--help" || a == "-h")
            .unwrap_or(false)
    {
        print_usage();
        return Ok(());
    }

    let opts = parse_opts(&args)?;
    let catalog = Catalog::load_from_json(&opts.catalog)?;
    let config = match &opts.config {
        Some(path) => PushdownConfig::load_from_json(path)?,
        None => PushdownConfig::default(),
    };
    let engine = Engine::new(config, catalog);
    let report = engine.pushdown(&opts.sql, opts.properties)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report.after)?);
    } else {
        print!("{}", report.explain());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Opts {
    catalog: String,
    config: Option<String>,
    sql: String,
    json: bool,
    properties: SessionProperties,
}

fn parse_opts(args: &[String]) -> Result<Opts, Box<dyn std::error::Error>> {
    let mut catalog = None;
    let mut config = None;
    let mut sql = None;
    let mut json = false;
    let mut properties = SessionProperties::default();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" => {
                i += 1;
                catalog = Some(
                    args.get(i)
                        .cloned()
                        .ok_or("missing value for --catalog")?,
                );
            }
            "--config" => {
                i += 1;
                config = Some(args.get(i).cloned().ok_or("missing value for --config")?);
            }
            "--sql" => {
                i += 1;
                sql = Some(args.get(i).cloned().ok_or("missing value for --sql")?);
            }
            "--json" => json = true,
            "--no-predicate-pushdown" => properties.predicate_pushdown = Some(false),
            "--no-limit-pushdown" => properties.limit_pushdown = Some(false),
            "--no-aggregation-pushdown" => properties.aggregation_pushdown = Some(false),
            "--single-query" => properties.prefer_single_query = Some(true),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
        i += 1;
    }

    Ok(Opts {
        catalog: catalog.ok_or("--catalog is required")?,
        config,
        sql: sql.ok_or("--sql is required")?,
        json,
        properties,
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  fpd --catalog <catalog.json> [--config <config.json>] --sql \"<query>\" [--json]");
    eprintln!();
    eprintln!("Session overrides:");
    eprintln!("  --no-predicate-pushdown   keep every filter in the host plan");
    eprintln!("  --no-limit-pushdown       keep every LIMIT in the host plan");
    eprintln!("  --no-aggregation-pushdown keep every aggregation in the host plan");
    eprintln!("  --single-query            never issue per-partition queries");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}
