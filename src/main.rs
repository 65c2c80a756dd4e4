use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};

use censo_layers::census_catalog::year_schema::DEFAULT_BASE_URL;
use censo_layers::census_catalog::{CensusYear, GeoLevel};
use censo_layers::config::{self, LoaderConfig};
use censo_layers::engine::DuckDbConnection;
use censo_layers::loader::{CensusSession, CustomQueryOutcome, LoadOutcome, LoadRequest};
use censo_layers::progress::ProgressReporter;
use censo_layers::query_generator::{BoundingBox, CategorySelection};

/// Censo - load Argentine census variables as geometry layers
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Settings {
    /// Read configuration from a YAML file (overrides the flags below)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read configuration from CENSO_* environment variables and .env
    #[arg(long, global = true)]
    from_env: bool,

    /// Root URL of the census Parquet files
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Census year (2022 or 2010)
    #[arg(long, global = true, default_value = "2022")]
    year: CensusYear,

    /// Warn when a load produces this many columns
    #[arg(long, global = true, default_value_t = 50)]
    column_warn: usize,

    /// Reject a load that produces this many columns
    #[arg(long, global = true, default_value_t = 100)]
    column_limit: usize,

    /// Do not cap the number of columns
    #[arg(long, global = true)]
    no_column_limit: bool,

    /// Attempts for a live category lookup
    #[arg(long, global = true, default_value_t = 3)]
    retries: u32,

    /// Delay before the first retry, in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Disable the metadata cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Maximum number of metadata cache entries
    #[arg(long, global = true, default_value_t = 1000)]
    cache_max_entries: usize,

    /// Do not install or load DuckDB extensions
    #[arg(long, global = true)]
    skip_extensions: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load variables as a layer and print a summary
    Load {
        /// Variable code (repeatable)
        #[arg(long = "var", required = true)]
        variables: Vec<String>,

        /// Geographic level: RADIO, FRACC, DEPTO or PROV
        #[arg(long, default_value = "RADIO")]
        level: GeoLevel,

        /// Unit code at the chosen level, e.g. 02 or 02-007 (repeatable)
        #[arg(long = "filter")]
        geo_filters: Vec<String>,

        /// Bounding box as xmin,ymin,xmax,ymax (EPSG:4326)
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<BoundingBox>,

        /// Category values to keep, as VARIABLE=value1,value2 (repeatable)
        #[arg(long = "categories", value_parser = parse_category_selection)]
        categories: Vec<(String, Vec<String>)>,

        /// Print the generated SQL instead of running it
        #[arg(long)]
        sql_only: bool,

        /// Number of features to print
        #[arg(long, default_value_t = 5)]
        show: usize,
    },

    /// List entity types
    EntityTypes,

    /// List variables, optionally for one entity type
    Variables {
        #[arg(long)]
        entity: Option<String>,
    },

    /// List geographic unit codes at a level
    GeoCodes {
        #[arg(long, default_value = "PROV")]
        level: GeoLevel,
    },

    /// Count the columns a load would produce
    Columns {
        #[arg(long = "var", required = true)]
        variables: Vec<String>,

        #[arg(long = "categories", value_parser = parse_category_selection)]
        categories: Vec<(String, Vec<String>)>,
    },

    /// Run SQL against the views radios, census and metadata
    Query {
        /// SQL text; read from --file when absent
        sql: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl From<&Settings> for config::CliConfig {
    fn from(settings: &Settings) -> Self {
        config::CliConfig {
            base_url: settings.base_url.clone(),
            default_year: settings.year,
            column_warn_threshold: Some(settings.column_warn),
            column_reject_threshold: (!settings.no_column_limit).then_some(settings.column_limit),
            retry_max_attempts: settings.retries,
            retry_base_delay_ms: settings.retry_delay_ms,
            no_cache: settings.no_cache,
            cache_max_entries: settings.cache_max_entries,
            skip_extensions: settings.skip_extensions,
        }
    }
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {}", e))?;
    match parts.as_slice() {
        [xmin, ymin, xmax, ymax] => {
            BoundingBox::new(*xmin, *ymin, *xmax, *ymax).map_err(|e| e.to_string())
        }
        _ => Err("expected four comma-separated numbers".to_string()),
    }
}

fn parse_category_selection(value: &str) -> Result<(String, Vec<String>), String> {
    let (variable, values) = value
        .split_once('=')
        .ok_or_else(|| "expected VARIABLE=value1,value2".to_string())?;
    Ok((
        variable.trim().to_string(),
        values
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    ))
}

fn selection(entries: Vec<(String, Vec<String>)>) -> Option<CategorySelection> {
    if entries.is_empty() {
        None
    } else {
        Some(entries.into_iter().collect())
    }
}

fn load_config(settings: &Settings) -> Result<LoaderConfig, config::ConfigError> {
    if let Some(path) = &settings.config {
        LoaderConfig::from_yaml_file(path)
    } else if settings.from_env {
        LoaderConfig::from_env()
    } else {
        LoaderConfig::from_cli(settings.into())
    }
}

/// Logs milestones at info level.
struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, percent: u8, message: &str) {
        log::info!("[{:>3}%] {}", percent, message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match load_config(&cli.settings) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let year = Some(config.default_year);

    let connection = DuckDbConnection::open_in_memory(config.load_extensions)
        .context("opening DuckDB connection")?;
    let session = CensusSession::new(Arc::new(connection), config);

    match cli.command {
        Command::Load {
            variables,
            level,
            geo_filters,
            bbox,
            categories,
            sql_only,
            show,
        } => {
            let mut request = LoadRequest::new(variables, level);
            request.year = year;
            request.geo_filters = (!geo_filters.is_empty()).then_some(geo_filters);
            request.bbox = bbox;
            request.selected_categories = selection(categories);

            if sql_only {
                let planned = session.plan_census_load(&request, &LogProgress).await?;
                println!("{}", planned.log_text);
                return Ok(());
            }

            match session.load_census_layer(&request, &LogProgress).await? {
                LoadOutcome::Loaded(layer) => {
                    println!("{}: {} features", layer.name, layer.feature_count());
                    let names: Vec<&str> = layer.fields.iter().map(|f| f.name.as_str()).collect();
                    println!("{}", names.join("\t"));
                    for feature in layer.features.iter().take(show) {
                        let values: Vec<String> = feature
                            .attributes
                            .iter()
                            .map(|v| v.to_code_string().unwrap_or_else(|| "NULL".to_string()))
                            .collect();
                        println!("{}", values.join("\t"));
                    }
                }
                LoadOutcome::NoData(no_data) => bail!(no_data.message),
            }
        }
        Command::EntityTypes => {
            for entity in session.get_entity_types(year, &LogProgress).await? {
                println!("{}", entity);
            }
        }
        Command::Variables { entity } => {
            for (code, label) in session
                .get_variables(year, entity.as_deref(), &LogProgress)
                .await?
            {
                println!("{}\t{}", code, label);
            }
        }
        Command::GeoCodes { level } => {
            for (code, label) in session
                .get_geographic_codes(year, level, &LogProgress)
                .await?
            {
                println!("{}\t{}", code, label);
            }
        }
        Command::Columns {
            variables,
            categories,
        } => {
            let selection = selection(categories);
            let count = session
                .calculate_column_count(year, &variables, selection.as_ref(), &LogProgress)
                .await?;
            println!("{}", count);
        }
        Command::Query { sql, file } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => return Err(anyhow!("provide SQL text or --file")),
            };
            match session.run_custom_query(year, &sql, &LogProgress).await? {
                CustomQueryOutcome::Layer(layer) => {
                    println!("{}: {} features", layer.name, layer.feature_count());
                }
                CustomQueryOutcome::Table(table) => {
                    println!("{}", table.columns.join("\t"));
                    for row in &table.rows {
                        let values: Vec<String> = row
                            .iter()
                            .map(|v| v.to_code_string().unwrap_or_else(|| "NULL".to_string()))
                            .collect();
                        println!("{}", values.join("\t"));
                    }
                }
                CustomQueryOutcome::NoRows => println!("The query returned no rows"),
            }
        }
    }

    Ok(())
}
