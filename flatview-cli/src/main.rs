use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use flatview::auth;
use flatview::config::parse_config;
use flatview::flatten::{FlatRecord, ReferenceRecord, CREATED_AT_FIELD};
use flatview::mapper::{map_fields, MappedRecord, MappedValue, RenameTable};
use flatview::report::DateRange;
use flatview::value::{fields_to_json, FieldValue, Fields};
use flatview::{Dashboard, SqliteStore};
use std::path::PathBuf;
use std::process;

/// flatview CLI — read and append dashboard records from the command line
#[derive(Parser)]
#[command(name = "flatview", version, about)]
struct Cli {
    /// Path to the dashboard config (falls back to FLATVIEW_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Profile to use instead of the config's active profile
    #[arg(long)]
    profile: Option<String>,

    /// Admin username; the password is read from FLATVIEW_PASSWORD
    #[arg(long, default_value = "admin")]
    username: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List flattened parent/child records
    Records {
        /// Use display names and parsed dates
        #[arg(long)]
        mapped: bool,
        /// Earliest date to include (YYYY-MM-DD, implies --mapped)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        /// Latest date to include (YYYY-MM-DD, implies --mapped)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },

    /// List reference records
    References,

    /// Show summary metrics
    Summary,

    /// Count records per value of a raw field
    Counts {
        /// Raw field name (e.g. location)
        field: String,
    },

    /// Append a child record, creating its parent if needed
    AddChild {
        /// Parent key (e.g. KL-001)
        parent_key: String,
        /// Field values (e.g. --field symptoms=fever)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Append a reference record
    AddReference {
        /// Field values (e.g. --field Name="Dr. Menon")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// List configured and built-in profiles
    Profiles,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{s}': {e}"))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("FLATVIEW_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("flatview.yaml"));
    let config = parse_config(&config_path)?;

    if let Command::Profiles = cli.command {
        print_output(&serde_json::json!(config.profile_names()), &cli.format)?;
        return Ok(());
    }

    let password = std::env::var("FLATVIEW_PASSWORD").unwrap_or_default();
    let session = auth::authenticate(&config.auth, &cli.username, &password)?;

    let profile = match &cli.profile {
        Some(name) => config.resolve_profile(name)?,
        None => config.active_profile()?,
    };
    log::info!("Opening store at: {}", config.store.path.display());
    let store = SqliteStore::open(&config.store.path)?.with_id_strategy(config.store.id_strategy);
    let dashboard = Dashboard::new(store, profile, config.cache.ttl());

    match cli.command {
        Command::Records { mapped, from, to } => {
            if mapped || from.is_some() || to.is_some() {
                let range = (from.is_some() || to.is_some()).then_some(DateRange { from, to });
                let rows = dashboard.mapped_records(&session, range.as_ref())?;
                print_output(&serde_json::to_value(rows)?, &cli.format)?;
            } else {
                let rows: Vec<serde_json::Value> = dashboard
                    .records(&session)?
                    .iter()
                    .map(record_row)
                    .collect();
                print_output(&serde_json::Value::Array(rows), &cli.format)?;
            }
        }

        Command::References => {
            let renames = &dashboard.profile().reference_renames;
            let rows: Vec<_> = dashboard
                .references(&session)?
                .iter()
                .map(|r| reference_row(r, renames))
                .collect();
            print_output(&serde_json::to_value(rows)?, &cli.format)?;
        }

        Command::Summary => {
            let summary = dashboard.summary(&session)?;
            print_output(&serde_json::to_value(summary)?, &cli.format)?;
        }

        Command::Counts { field } => {
            let counts = dashboard.counts_by(&session, &field)?;
            print_output(&serde_json::to_value(counts)?, &cli.format)?;
        }

        Command::AddChild { parent_key, fields } => {
            let id = dashboard.add_child(&session, &parent_key, fields_to_record(&fields))?;
            print_output(
                &serde_json::json!({ "ok": true, "parent_id": parent_key, "child_id": id }),
                &cli.format,
            )?;
        }

        Command::AddReference { fields } => {
            let id = dashboard.add_reference(&session, fields_to_record(&fields))?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Profiles => {}
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// A flattened record with its synthetic keys and the child's creation time.
fn record_row(record: &FlatRecord) -> serde_json::Value {
    let mut row = record.to_fields();
    row.insert(
        CREATED_AT_FIELD.to_string(),
        FieldValue::Timestamp(record.created_at),
    );
    fields_to_json(&row)
}

fn reference_row(reference: &ReferenceRecord, renames: &RenameTable) -> MappedRecord {
    let mut row = map_fields(&reference.to_fields(), renames, None);
    row.insert(
        CREATED_AT_FIELD.to_string(),
        MappedValue::Value(FieldValue::Timestamp(reference.created_at)),
    );
    row
}

/// Numbers and booleans are recognised; everything else stays a string.
/// `007` is not valid JSON and so stays a string too.
fn fields_to_record(fields: &[(String, String)]) -> Fields {
    fields
        .iter()
        .map(|(key, val)| {
            let value = match serde_json::from_str::<serde_json::Value>(val) {
                Ok(serde_json::Value::Bool(b)) => FieldValue::Bool(b),
                Ok(serde_json::Value::Number(n)) => n
                    .as_f64()
                    .map(FieldValue::Number)
                    .unwrap_or_else(|| FieldValue::String(val.clone())),
                _ => FieldValue::String(val.clone()),
            };
            (key.clone(), value)
        })
        .collect()
}
