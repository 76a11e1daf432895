use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use common::utils::logging::{init_logging, LogFormat};
use configs::AppConfig;
use dotenvy::dotenv;
use prefs::{JsonFileProvider, PrefKind, PrefValue, PreferenceStore, StoreContext};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "prefs")]
#[command(about = "Inspect and edit a file-backed preference store", version)]
struct Cli {
    /// Config file (defaults to $CONFIG_PATH or prefs.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override storage.namespace
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Override storage.data_dir
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a value; falls back to --default when missing or of another kind
    Get {
        key: String,

        /// float, int, long, bool or string
        #[arg(short, long, default_value = "string")]
        kind: PrefKind,

        #[arg(short, long)]
        default: Option<String>,
    },

    /// Write a value through to disk
    Put {
        key: String,
        value: String,

        #[arg(short, long, default_value = "string")]
        kind: PrefKind,
    },

    /// Exit 0 if the key exists, 1 otherwise
    Contains { key: String },

    /// Delete a key
    Remove { key: String },

    /// Delete every key in the namespace
    Clear,

    /// List every entry
    List {
        /// Emit a JSON object instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = match &cli.config {
        Some(path) => configs::load_from_file(path)?,
        None => configs::load_default()?,
    };
    if let Some(ns) = &cli.namespace {
        cfg.storage.namespace = ns.clone();
    }
    if let Some(dir) = &cli.data_dir {
        cfg.storage.data_dir = dir.clone();
    }
    cfg.normalize_and_validate()?;
    Ok(cfg)
}

fn get_as(store: &PreferenceStore, key: &str, default: PrefValue) -> Result<PrefValue> {
    let value = match default {
        PrefValue::Float(d) => PrefValue::Float(store.get_float(key, d)?),
        PrefValue::Int(d) => PrefValue::Int(store.get_int(key, d)?),
        PrefValue::Long(d) => PrefValue::Long(store.get_long(key, d)?),
        PrefValue::Bool(d) => PrefValue::Bool(store.get_bool(key, d)?),
        PrefValue::String(d) => PrefValue::String(store.get_string(key, &d)?),
    };
    Ok(value)
}

fn run(cli: Cli) -> Result<bool> {
    let cfg = load_config(&cli)?;
    init_logging(LogFormat::parse(&cfg.logging.format));
    common::env::ensure_data_dir(&cfg.storage.data_dir)?;

    let ctx = StoreContext::new(cfg.storage.namespace.clone(), JsonFileProvider::new(&cfg.storage.data_dir));
    let store = PreferenceStore::new();
    store.init(Some(&ctx))?;
    debug!(namespace = %cfg.storage.namespace, data_dir = %cfg.storage.data_dir.display(), "store opened");

    match cli.command {
        Commands::Get { key, kind, default } => {
            let found = match default {
                Some(raw) => Some(get_as(&store, &key, PrefValue::parse(kind, &raw).map_err(|e| anyhow!(e))?)?),
                None => store.get_value(&key)?.filter(|v| v.kind() == kind),
            };
            match found {
                Some(v) => println!("{v}"),
                None => return Ok(false),
            }
        }
        Commands::Put { key, value, kind } => {
            let value = PrefValue::parse(kind, &value).map_err(|e| anyhow!(e))?;
            if !store.put_value(&key, value)? {
                bail!("could not persist `{key}`");
            }
            info!(%key, %kind, "preference written");
        }
        Commands::Contains { key } => return Ok(store.contains_key(&key)?),
        Commands::Remove { key } => {
            if !store.remove_at(&key)? {
                bail!("could not persist removal of `{key}`");
            }
        }
        Commands::Clear => {
            if !store.clear_all()? {
                bail!("could not persist clear");
            }
        }
        Commands::List { json } => {
            let entries = store.entries()?;
            if json {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    out.insert(key, serde_json::to_value(&value)?);
                }
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (key, value) in entries {
                    println!("{key}\t{}\t{value}", value.kind());
                }
            }
        }
    }
    Ok(true)
}

fn main() -> Result<()> {
    // .env may carry RUST_LOG, CONFIG_PATH or PREFS_NAMESPACE
    dotenv().ok();
    let cli = Cli::parse();
    if !run(cli)? {
        std::process::exit(1);
    }
    Ok(())
}
