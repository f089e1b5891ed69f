use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use subentry_core::config::Config;
use subentry_core::core_dit::{parse_ldif, Dn, EntryLookup};
use subentry_core::core_subentry::Subentry;
use subentry_core::logging::{init_logging_with_config, LogConfig};
use subentry_core::metrics::init_metrics;
use subentry_core::{AugmentedView, SubentryService};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "subentry")]
#[command(
    author,
    version,
    about = "Inspect subentries and collective attributes of an LDIF tree",
    long_about = None
)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective view of one entry
    Resolve {
        /// LDIF file to load
        ldif: PathBuf,
        /// DN of the entry to resolve
        dn: String,
        /// Print JSON instead of LDIF
        #[arg(long)]
        json: bool,
    },

    /// List the subentries whose scope contains a DN
    Subentries {
        /// LDIF file to load
        ldif: PathBuf,
        /// Target DN; if no entry exists there, filters are evaluated against an empty entry
        dn: String,
        /// Only subentries providing collective or inherited values
        #[arg(long)]
        collective: bool,
    },

    /// Load an LDIF file and report the first rejected subentry, if any
    Check {
        /// LDIF file to load
        ldif: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    let mut log_config = LogConfig::from_config(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse()?;
    }
    if args.json_logs {
        log_config.json_format = true;
    }
    init_logging_with_config(log_config)?;
    init_metrics();

    match args.command {
        Command::Resolve { ldif, dn, json } => {
            let service = load_service(&ldif, &config)?;
            let dn = parse_dn(&dn)?;
            let Some(view) = service.resolve_dn(&dn) else {
                bail!("no entry at {}", dn);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&view.to_json())?);
            } else {
                print!("{}", render_ldif(&view));
            }
        }
        Command::Subentries { ldif, dn, collective } => {
            let service = load_service(&ldif, &config)?;
            let dn = parse_dn(&dn)?;
            let registry = service.registry();
            let subentries = match service.store().get_entry(&dn) {
                Some(entry) if collective => service.get_collective_subentries(&entry),
                Some(entry) => service.get_subentries(&entry),
                None if collective => registry.get_collective_subentries_for_dn(&dn),
                None => registry.get_subentries_for_dn(&dn),
            };
            for subentry in subentries {
                println!("{}", describe(&subentry));
            }
        }
        Command::Check { ldif } => {
            let service = load_service(&ldif, &config)?;
            println!(
                "{} entries, {} subentries",
                service.store().len(),
                service.registry().len()
            );
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `SUBENTRY_*` variables
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn load_service(ldif: &Path, config: &Config) -> Result<SubentryService> {
    let text =
        std::fs::read_to_string(ldif).with_context(|| format!("reading {}", ldif.display()))?;
    let entries = parse_ldif(&text).with_context(|| format!("parsing {}", ldif.display()))?;
    debug!(path = %ldif.display(), records = entries.len(), "LDIF parsed");

    let service = SubentryService::new(config.engine.clone())?;
    service.load(entries).with_context(|| format!("loading {}", ldif.display()))?;
    info!(subentries = service.registry().len(), "directory loaded");
    Ok(service)
}

fn parse_dn(text: &str) -> Result<Dn> {
    Dn::parse(text).with_context(|| format!("invalid DN \"{}\"", text))
}

fn render_ldif(view: &AugmentedView) -> String {
    let entry = view.entry();
    let mut out = format!("dn: {}\n", entry.dn());
    for attr in entry.attributes() {
        for value in attr.values() {
            out.push_str(&format!("{}: {}\n", attr.description, value));
        }
    }
    out
}

fn describe(subentry: &Subentry) -> String {
    let tags: Vec<String> = subentry.capabilities().iter().map(|c| format!("{:?}", c)).collect();
    format!("{}\t{}\t{}", subentry.dn(), tags.join(","), subentry.spec())
}
