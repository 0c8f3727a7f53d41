//! Configuration management for silkpatch
//!
//! This module handles CLI argument parsing and logging setup.

use crate::fetch::{DEFAULT_BASE_URL, DEFAULT_DEST_DIR};
use crate::rules::DEFAULT_TEST_POINT_PREFIX;
use anyhow::{anyhow, Result};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};
use std::path::PathBuf;
use tracing::info;

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("silkpatch")
        .about("silkpatch - Tidy KiCad silkscreen text and fetch the JLCPCB parts database")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_progress")
                .long("no-progress")
                .help("Disable progress indicators")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("normalize")
                .about("Rewrite silkscreen text in every layout file under ROOT")
                .arg(
                    Arg::new("root")
                        .help("Directory searched recursively for layout files")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                )
                .arg(
                    Arg::new("check")
                        .long("check")
                        .help("Report files that would change without writing them")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .help("Reference prefix marking test points")
                        .value_parser(value_parser!(String))
                        .default_value(DEFAULT_TEST_POINT_PREFIX),
                )
                .arg(
                    Arg::new("rotation")
                        .long("rotation")
                        .help("Angle given to test-point labels without one")
                        .value_parser(value_parser!(f64))
                        .default_value("90"),
                )
                .arg(
                    Arg::new("extension")
                        .long("extension")
                        .help("Extension of layout files")
                        .value_parser(value_parser!(String))
                        .default_value("kicad_pcb"),
                ),
        )
        .subcommand(
            Command::new("fetch-parts")
                .about("Download and extract the JLCPCB parts database")
                .arg(
                    Arg::new("dest")
                        .short('o')
                        .long("dest")
                        .help("Directory receiving the archive and database")
                        .value_parser(value_parser!(PathBuf))
                        .default_value(DEFAULT_DEST_DIR),
                )
                .arg(
                    Arg::new("base_url")
                        .long("base-url")
                        .help("URL the archive files are published under")
                        .value_parser(value_parser!(String))
                        .default_value(DEFAULT_BASE_URL),
                )
                .arg(
                    Arg::new("volumes")
                        .long("volumes")
                        .help("Number of numbered archive volumes, cache.z01 to cache.z07 at most")
                        .value_parser(value_parser!(u8).range(0..=7))
                        .default_value("7"),
                )
                .arg(
                    Arg::new("max_age_days")
                        .long("max-age-days")
                        .help("Skip the download while the database is younger than this")
                        .value_parser(value_parser!(u64))
                        .default_value("7"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Download even if the database is recent")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("seven_zip")
                        .long("seven-zip")
                        .help("7-Zip executable used for multi-volume archives")
                        .value_parser(value_parser!(String))
                        .default_value("7z"),
                ),
        )
}

/// Settings for the `normalize` subcommand
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeConfig {
    /// Root directory searched for layout files
    pub root: PathBuf,

    /// Layout file extension, without the dot
    pub extension: String,

    /// Only report, never write
    pub check: bool,

    pub test_point_prefix: String,

    pub rotation: f64,
}

/// Settings for the `fetch-parts` subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub dest: PathBuf,
    pub base_url: String,
    pub volumes: u8,
    pub max_age_days: u64,
    pub force: bool,
    pub seven_zip: String,
}

/// The selected subcommand
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Normalize(NormalizeConfig),
    FetchParts(FetchConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Enable verbose logging
    pub verbose: bool,

    /// Disable progress bars
    pub no_progress: bool,

    pub task: Task,
}

impl Config {
    /// Parse process arguments and set up logging
    pub fn from_args() -> Result<Self> {
        let matches = build_cli().get_matches();
        let config = Self::from_matches(&matches)?;

        init_logging(config.verbose);

        if config.verbose {
            info!("Configuration: {:?}", config);
        }

        Ok(config)
    }

    /// Build a configuration from already parsed arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let verbose = matches.get_flag("verbose");
        let no_progress = matches.get_flag("no_progress");

        let task = match matches.subcommand() {
            Some(("normalize", sub)) => Task::Normalize(NormalizeConfig {
                root: required::<PathBuf>(sub, "root")?,
                extension: required::<String>(sub, "extension")?
                    .trim_start_matches('.')
                    .to_string(),
                check: sub.get_flag("check"),
                test_point_prefix: required::<String>(sub, "prefix")?,
                rotation: required::<f64>(sub, "rotation")?,
            }),
            Some(("fetch-parts", sub)) => Task::FetchParts(FetchConfig {
                dest: required::<PathBuf>(sub, "dest")?,
                base_url: required::<String>(sub, "base_url")?
                    .trim_end_matches('/')
                    .to_string(),
                volumes: required::<u8>(sub, "volumes")?,
                max_age_days: required::<u64>(sub, "max_age_days")?,
                force: sub.get_flag("force"),
                seven_zip: required::<String>(sub, "seven_zip")?,
            }),
            Some((name, _)) => return Err(anyhow!("Unknown subcommand: {}", name)),
            None => return Err(anyhow!("A subcommand is required")),
        };

        Ok(Config {
            verbose,
            no_progress,
            task,
        })
    }
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| anyhow!("Missing value for --{}", id))
}

/// Set up tracing; RUST_LOG takes precedence over the verbose flag
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "silkpatch=debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
