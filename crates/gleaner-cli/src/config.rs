use clap::{Args, Parser, Subcommand};
use gleaner_core::{Mode, WorkKeySource};
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(
    author,
    version,
    about = "Incremental, resumable harvester for product catalogs"
)]
#[command(after_help = "Examples:
  gleaner harvest hitachi-cross-reference --start 1 --end 500
  gleaner init-keys hitachi-catalog
  gleaner harvest hitachi-catalog --all
  gleaner facets hubbell-bushings
  gleaner status hitachi-catalog")]
pub struct Config {
    /// Custom path to catalogs.toml
    #[arg(long, global = true, env = "GLEANER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Search API key for `search` catalogs
    #[arg(long, global = true, env = "GLEANER_SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest a page catalog key by key
    #[command(after_help = "Examples:
  gleaner harvest hitachi-cross-reference --start 1 --end 500
  gleaner harvest hitachi-catalog --keys 1ZSC000563AAA0123,1ZSC000563AAA0456
  gleaner harvest hitachi-catalog --file retry.txt --mode overwrite
  gleaner harvest hitachi-catalog --all --mode scratch --yes")]
    Harvest {
        /// Catalog name from catalogs.toml
        catalog: String,

        #[command(flatten)]
        keys: KeyArgs,

        /// Seconds between fetches, overriding the catalog setting
        #[arg(long, value_name = "SECS")]
        delay: Option<f64>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Derive the style-number key file from the source catalog's results
    #[command(after_help = "Example: gleaner init-keys hitachi-catalog --force")]
    InitKeys {
        /// Catalog whose key file is written
        catalog: String,
        /// Rewrite an existing key file
        #[arg(long)]
        force: bool,
    },
    /// Harvest a search catalog through faceted sub-queries
    #[command(after_help = "Examples:
  gleaner facets hubbell-bushings
  gleaner facets hubbell-bushings --mode overwrite --sample-budget 1000")]
    Facets {
        /// Catalog name from catalogs.toml
        catalog: String,

        /// Hits sampled per oversized partition to discover facet values
        #[arg(long, value_name = "N")]
        sample_budget: Option<usize>,

        /// Print the merge report without touching the stores
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Show store counts and the consistency audit of a catalog
    Status {
        /// Catalog name from catalogs.toml
        catalog: String,
    },
}

/// Where the work keys come from. Exactly one is required.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// First index of an inclusive range (needs --end)
    #[arg(long, requires = "end", value_name = "N")]
    pub start: Option<u64>,

    /// Last index of an inclusive range
    #[arg(long, requires = "start", value_name = "N")]
    pub end: Option<u64>,

    /// Comma-separated keys
    #[arg(long, value_name = "KEYS", conflicts_with_all = ["start", "file", "all"])]
    pub keys: Option<String>,

    /// Line-delimited key file
    #[arg(long, value_name = "PATH", conflicts_with_all = ["start", "all"])]
    pub file: Option<PathBuf>,

    /// Every key of the catalog's key file
    #[arg(long, conflicts_with = "start")]
    pub all: bool,
}

impl KeyArgs {
    /// Builds the work-key source; `--all` reads `key_file`. `None` when no
    /// source flag was given.
    pub fn source(&self, key_file: PathBuf) -> Option<WorkKeySource> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return Some(WorkKeySource::Range { start, end });
        }
        if let Some(keys) = &self.keys {
            return Some(WorkKeySource::from_list_arg(keys));
        }
        if let Some(file) = &self.file {
            return Some(WorkKeySource::File(file.clone()));
        }
        self.all.then_some(WorkKeySource::File(key_file))
    }
}

/// Options shared by every command that commits to the stores.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// append, overwrite or scratch
    #[arg(short, long, default_value = "append")]
    pub mode: Mode,

    /// Confirm scratch mode, which deletes all stored results
    #[arg(short, long)]
    pub yes: bool,
}
