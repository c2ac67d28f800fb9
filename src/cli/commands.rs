use clap::{Args, Parser, Subcommand};
use memoria::core::memory::{DistanceMetric, IndexAlgorithm};

/// `memoria` - scoped memory store with similarity search, dedup and decay.
#[derive(Parser, Debug)]
#[command(name = "memoria")]
#[command(version)]
#[command(about = "Store, search and forget embedded memories.", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which (user, agent) partition a command works on.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Owning user id
    #[arg(short, long)]
    pub user: String,

    /// Agent id; omit for user-level memories
    #[arg(short, long)]
    pub agent: Option<String>,
}

/// Optional scope plus metadata equality filters.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Restrict to one user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Restrict to one agent
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Metadata equality filter, repeatable (key=value)
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a memory (collapses into a near-duplicate of the same scope)
    Add {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Memory text
        text: String,

        /// Metadata entry, repeatable (key=value)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Show one memory with its current strength
    Get { id: i64 },

    /// Replace a memory's text (re-embedded)
    Update { id: i64, text: String },

    /// Delete one memory
    Delete { id: i64 },

    /// Rank memories by similarity to a query
    Search {
        query: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List memories, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Delete every memory of a user, or of one of its agents
    Reset {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Build an approximate nearest-neighbor index (lancedb only)
    Index {
        #[arg(long, default_value = "auto", value_parser = parse_algorithm)]
        algorithm: IndexAlgorithm,

        #[arg(long, default_value = "cosine", value_parser = parse_metric)]
        metric: DistanceMetric,

        #[arg(long)]
        partitions: Option<u32>,

        #[arg(long)]
        sub_vectors: Option<u32>,
    },

    /// List memories whose current strength fell below a threshold
    Stale {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(short, long, default_value = "0.1")]
        threshold: f64,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Count and strength summary
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Record an explicit use of a memory (reinforces it)
    Used { id: i64 },
}

fn parse_algorithm(raw: &str) -> Result<IndexAlgorithm, String> {
    match raw.to_ascii_lowercase().replace('-', "_").as_str() {
        "auto" => Ok(IndexAlgorithm::Auto),
        "ivf_pq" => Ok(IndexAlgorithm::IvfPq),
        "ivf_hnsw_sq" => Ok(IndexAlgorithm::IvfHnswSq),
        "ivf_hnsw_pq" => Ok(IndexAlgorithm::IvfHnswPq),
        other => Err(format!(
            "unknown index algorithm '{other}' (auto, ivf-pq, ivf-hnsw-sq, ivf-hnsw-pq)"
        )),
    }
}

fn parse_metric(raw: &str) -> Result<DistanceMetric, String> {
    match raw.to_ascii_lowercase().as_str() {
        "cosine" => Ok(DistanceMetric::Cosine),
        "l2" => Ok(DistanceMetric::L2),
        "dot" => Ok(DistanceMetric::Dot),
        other => Err(format!("unknown metric '{other}' (cosine, l2, dot)")),
    }
}
