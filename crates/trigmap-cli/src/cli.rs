use clap::{Args, Parser, Subcommand};
use trigmap_kernel::Severity;
use trigmap_triggers::SortField;

#[derive(Parser)]
#[command(
    name = "trigmap",
    about = "Trigmap: trigger dependencies, trigger queries and map state over a JSONL snapshot",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    /// Path to the store snapshot JSONL
    #[arg(long, global = true, default_value = "trigmap.jsonl")]
    pub store: String,

    /// Path to the frontend configuration (defaults when missing)
    #[arg(long, global = true, default_value = "trigmap.toml")]
    pub config: String,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Evaluation time as a unix timestamp (defaults to now)
    #[arg(long, global = true)]
    pub now: Option<i64>,

    /// Act as this user instead of the trusted internal principal
    #[arg(long, global = true)]
    pub user: Option<u64>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query triggers
    Triggers(TriggerArgs),

    /// Trigger dependency operations
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Compute the state of one map
    MapState {
        /// Map ID
        sysmapid: u64,

        /// Minimum severity shown (0-5), overriding the map's own setting
        #[arg(long)]
        severity_min: Option<Severity>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct TriggerArgs {
    /// Restrict to these trigger IDs
    #[arg(long = "triggerid")]
    pub triggerids: Vec<u64>,

    /// Restrict to triggers of these hosts
    #[arg(long = "hostid")]
    pub hostids: Vec<u64>,

    /// Restrict to triggers of hosts in these groups
    #[arg(long = "groupid")]
    pub groupids: Vec<u64>,

    /// Host technical name
    #[arg(long)]
    pub host: Option<String>,

    /// Host group name
    #[arg(long)]
    pub group: Option<String>,

    /// Case-insensitive substring of the trigger name
    #[arg(long)]
    pub search: Option<String>,

    /// Minimum severity (0-5)
    #[arg(long)]
    pub min_severity: Option<Severity>,

    /// Only enabled triggers on monitored hosts with active items
    #[arg(long)]
    pub monitored: bool,

    /// Only problems and recently recovered triggers
    #[arg(long)]
    pub only_true: bool,

    /// Drop triggers whose upstream dependency is a problem
    #[arg(long)]
    pub skip_dependent: bool,

    /// Only triggers with an unacknowledged problem event
    #[arg(long)]
    pub unacknowledged: bool,

    /// Include owning hosts
    #[arg(long)]
    pub select_hosts: bool,

    /// Include the upstream dependencies
    #[arg(long)]
    pub select_dependencies: bool,

    /// Include the latest event
    #[arg(long)]
    pub select_last_event: bool,

    /// Expand macros in trigger names
    #[arg(long)]
    pub expand_description: bool,

    /// Sort fields, comma separated
    #[arg(long, value_delimiter = ',')]
    pub sort: Vec<SortField>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Maximum number of triggers returned
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print only the number of matching triggers
    #[arg(long)]
    pub count: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum DepCommands {
    /// Make a trigger depend on another
    Add {
        /// Dependent (down) trigger ID
        triggerid: u64,

        /// Upstream trigger ID
        depends_on: u64,
    },

    /// Remove all dependencies of triggers and their inherited copies
    Delete {
        /// Trigger IDs
        #[arg(required = true)]
        triggerids: Vec<u64>,
    },

    /// Re-derive inherited dependencies from template triggers
    Sync {
        /// Template host IDs
        #[arg(long = "template", required = true)]
        templates: Vec<u64>,

        /// Only triggers on these hosts
        #[arg(long = "host")]
        hosts: Vec<u64>,
    },
}
