use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use curator_api_types::ContentType;

/// Command-line arguments for the curator console.
#[derive(Debug, Parser)]
#[command(
    name = "curator",
    version,
    about = "Admin console for the content-curation backend"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CURATOR_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings that every subcommand may override.
#[derive(Debug, Args, Clone, Default)]
pub struct GlobalOverrides {
    /// Content API root URL.
    #[arg(long = "api-url", env = "CURATOR_API_URL", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Auth service root URL.
    #[arg(
        long = "auth-url",
        env = "CURATOR_AUTH_URL",
        value_name = "URL",
        global = true
    )]
    pub auth_url: Option<String>,

    /// Directory holding the persisted session.
    #[arg(
        long = "state-dir",
        value_name = "DIR",
        value_hint = ValueHint::DirPath,
        global = true
    )]
    pub state_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Sign in and persist the session.
    Login(LoginArgs),
    /// Forget the persisted session.
    Logout,
    /// Show the signed-in user and token expiry.
    #[command(name = "whoami")]
    WhoAmI,
    /// Feed management.
    Feeds(FeedsArgs),
    /// Collected leads.
    Leads(LeadsArgs),
    /// Unified scrape results across content types.
    Scrapes(ScrapesArgs),
    /// Approval queue.
    Approval(ApprovalArgs),
    /// Batch fetch jobs.
    #[command(name = "batch-fetch")]
    BatchFetch(BatchFetchArgs),
    /// Summary counts for the dashboard.
    Dashboard,
}

#[derive(Debug, Args, Clone)]
pub struct LoginArgs {
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    /// Read from the terminal when not supplied.
    #[arg(long, env = "CURATOR_PASSWORD", value_name = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct FeedsArgs {
    #[command(subcommand)]
    pub command: FeedsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum FeedsCommand {
    /// List every feed.
    List,
    /// Register a new feed.
    Add(FeedAddArgs),
    /// Activate a feed.
    Enable { id: i64 },
    /// Deactivate a feed.
    Disable { id: i64 },
    /// Delete a feed after confirmation.
    Delete {
        id: i64,
        /// Skip the confirmation prompt.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        yes: bool,
    },
    /// Pull new entries for one feed, or every feed when no id is given.
    Fetch { id: Option<i64> },
}

#[derive(Debug, Args, Clone)]
pub struct FeedAddArgs {
    #[arg(long = "category-id", value_name = "ID")]
    pub category_id: i64,

    #[arg(long, value_name = "URL")]
    pub url: String,

    #[arg(long = "name", value_name = "NAME")]
    pub source_name: String,

    #[arg(long, value_name = "URL")]
    pub website: Option<String>,

    /// Minutes between automatic fetches.
    #[arg(long = "interval", value_name = "MINUTES", default_value_t = 60)]
    pub fetch_interval: i64,
}

/// Filters shared by the list commands.
#[derive(Debug, Args, Clone, Default)]
pub struct LeadFilterArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long = "feed-id", value_name = "ID")]
    pub feed_id: Option<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct LeadsArgs {
    #[command(subcommand)]
    pub command: LeadsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum LeadsCommand {
    /// Page through leads, 30 per page.
    List {
        #[command(flatten)]
        filters: LeadFilterArgs,
        /// Number of pages to load.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Delete a lead after confirmation.
    Delete {
        id: i64,
        #[arg(long, action = clap::ArgAction::SetTrue)]
        yes: bool,
    },
    /// Translate pending leads.
    Translate {
        #[arg(long = "feed-id", value_name = "ID")]
        feed_id: Option<i64>,
        #[arg(long)]
        limit: Option<u64>,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ScrapesArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long = "content-type", value_name = "TYPE")]
    pub content_type: Option<String>,
    #[arg(long = "approval-status", value_name = "STATUS")]
    pub approval_status: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pub pages: u32,
}

#[derive(Debug, Args, Clone)]
pub struct ApprovalArgs {
    #[command(subcommand)]
    pub command: ApprovalCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ApprovalCommand {
    /// Items waiting for a decision.
    Pending {
        #[arg(long = "type", value_name = "TYPE")]
        content_type: Option<ContentType>,
    },
    /// Counts per status.
    Stats,
    Approve(DecisionArgs),
    Reject(DecisionArgs),
}

#[derive(Debug, Args, Clone)]
pub struct DecisionArgs {
    #[arg(value_name = "TYPE")]
    pub content_type: ContentType,
    pub content_id: i64,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct BatchFetchArgs {
    #[command(subcommand)]
    pub command: BatchFetchCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum BatchFetchCommand {
    /// Show the current job; `--watch` follows it until it finishes.
    Status {
        #[arg(long, action = clap::ArgAction::SetTrue)]
        watch: bool,
    },
    /// Start a new job.
    Start {
        /// Fetch every source even if recently fetched.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        force: bool,
    },
    /// Recent jobs.
    Jobs {
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
}
