pub mod list;
pub mod run;
pub mod validate;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "poxide", version, about = "Declarative YAML POC vulnerability detection engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute POC templates against targets
    Run(RunArgs),
    /// List loaded POC templates
    List(ListArgs),
    /// Search loaded POC templates by keyword
    Search(SearchArgs),
    /// Parse-check a POC template file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// POC template file (repeatable)
    #[arg(short, long)]
    pub poc: Vec<String>,

    /// Directory of POC templates, walked recursively
    #[arg(long)]
    pub poc_dir: Option<String>,

    /// Target base URL (repeatable)
    #[arg(short, long)]
    pub target: Vec<String>,

    /// File with one target URL per line
    #[arg(long)]
    pub targets_file: Option<String>,

    /// Execution mode: verify, attack or shell
    #[arg(short, long, default_value = "verify")]
    pub mode: String,

    /// Extra option passed into the template environment, key=value
    #[arg(short, long)]
    pub option: Vec<String>,

    /// Append results to this JSON-lines file
    #[arg(long)]
    pub output: Option<String>,

    /// Concurrent (template, target) executions
    #[arg(long, default_value = "10")]
    pub threads: usize,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    /// POC template file to load before listing (repeatable)
    #[arg(short, long)]
    pub poc: Vec<String>,

    /// Directory of POC templates to load before listing
    #[arg(long)]
    pub poc_dir: Option<String>,
}

#[derive(Args, Clone)]
pub struct SearchArgs {
    /// Keyword matched against name and description
    pub query: String,

    /// Directory of POC templates to load before searching
    #[arg(long)]
    pub poc_dir: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// POC template file
    pub path: String,
}
