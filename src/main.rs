use clap::Parser;
use tracing_subscriber::EnvFilter;

use poxide::cli::{self, Cli, Commands};
use poxide::errors::PoxideError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .init();

    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(args, cli.quiet).await,
        Commands::List(args) => cli::list::handle_list(args),
        Commands::Search(args) => cli::list::handle_search(args),
        Commands::Validate(args) => cli::validate::handle_validate(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let exit_code = match &e {
            PoxideError::Parse { .. } | PoxideError::Yaml(_) | PoxideError::Config(_) => 2,
            PoxideError::Transport(_) => 3,
            PoxideError::TemplateNotFound(_) => 5,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
