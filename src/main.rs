//! Model Fetcher CLI application
//!
//! Command-line interface for downloading and caching large model artifacts,
//! including artifacts split into multiple shards.

use std::process;

use tracing::info;
use tracing_subscriber::{filter::Directive, fmt, EnvFilter};

use model_fetcher::cli::{
    handle_acquire, handle_clear, handle_info, handle_list, handle_remove, handle_resolve,
    load_config, Cli, Commands,
};
use model_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // A missing .env file is not an error
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // Loaded before logging so the file can choose the level
    let config = load_config(&cli.global).await?;
    init_logging(&cli, config.logging.tracing_level());

    info!("Model Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Acquire(args) => {
            info!("Executing acquire command");
            handle_acquire(&cli.global, &config, args).await
        }
        Commands::List { all } => handle_list(&config, all).await,
        Commands::Remove { url } => handle_remove(&config, &url).await,
        Commands::Clear { yes } => handle_clear(&config, yes).await,
        Commands::Resolve { url } => {
            handle_resolve(&url);
            Ok(())
        }
        Commands::Info => handle_info(&config).await,
    }
}

/// Initialize logging from CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, configured: tracing::Level) {
    let log_level = cli.log_level(configured);

    let mut filter = EnvFilter::from_default_env();
    match format!("model_fetcher={}", log_level).parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
