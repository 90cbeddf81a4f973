use clap::Parser;
use dotenv::dotenv;
use env_logger::Env;
use log::{debug, error, info};
use std::process;

use accessible_auth::cli::{self, Commands, Context};
use accessible_auth::{config, App};

/// Accessible Auth - account management with accessibility-aware security
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Sets the configuration file
    #[clap(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,

    /// Turn debugging information on
    #[clap(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Client address used for rate limiting
    #[clap(long, value_name = "ADDR", default_value = "127.0.0.1")]
    ip: String,

    #[clap(subcommand)]
    command: Commands,
}

fn main() {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.debug {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    debug!("Starting Accessible Auth");

    let config = match config::load_config(&cli.config) {
        Ok(config) => {
            info!("Configuration loaded from {}", cli.config);
            config
        }
        Err(err) => {
            error!("Failed to load configuration: {:#}", err);
            process::exit(1);
        }
    };

    let app = match App::build(config) {
        Ok(app) => app,
        Err(err) => {
            error!("Failed to start: {:#}", err);
            process::exit(1);
        }
    };

    let ctx = Context::new(&app, &cli.ip);
    if let Err(err) = cli::execute(&app, &ctx, &cli.command) {
        error!("{:#}", err);
        process::exit(1);
    }
}
