use clap::Parser;
use log::{error, info};
use shutterbug::configuration::config::{Args, Config};
use shutterbug::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
         shutterbug v{} :: photographs on request, publishes the result
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    info!("Importing configuration from {}", args.config_file.display());
    let config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    match controller.run().await {
        Ok(summary) => info!(
            "Stopped after {} cycle(s): {} succeeded, {} failed",
            summary.cycles_started, summary.cycles_succeeded, summary.cycles_failed
        ),
        Err(e) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
    }
}
