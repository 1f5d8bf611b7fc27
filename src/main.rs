use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use streamctl::app::{App, AppConfig};
use streamctl::control;
use streamctl::factory::ElementFactoryRegistry;
use tracing_subscriber::filter::LevelFilter;

/// Runs a JSON-described stream pipeline and toggles its optional
/// elements from the keyboard.
#[derive(Parser, Debug)]
#[command(name = "streamctl", version, about)]
struct Cli {
    /// Pipeline description file
    #[arg(short, long, default_value = "resources/pipeline.json")]
    input: PathBuf,

    /// Enable trace logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the registered element types and exit
    #[arg(long)]
    list_elements: bool,
}

fn list_elements(factories: &ElementFactoryRegistry) {
    for metadata in factories.list() {
        println!("{:<12} {}", metadata.type_name, metadata.description);
        for property in &metadata.properties {
            println!("    {:<16} {:?} (default {})", property.name, property.kind, property.default);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::TRACE } else { LevelFilter::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    if cli.verbose {
        log::info!("Verbose logging enabled.");
    }
    log::trace!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let factories = Arc::new(ElementFactoryRegistry::with_builtins());
    if cli.list_elements {
        list_elements(&factories);
        return ExitCode::SUCCESS;
    }

    let config = AppConfig {
        input: cli.input,
        ..AppConfig::default()
    };

    match run(config, factories).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, factories: Arc<ElementFactoryRegistry>) -> anyhow::Result<()> {
    let app = App::new(config, factories).await?;
    let exit = app.run(control::stdin_reader()?).await?;
    log::debug!("Control loop finished: {:?}", exit);
    Ok(())
}
