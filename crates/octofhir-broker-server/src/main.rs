use clap::Parser;
use octofhir_broker_server::{ServerBuilder, check_providers};
use octofhir_broker_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[derive(Debug, Parser)]
#[command(name = "octofhir-broker", version, about = "Multi-provider authentication broker")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "OCTOFHIR_BROKER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Check connectivity to every configured provider, print the reports and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    octofhir_broker_server::observability::init_tracing();

    let cli = Cli::parse();

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %cli.config, "Configuration loaded");
    octofhir_broker_server::observability::apply_logging_level(&cfg.logging.level);

    if cli.check {
        let reports = check_providers(&cfg).await?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        let failed = reports.iter().filter(|r| !r.valid).count();
        std::process::exit(if failed == 0 { 0 } else { 1 });
    }

    let server = ServerBuilder::new().with_config(cfg).build()?;
    server.run().await
}
