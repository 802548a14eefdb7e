use crate::data::configuration::{CheckStatus, ConfigError, Configuration};
use crate::data::dbconnector::{KinDBConnection, SQLConnector};
use crate::data::pictures::PictureStorage;
use crate::error::AppError;
use crate::server;
use clap::Parser;
use log::{debug, error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    #[arg(short, long, default_value_t = String::from("configuration.toml"))]
    configuration_path: String,
}

/// Print every configuration check so a broken setup can be fixed in one go.
fn report_configuration(config: &Configuration, err: &ConfigError) {
    error!("Configuration is not usable: {err}");
    for check in config.diagnostics() {
        match check.status {
            CheckStatus::Ok => info!("  [OK]    {}: {}", check.name, check.message),
            CheckStatus::Error => error!("  [ERROR] {}: {}", check.name, check.message),
        }
    }
}

fn load_configuration(path: &str) -> Result<Configuration, AppError> {
    let config = Configuration::load(path)?;
    if let Err(e) = config.validate() {
        report_configuration(&config, &e);
        return Err(e.into());
    }
    Ok(config)
}

pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    debug!("Configuration path: {}", args.configuration_path);
    let config = load_configuration(&args.configuration_path)?;
    debug!("Loaded configuration: {config:?}");

    let pictures = PictureStorage::new(&config.storage.path, &config.storage.public_base_url);
    // Check the database connection
    let mut db_connector = SQLConnector::new(&config.database.path, pictures);
    db_connector.connect().await?;
    db_connector.check().await?;
    // Has database been initialised ?
    if db_connector.is_initialized().await? {
        info!("Database is initialized");
        db_connector.sync_accounts(&config).await?;
    } else {
        info!("Database is not initialized, performing initialization");
        db_connector.initialize(&config).await?;
    }
    // Start the server
    server::run(config, db_connector, args.port).await
}
