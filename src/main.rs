use genstudio::{
    logger::{self, LoggerConfig},
    server, Config,
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(LoggerConfig::from_env())?;
    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = Config::from_env();
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), config.port());
    logger::log_config_info(&config);

    if let Err(e) = server::serve(config).await {
        log::error!("❌ Server failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
