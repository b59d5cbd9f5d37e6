use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use even_glasses_bridge::config::CONFIG_FILE_NAME;
use even_glasses_bridge::{logging, AppConfig, BluestBackend, CommandExecutor, GlassesManager, SessionEvent};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

const CONFIG_ENV: &str = "EVEN_GLASSES_CONFIG";

async fn run_demo(executor: &CommandExecutor) -> Result<()> {
    let manager = executor.manager();
    let scan_timeout = manager.config().scan_timeout();

    if !manager.scan_and_connect(scan_timeout).await {
        warn!("Could not connect to both glasses");
        if !manager.is_connected().await {
            return Ok(());
        }
    }
    info!("Connection status: {}", serde_json::to_string(&manager.status().await)?);

    let mut events = manager.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::ReconnectFailed { side, attempts } => {
                    error!("Gave up on {} glass after {} attempts", side, attempts)
                }
                event => info!("Session event: {:?}", event),
            }
        }
    });

    match executor.send_text("Hello, World!").await {
        Some(_) => info!("First message shown"),
        None => warn!("First message was not delivered"),
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    match executor.send_text("Even G1 bridge is working").await {
        Some(_) => info!("Second message shown"),
        None => warn!("Second message was not delivered"),
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let reading = "Words arrive a few at a time at the configured pace";
    match executor.send_rsvp_configured(reading, &CancellationToken::new()).await {
        Ok(true) => info!("RSVP demo finished"),
        Ok(false) => warn!("RSVP demo was not delivered"),
        Err(e) => warn!("RSVP demo stopped: {}", e),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init(log::Level::Info) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_FILE_NAME.to_string());
    let config = AppConfig::load_config(&config_path).await?;

    let backend = Arc::new(BluestBackend::new().await?);
    let manager = Arc::new(GlassesManager::new(backend, config.glasses).await?);
    let executor = CommandExecutor::new(manager.clone(), config.display);

    tokio::select! {
        result = run_demo(&executor) => {
            if let Err(e) = result {
                error!("Demo failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted, disconnecting"),
    }

    manager.shutdown().await;
    info!("Bye");
    Ok(())
}
