//! Server runtime.
//!
//! Composition root: builds the player around the CPAL output, installs the Ctrl-C
//! handler and runs the HTTP server until it is stopped.

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use iom_player::Player;
use iom_player::device::{self, CpalOutput};

use crate::api;
use crate::config::ServerSettings;
use crate::state::AppState;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Run the HTTP control surface and the player until Ctrl-C.
pub fn run_server(settings: ServerSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.queue.spill_dir)
        .with_context(|| format!("create spill dir {:?}", settings.queue.spill_dir))?;

    let output = CpalOutput::new(settings.device.clone());
    let player = Arc::new(Player::new(
        settings.queue.clone(),
        settings.player.clone(),
        Box::new(output),
    ));
    tracing::info!(
        bind = %settings.bind,
        root = %settings.root.display(),
        spill_dir = %settings.queue.spill_dir.display(),
        persist = settings.queue.persist_to_disk,
        radius = settings.queue.window_radius,
        overcache = settings.queue.overcache_size,
        rate = settings.player.output_sample_rate,
        buffered_ms = settings.player.buffered_time.as_millis() as u64,
        "starting iom-server"
    );

    actix_web::rt::System::new().block_on(serve(settings, player))
}

async fn serve(settings: ServerSettings, player: Arc<Player>) -> Result<()> {
    let state = web::Data::new(AppState::new(player.clone(), settings.max_upload));
    let html_dir = settings.html_dir();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(state.max_upload))
            .wrap(Logger::default().exclude("/status"))
            .configure(api::configure)
            .service(actix_files::Files::new("/", html_dir.clone()).index_file("index.html"))
    })
    .disable_signals()
    .bind(settings.bind)
    .with_context(|| format!("bind {}", settings.bind))?
    .run();

    let handle = server.handle();
    let player_for_signal = player.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, shutting down");
        if let Err(e) = player_for_signal.shutdown() {
            tracing::warn!("queue cleanup failed: {e}");
        }
        let handle = handle.clone();
        actix_web::rt::System::new().block_on(handle.stop(true));
    })
    .context("install ctrl-c handler")?;

    server.await?;

    if let Err(e) = player.shutdown() {
        tracing::warn!("queue cleanup failed: {e}");
    }
    Ok(())
}
