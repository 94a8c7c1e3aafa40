//! speech-session-daemon: recognition session host for a single-screen front-end
//!
//! This daemon provides:
//! - Microphone permission gating before any recognition attempt
//! - An explicit recognition session state machine with scoped engine handles
//! - Classification of recognizer error codes into user notices
//! - IPC server the presentation layer uses to start sessions and observe
//!   `{in_progress, transcript}`
//!
//! Out of scope: audio capture, transcript persistence, runtime language
//! selection.

mod config;
mod controller;
mod engine;
mod errors;
mod events;
mod ipc;
mod lifecycle;
mod permission;
mod probe;
mod session;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::controller::Controller;
use crate::engine::CommandEngine;
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::permission::{ConfiguredPermissions, PermissionGate, PermissionState};
use crate::probe::CommandLanguageDetails;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "speech-session-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        recognizer = ?config.recognizer_command,
        language = %config.listen.language_tag,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    // Controller -> IPC server (session events for subscribers)
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    // IPC server -> controller
    let (command_tx, command_rx) = mpsc::channel(32);

    let engine = Arc::new(CommandEngine::new(config.recognizer_command.clone()));
    let permissions = Arc::new(ConfiguredPermissions::new(config.microphone, &config.data_dir));

    let (controller, callback_rx) = Controller::new(
        engine,
        PermissionGate::new(permissions),
        config.listen.clone(),
        event_tx.clone(),
    );
    let mut controller = controller.with_preflight(config.preflight_support_check);
    if let Some(program) = &config.recognizer_command {
        controller = controller.with_probe(
            Arc::new(CommandLanguageDetails::new(program.clone())),
            config.probe_timeout,
        );
    }

    match controller.initialize().await {
        PermissionState::Granted => info!("microphone access resolved"),
        state => warn!(?state, "continuing without microphone access - start requests will be refused"),
    }

    let server = Server::new(&config.socket_path, command_tx, controller.subscribe_ui(), event_tx)?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the controller (processes commands and engine callbacks)
        _ = controller.run(command_rx, callback_rx) => {
            info!("controller exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    controller.teardown();
    server.shutdown().await;

    info!("speech-session-daemon stopped");

    Ok(())
}
