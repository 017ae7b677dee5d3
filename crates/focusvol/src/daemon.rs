use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use focusvol_core::config::{self, Config, ConfigError, HotkeyAction, HotkeyConfig};
use focusvol_core::controller::VolumeController;
use focusvol_core::hotkey::HotkeyDispatcher;
use focusvol_core::resolver::SessionResolver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::keyboard::RdevCapture;
use crate::pulse::PulseClient;
use crate::tray::TrayPopup;
use crate::window::FocusedWindow;
use crate::{engine, kwin, pulse};

type Controller = VolumeController<PulseClient, FocusedWindow>;

/// Run the daemon with the given log level.
pub fn run(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("focusvol v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = Config::default_path().context("failed to resolve XDG config directory")?;
    match config::bootstrap_config(&config_path) {
        Ok(true) => info!("created default config at {}", config_path.display()),
        Ok(false) => {}
        Err(e) => warn!("failed to bootstrap config: {e}"),
    }

    let config = Config::load(&config_path).context("failed to load config")?;
    info!("loaded config from {}", config_path.display());
    match config.to_toml() {
        Ok(toml) => info!("active config:\n{toml}"),
        Err(e) => warn!("failed to serialize config for logging: {e}"),
    }

    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    let result = rt.block_on(async_main(config));
    // The key capture and PulseAudio threads use blocking APIs. The default
    // runtime drop would wait for them indefinitely.
    rt.shutdown_timeout(std::time::Duration::from_secs(1));
    result
}

async fn async_main(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // Set up channels
    let (audio_cmd_tx, audio_cmd_rx) = std::sync::mpsc::channel();
    let (pulse_connected_tx, pulse_connected_rx) = tokio::sync::watch::channel(false);
    let (tray_action_tx, tray_action_rx) = tokio::sync::mpsc::channel(8);
    let (focused_pid_tx, focused_pid_rx) = tokio::sync::watch::channel(None);

    // Start PulseAudio thread (std::thread)
    let pa_cancel = cancel.clone();
    let pa_join = std::thread::Builder::new()
        .name("pulse".into())
        .spawn(move || {
            pulse::run(audio_cmd_rx, pulse_connected_tx, pa_cancel);
        })
        .context("failed to spawn PulseAudio thread")?;

    // Start KWin focus tracking (tokio task)
    let kwin_handle = tokio::spawn(kwin::track_focus(focused_pid_tx, cancel.clone()));

    let resolver = SessionResolver::new(
        PulseClient::new(audio_cmd_tx, pulse_connected_rx),
        FocusedWindow::new(focused_pid_rx),
    );
    let mut controller = VolumeController::new(resolver).with_step(config.volume.step);
    let volume_rx = controller.subscribe();
    let controller = Arc::new(Mutex::new(controller));

    // Start hotkey capture (std::thread, owned by the dispatcher)
    let dispatcher = build_dispatcher(&config.hotkeys, &controller, &cancel)
        .context("invalid hotkey configuration")?;
    let listener = dispatcher
        .listen(RdevCapture)
        .context("failed to start hotkey listener")?;

    // Start system tray
    let popup = TrayPopup::spawn(tray_action_tx).await;

    // Set up signal handling
    let signal_cancel = cancel.clone();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to register SIGTERM handler")?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .context("failed to register SIGINT handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
            _ = signal_cancel.cancelled() => return,
        }
        signal_cancel.cancel();
    });

    // Run the engine (blocks until shutdown)
    let channels = engine::EngineChannels {
        volume_rx,
        tray_action_rx,
    };
    engine::run(popup, config.popup.display_duration(), channels, cancel.clone()).await;

    info!("engine stopped, shutting down subsystems");
    cancel.cancel();
    // rdev has no way to end its listen loop; the thread dies with the process.
    listener.stop();

    // Wait for threads with timeout
    let _ = tokio::time::timeout(std::time::Duration::from_millis(500), async {
        let _ = tokio::task::spawn_blocking(move || {
            let _ = pa_join.join();
        })
        .await;
    })
    .await;

    // Wait for tokio tasks
    let _ = tokio::time::timeout(std::time::Duration::from_millis(200), kwin_handle).await;

    info!("shutdown complete");
    Ok(())
}

/// Register every configured binding. Volume bindings drive `controller`
/// on the capture thread; the quit binding cancels `cancel`.
fn build_dispatcher(
    hotkeys: &HotkeyConfig,
    controller: &Arc<Mutex<Controller>>,
    cancel: &CancellationToken,
) -> Result<HotkeyDispatcher, ConfigError> {
    let mut dispatcher = HotkeyDispatcher::new();

    for (action, combo) in hotkeys.combos()? {
        let callback: Box<dyn FnMut() + Send> = match action {
            HotkeyAction::VolumeUp => with_controller(controller, Controller::volume_up),
            HotkeyAction::VolumeDown => with_controller(controller, Controller::volume_down),
            HotkeyAction::ToggleMute => with_controller(controller, Controller::toggle_mute),
            HotkeyAction::Quit => {
                let cancel = cancel.clone();
                Box::new(move || {
                    info!("quit hotkey pressed");
                    cancel.cancel();
                })
            }
        };
        info!("{action}: {combo}");
        dispatcher.register_combo(combo, callback);
    }

    Ok(dispatcher)
}

fn with_controller(
    controller: &Arc<Mutex<Controller>>,
    op: fn(&mut Controller),
) -> Box<dyn FnMut() + Send> {
    let controller = Arc::clone(controller);
    Box::new(move || {
        let mut guard = controller.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut guard);
    })
}
