use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Sender, unbounded};
use dicta::activity::ActivityLogger;
use dicta::controller::{DictationController, MicCapture};
use dicta::event::ControlEvent;
use dicta::paste::PasteDispatcher;
use dicta::pipeline::TranscribePipeline;
use dicta::{
    Config, ConfigManager, DEFAULT_LOG_LEVEL, EngineMode, Transcriber, VERSION, WhisperApi,
    WhisperApiConfig,
};
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DICTA_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    info!(version = VERSION, "Starting dicta");

    // Load config, then save it back to create the file with defaults if
    // it doesn't exist
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load()?;
    config_manager.save(&config)?;
    info!(path = ?config_manager.config_path(), "Configuration loaded");

    // Set up the global hotkey
    let hotkey: HotKey = config
        .hotkey()
        .parse()
        .with_context(|| format!("Invalid hotkey binding: {}", config.hotkey()))?;
    let hotkey_manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;
    hotkey_manager
        .register(hotkey)
        .with_context(|| format!("Failed to register hotkey: {}", config.hotkey()))?;
    info!(hotkey = config.hotkey(), "Hotkey registered");

    // Engine construction is startup-fatal; a broken key or model should
    // fail here, not on the first session.
    let engine = build_engine(&config)?;

    let (sender, receiver) = unbounded();
    let pipeline = TranscribePipeline::new(
        engine,
        config.language().map(str::to_string),
        config.discard_duration(),
        sender.clone(),
    )?;
    let activity = ActivityLogger::open(&config.activity_log_path()?);

    spawn_hotkey_forwarder(hotkey.id(), sender)?;

    // The paste dispatcher holds enigo, which is not Send, so the
    // controller builds and owns it on its own thread.
    let controller_thread = thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || -> Result<()> {
            let paste =
                PasteDispatcher::system().context("Failed to initialize paste dispatcher")?;
            let mut controller =
                DictationController::new(MicCapture::new(), pipeline, paste, activity);
            info!("dicta ready");
            controller.run(&receiver);
            Ok(())
        })
        .context("Failed to spawn controller thread")?;

    // Hotkey events are delivered through the main run loop on macOS, so
    // the main thread parks there.
    #[cfg(target_os = "macos")]
    unsafe {
        use core_foundation::runloop::CFRunLoopRun;
        CFRunLoopRun();
    }

    match controller_thread.join() {
        Ok(result) => result,
        Err(_) => bail!("Controller thread panicked"),
    }
}

/// Forward presses of the registered hotkey onto the controller queue.
fn spawn_hotkey_forwarder(hotkey_id: u32, events: Sender<ControlEvent>) -> Result<()> {
    thread::Builder::new()
        .name("hotkey".to_string())
        .spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if event.id() == hotkey_id
                    && event.state() == HotKeyState::Pressed
                    && events.send(ControlEvent::HotkeyToggled).is_err()
                {
                    break;
                }
            }
        })
        .context("Failed to spawn hotkey thread")?;
    Ok(())
}

fn build_engine(config: &Config) -> Result<Arc<dyn Transcriber>> {
    match config.mode {
        EngineMode::Api => {
            let key = config
                .key_openai()
                .context("openai_key must be set in api mode")?;
            let mut api_config = WhisperApiConfig::new(key);
            if let Some(model) = config.model() {
                api_config = api_config.with_model(model);
            }
            info!(model = api_config.model(), "Using the Whisper API engine");
            Ok(Arc::new(WhisperApi::new(api_config)))
        }
        EngineMode::Local => build_local_engine(config),
    }
}

#[cfg(feature = "local-whisper")]
fn build_local_engine(config: &Config) -> Result<Arc<dyn Transcriber>> {
    use std::sync::atomic::{AtomicU64, Ordering};

    use dicta_transcribe::{LocalWhisper, LocalWhisperConfig, WhisperModel, ensure_model};

    let model = match config.model() {
        Some(name) => WhisperModel::from_name(name)
            .with_context(|| format!("Unknown model size: {}", name))?,
        None => WhisperModel::default(),
    };

    // Download before the listening loop starts, logging coarse progress.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to create download runtime")?;
    let last_decile = AtomicU64::new(0);
    let path = runtime.block_on(ensure_model(model, move |downloaded, total| {
        let decile = downloaded * 10 / total.max(1);
        if decile > last_decile.swap(decile, Ordering::Relaxed) {
            info!(percent = decile * 10, "Downloading model");
        }
    }))?;

    let local = LocalWhisper::new(LocalWhisperConfig::new(model).with_model_path(path));
    local.preload().context("Failed to load local model")?;
    info!(model = ?model, "Using the local whisper engine");
    Ok(Arc::new(local))
}

#[cfg(not(feature = "local-whisper"))]
fn build_local_engine(_config: &Config) -> Result<Arc<dyn Transcriber>> {
    bail!(
        "This build has no local engine; rebuild with --features local-whisper \
         or set mode = \"api\" in the config file"
    )
}
