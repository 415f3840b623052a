use anyhow::{Context, Result};
use kusi_voz::integration::{AssistantConfig, Runtime, RuntimeCommand, RuntimeEvent, RuntimeHandle};
use kusi_voz::state::Phase;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "kusi-voz.toml";

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kusi_voz=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kusi Voz voice assistant");

    let config = load_config(std::env::args().nth(1))?;
    let (runtime, handle) = Runtime::new(config).context("Failed to create runtime")?;
    let thread = runtime.start().context("Failed to start runtime")?;

    run_demo(&handle)?;

    handle.send_command(RuntimeCommand::Shutdown)?;
    watch(&handle, Duration::from_secs(1));
    if thread.join().is_err() {
        warn!("Runtime thread panicked");
    }

    Ok(())
}

fn load_config(arg: Option<String>) -> Result<AssistantConfig> {
    match arg {
        Some(path) => AssistantConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path)),
        None if Path::new(DEFAULT_CONFIG).exists() => AssistantConfig::load(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG)),
        None => {
            info!("No configuration file, using defaults");
            Ok(AssistantConfig::default())
        }
    }
}

/// Walk through one voice cycle, a reminder and a help request
fn run_demo(handle: &RuntimeHandle) -> Result<()> {
    // Let the startup greeting play out
    watch(handle, Duration::from_millis(6500));

    handle.send_command(RuntimeCommand::Press)?;
    watch(handle, Duration::from_millis(2500));

    if handle.snapshot().phase == Phase::AwaitingConfirmation {
        handle.send_command(RuntimeCommand::Confirm(true))?;
        watch(handle, Duration::from_millis(8000));
    } else {
        watch(handle, Duration::from_millis(7000));
    }

    handle.send_command(RuntimeCommand::MarkTaken("1".to_string()))?;
    watch(handle, Duration::from_millis(2500));

    handle.send_command(RuntimeCommand::RequestHelp("Consulta general".to_string()))?;
    watch(handle, Duration::from_millis(6500));

    Ok(())
}

/// Log every published snapshot for `duration`
fn watch(handle: &RuntimeHandle, duration: Duration) {
    let deadline = Instant::now() + duration;

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match handle.recv_event_timeout(remaining) {
            Some(RuntimeEvent::StateChanged) => match serde_json::to_string(&handle.snapshot()) {
                Ok(json) => info!("State: {}", json),
                Err(e) => warn!("Failed to serialize snapshot: {}", e),
            },
            Some(RuntimeEvent::Error(message)) => warn!("{}", message),
            Some(RuntimeEvent::Shutdown) => {
                info!("Runtime shut down");
                return;
            }
            None => return,
        }
    }
}
