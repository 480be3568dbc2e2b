use std::sync::Arc;

use anyhow::Result;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    automation::{EnigoInput, InputDevice, RecordingInput},
    control::{AgentController, AgentDeps, Command, HELP},
    display::XcapDisplaySource,
    extraction::UniOcrRecognizer,
    settings::SettingsStore,
    utils::logging::init_logging,
};

async fn prompt() {
    print!("> ");
    let _ = io::stdout().flush().await;
}

/// Console front end: the action log streams to stdout, commands come from
/// stdin, Ctrl+C is the emergency stop.
pub async fn run() -> Result<()> {
    init_logging();
    log::info!("ScreenGuard starting up...");

    let dry_run = std::env::args().any(|arg| arg == "--dry-run");
    let settings_store = SettingsStore::new(SettingsStore::default_path())?;
    let input: Box<dyn InputDevice> = if dry_run {
        log::info!("dry run: input actions are recorded, not injected");
        Box::new(RecordingInput::new())
    } else {
        Box::new(EnigoInput::new())
    };

    let controller = AgentController::new(
        AgentDeps {
            source: Arc::new(XcapDisplaySource::new()),
            recognizer: Arc::new(UniOcrRecognizer::new()),
            input,
            provider: None,
        },
        settings_store.get(),
    )?;

    let mut entries = controller.subscribe_log();
    tokio::spawn(async move {
        loop {
            match entries.recv().await {
                Ok(entry) => println!(
                    "\n[{}] {:<10} {}",
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.kind.as_str(),
                    entry.message
                ),
                Err(RecvError::Lagged(missed)) => println!("\n... {missed} log entries skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    {
        let controller = controller.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                controller.emergency_stop();
                println!("\nEmergency stop engaged. 'arm' re-arms, 'quit' exits.");
            }
        });
    }

    println!("ScreenGuard console{}", if dry_run { " (dry run)" } else { "" });
    println!("{HELP}");

    let mut reader = io::BufReader::new(io::stdin());
    let mut buffer = String::new();
    prompt().await;

    while reader.read_line(&mut buffer).await? > 0 {
        let line = buffer.trim().to_string();
        buffer.clear();
        if line.is_empty() {
            prompt().await;
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                prompt().await;
                continue;
            }
        };

        match command {
            Command::Displays => match controller.list_displays().await {
                Ok(displays) => {
                    for d in displays {
                        println!(
                            "  {} {} {}x{} at {},{}{}",
                            d.id,
                            d.name,
                            d.width,
                            d.height,
                            d.x,
                            d.y,
                            if d.is_primary { " (primary)" } else { "" }
                        );
                    }
                }
                Err(err) => println!("could not list displays: {err:#}"),
            },
            Command::Start(ids) => match controller.start_monitoring(&ids).await {
                Ok(watched) => println!("watching monitors {watched:?}"),
                Err(err) => println!("{err:#}"),
            },
            Command::Stop => match controller.stop_monitoring().await {
                Ok(state) => println!("state: {state}"),
                Err(err) => println!("{err:#}"),
            },
            Command::Arm => match controller.arm_automation() {
                Ok(state) => println!("state: {state}"),
                Err(err) => println!("{err:#}"),
            },
            Command::Disarm => match controller.disarm_automation() {
                Ok(state) => println!("state: {state}"),
                Err(err) => println!("{err:#}"),
            },
            Command::EmergencyStop => {
                println!("state: {}", controller.emergency_stop());
            }
            Command::Request(text) => {
                // Runs in the background so `estop` stays available meanwhile.
                let controller = controller.clone();
                tokio::spawn(async move {
                    match controller.submit_request(&text).await {
                        Ok(outcome) => match serde_json::to_string(&outcome) {
                            Ok(json) => println!("\noutcome: {json}"),
                            Err(_) => println!("\noutcome: {outcome:?}"),
                        },
                        Err(err) => println!("\n{err:#}"),
                    }
                });
            }
            Command::Key(keys) => {
                let outcome = controller.press_keys(&keys).await;
                match serde_json::to_string(&outcome) {
                    Ok(json) => println!("outcome: {json}"),
                    Err(_) => println!("outcome: {outcome:?}"),
                }
            }
            Command::State => println!(
                "state: {} (monitoring: {})",
                controller.state(),
                controller.is_monitoring()
            ),
            Command::Metrics => {
                let snapshot = controller.metrics().await;
                let json = serde_json::to_string_pretty(&snapshot).unwrap_or_default();
                println!("{json}");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
        prompt().await;
    }

    controller.shutdown().await?;
    log::info!("ScreenGuard stopped");
    Ok(())
}
