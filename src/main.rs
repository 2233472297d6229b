use voicememo::audio::{NativeEngine, WaveformAnimator};
use voicememo::config::Config;
use voicememo::display::waveform_glyphs;
use voicememo::messages::{Session, Snapshot};
use voicememo::services::{SessionHandle, SessionMachine};
use voicememo::shell::{self, ShellCommand};
use voicememo::storage::StorageGateway;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting voicememo");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Create LocalSet for !Send futures (the native engine holds a cpal::Stream)
    let local = tokio::task::LocalSet::new();

    local.run_until(async move { run_app(config).await }).await
}

async fn run_app(config: Config) -> Result<()> {
    let storage = StorageGateway::new(config.audio_dir()?);
    let engine = NativeEngine::new(
        config.format(),
        config.capture_dir(),
        config.status_interval(),
    );

    // Observable session state
    let (state_tx, mut state_rx) = watch::channel(Snapshot::default());

    // Create and spawn the session machine (spawn_local because the engine is !Send)
    let (session_tx, session_rx) = mpsc::channel(10);
    let mut machine = SessionMachine::new(engine, storage, session_rx, state_tx);
    machine.start();
    let session = SessionHandle::new(session_tx);
    let machine_task = tokio::task::spawn_local(machine.run());

    let (levels_tx, mut levels_rx) = watch::channel(Vec::new());
    let animator = WaveformAnimator::new(config.waveform_bars, config.waveform_interval());
    tokio::spawn(animator.run(state_rx.clone(), levels_tx));

    println!("{}", shell::render_library(&state_rx.borrow_and_update()));
    println!("{}", shell::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Main event loop
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match shell::parse_command(&line) {
                    Ok(ShellCommand::Intent(intent)) => {
                        if let Err(e) = session.send(intent).await {
                            println!("error: {}", e);
                        }
                    }
                    Ok(ShellCommand::List) => {
                        println!("{}", shell::render_library(&state_rx.borrow()));
                    }
                    Ok(ShellCommand::State) => {
                        println!("{}", shell::render_session(&state_rx.borrow().session));
                    }
                    Ok(ShellCommand::Help) => println!("{}", shell::HELP),
                    Ok(ShellCommand::Quit) => break,
                    Err(e) => println!("{}", e),
                }
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    tracing::error!("Session service exited");
                    break;
                }
                let snapshot = state_rx.borrow_and_update().clone();
                println!("{}", shell::render_session(&snapshot.session));
                if let Some(error) = &snapshot.last_error {
                    tracing::debug!("Last error: {}", error);
                }
            }

            Ok(()) = levels_rx.changed() => {
                if matches!(state_rx.borrow().session, Session::Recording { .. }) {
                    println!("{}", waveform_glyphs(&levels_rx.borrow_and_update()));
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // Closing the command channel lets the machine tear down any open session
    drop(session);
    if let Err(e) = machine_task.await {
        tracing::error!("Session service panicked: {}", e);
    }

    tracing::info!("voicememo shutdown complete");
    Ok(())
}
