use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use heaven_macro::core::hotkey::Accelerator;
use heaven_macro::{create_platform, EngineEvent, EngineSettings, MacroEngine, Result};

#[derive(Parser, Debug)]
#[command(name = "heaven-macro", version, about = "Hotkey-driven game macros")]
struct Args {
    /// Settings file
    #[arg(long, default_value = EngineSettings::SETTINGS_FILE)]
    settings: PathBuf,

    /// Use the logging stub platform instead of the desktop backend
    #[arg(long)]
    stub: bool,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "heaven_macro=info")]
    log: String,
}

enum Command {
    Hotkey(Accelerator),
    Stop,
    Quit,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = EngineSettings::load(&args.settings);
    let platform = create_platform(args.stub)?;
    let mut engine = MacroEngine::new(platform, settings)?;

    for (slot, response) in engine.apply_hotkey_settings() {
        if !response.success {
            warn!(%slot, error = response.error.as_deref().unwrap_or(""), "hotkey not bound");
        }
    }
    for (target, accelerator) in engine.bindings() {
        info!(%target, %accelerator, "bound");
    }

    let events = engine.subscribe();
    let commands = spawn_stdin_reader();
    info!("running; type an accelerator to simulate it, 'stop' or 'quit'");

    run(&engine, &commands, &events, args.stub);

    engine.shutdown();
    Ok(())
}

/// Dispatch loop. Returns when asked to quit or stdin closes.
fn run(engine: &MacroEngine, commands: &Receiver<Command>, events: &Receiver<EngineEvent>, stub: bool) {
    // Without OS hotkeys, stdin is the only input and EOF ends the session
    let stdin_only = stub || cfg!(not(windows));
    #[cfg(windows)]
    let hotkeys = (!stub).then(global_hotkey::GlobalHotKeyEvent::receiver);

    loop {
        #[cfg(windows)]
        {
            pump_messages();
            if let Some(receiver) = hotkeys {
                while let Ok(event) = receiver.try_recv() {
                    if event.state != global_hotkey::HotKeyState::Pressed {
                        continue;
                    }
                    let pressed = engine
                        .bindings()
                        .into_iter()
                        .find(|(_, accelerator)| heaven_macro::platform::win32::hotkey_id(accelerator) == event.id);
                    if let Some((_, accelerator)) = pressed {
                        engine.handle_hotkey(&accelerator);
                    }
                }
            }
        }

        match commands.try_recv() {
            Ok(Command::Hotkey(accelerator)) => {
                if engine.handle_hotkey(&accelerator).is_none() {
                    info!(%accelerator, "nothing bound");
                }
            }
            Ok(Command::Stop) => {
                engine.stop_search();
            }
            Ok(Command::Quit) => break,
            Err(TryRecvError::Disconnected) if stdin_only => break,
            Err(_) => {}
        }

        while let Ok(event) = events.try_recv() {
            match event {
                EngineEvent::MousePositionCaptured { x, y } => info!(x, y, "mouse position"),
                EngineEvent::ScreenRegionCaptured { width, height, .. } => {
                    info!(width, height, "template ready")
                }
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name("stdin".to_string()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "" => continue,
                "stop" => Command::Stop,
                "quit" | "exit" => Command::Quit,
                text => match Accelerator::parse(text) {
                    Ok(accelerator) => Command::Hotkey(accelerator),
                    Err(e) => {
                        warn!("{}", e);
                        continue;
                    }
                },
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        warn!("stdin reader unavailable: {}", e);
    }
    rx
}

#[cfg(windows)]
fn pump_messages() {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    let mut msg = MSG::default();
    unsafe {
        while PeekMessageW(&mut msg, HWND(0), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}
