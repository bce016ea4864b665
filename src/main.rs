//! Headless SnapLens driver.
//!
//! Reads commands from stdin, one per line, and prints every UI event as a
//! JSON line on stdout:
//!   capture | batch | send | clear | toggle
//!   <accelerator>              e.g. `Alt+S`, resolved through the shortcut map
//!   set <credential> <value>   analysisApiKey, uploadAccountId, uploadApiToken
//!   bind <action> <accelerator>
//!   quit
//! Ctrl-C stops after the current event finishes.

use snaplens_lib::app::{Coordinator, ShellEvent, UiEvent};
use snaplens_lib::capture::{HeadlessShell, Rect, XcapCapturer};
use snaplens_lib::config::{AppConfig, ConfigError};
use snaplens_lib::settings::{FileStore, KeyringStore, SecureSplitStore, SettingsStore, SECRET_KEYS};
use snaplens_lib::shortcuts::{ShortcutAction, ShortcutMap};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Overlay bounds when `SNAPLENS_REGION` is not set.
const FALLBACK_REGION: Rect = Rect {
    x: 0,
    y: 0,
    width: 800,
    height: 600,
};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Event(ShellEvent),
    SetCredential { key: String, value: String },
    Bind { action: ShortcutAction, accelerator: String },
    Quit,
    Blank,
    Unknown(String),
}

fn parse_command(line: &str, shortcuts: &ShortcutMap) -> Command {
    let line = line.trim();
    let mut words = line.splitn(3, char::is_whitespace);
    let head = words.next().unwrap_or_default();

    match head.to_ascii_lowercase().as_str() {
        "" => Command::Blank,
        "capture" => Command::Event(ShellEvent::Capture),
        "batch" => Command::Event(ShellEvent::BatchCapture),
        "send" => Command::Event(ShellEvent::BatchSend),
        "clear" => Command::Event(ShellEvent::BatchClear),
        "toggle" => Command::Event(ShellEvent::ToggleVisibility),
        "quit" | "exit" => Command::Quit,
        "set" => match (words.next(), words.next().map(str::trim)) {
            (Some(key), Some(value)) if SECRET_KEYS.contains(&key) && !value.is_empty() => {
                Command::SetCredential {
                    key: key.to_string(),
                    value: value.to_string(),
                }
            }
            _ => Command::Unknown(line.to_string()),
        },
        "bind" => match (words.next().and_then(ShortcutAction::from_name), words.next()) {
            (Some(action), Some(accelerator)) => Command::Bind {
                action,
                accelerator: accelerator.trim().to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        _ => match shortcuts.resolve(line) {
            Some(event) => Command::Event(event),
            None => Command::Unknown(line.to_string()),
        },
    }
}

/// Stdin is read on a plain thread; a blocked read must not hold up shutdown.
fn spawn_stdin_reader(
    events: mpsc::Sender<ShellEvent>,
    store: Arc<dyn SettingsStore>,
    mut shortcuts: ShortcutMap,
) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("[APP] stdin read failed: {}", e);
                    break;
                }
            };
            match parse_command(&line, &shortcuts) {
                Command::Event(event) => {
                    if events.blocking_send(event).is_err() {
                        break;
                    }
                }
                Command::SetCredential { key, value } => match store.set(&key, &value) {
                    Ok(()) => eprintln!("saved {}", key),
                    Err(e) => eprintln!("could not save {}: {}", key, e),
                },
                Command::Bind { action, accelerator } => {
                    match shortcuts.set(action, &accelerator).and_then(|()| shortcuts.save(store.as_ref())) {
                        Ok(()) => eprintln!("{} -> {}", action, shortcuts.get(action)),
                        Err(e) => eprintln!("{}", e),
                    }
                }
                Command::Quit => break,
                Command::Blank => {}
                Command::Unknown(text) => eprintln!("unknown command: {}", text),
            }
        }
        log::info!("[APP] Input closed");
    });
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    let pipeline = Arc::new(config.build_pipeline()?);

    let store: Arc<dyn SettingsStore> = Arc::new(SecureSplitStore::new(
        Box::new(KeyringStore::default()),
        Box::new(FileStore::new(FileStore::default_path())),
    ));
    let shortcuts = ShortcutMap::load(store.as_ref());

    let region = config.region.unwrap_or_else(|| {
        log::warn!("[APP] SNAPLENS_REGION not set, using {:?}", FALLBACK_REGION);
        FALLBACK_REGION
    });

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let coordinator = Coordinator::new(
        Arc::new(HeadlessShell::new(region)),
        Arc::new(XcapCapturer::new()),
        pipeline,
        Arc::clone(&store),
        Arc::new(ui_tx),
    )
    .with_settle_delay(config.settle_delay);

    let printer = tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("[APP] Could not encode event: {}", e),
            }
        }
    });

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[APP] Interrupted, shutting down");
            cancel.cancel();
        }
    });

    let (event_tx, event_rx) = mpsc::channel(16);
    spawn_stdin_reader(event_tx, store, shortcuts);

    log::info!("[APP] SnapLens ready, region {:?}", region);
    coordinator.run(event_rx).await;

    // Dropping the coordinator closes the UI channel so the printer drains and exits.
    drop(coordinator);
    if let Err(e) = printer.await {
        log::error!("[APP] Printer task failed: {}", e);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        log::error!("[APP] {}", e);
        eprintln!("snaplens: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_accelerators_become_events() {
        let map = ShortcutMap::default();
        assert_eq!(parse_command("capture", &map), Command::Event(ShellEvent::Capture));
        assert_eq!(parse_command("  SEND ", &map), Command::Event(ShellEvent::BatchSend));
        assert_eq!(parse_command("alt+b", &map), Command::Event(ShellEvent::BatchCapture));
        assert_eq!(parse_command("", &map), Command::Blank);
        assert_eq!(parse_command("Ctrl+Q", &map), Command::Unknown("Ctrl+Q".into()));
    }

    #[test]
    fn set_only_accepts_credential_keys() {
        let map = ShortcutMap::default();
        assert_eq!(
            parse_command("set analysisApiKey sk-abc 123", &map),
            Command::SetCredential {
                key: "analysisApiKey".into(),
                value: "sk-abc 123".into(),
            }
        );
        assert!(matches!(parse_command("set shortcutsMap {}", &map), Command::Unknown(_)));
        assert!(matches!(parse_command("set analysisApiKey", &map), Command::Unknown(_)));
    }

    #[test]
    fn bind_names_an_action() {
        let map = ShortcutMap::default();
        assert_eq!(
            parse_command("bind batchSend Ctrl+Enter", &map),
            Command::Bind {
                action: ShortcutAction::BatchSend,
                accelerator: "Ctrl+Enter".into(),
            }
        );
        assert!(matches!(parse_command("bind zoom Alt+Z", &map), Command::Unknown(_)));
    }
}
