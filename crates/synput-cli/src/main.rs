//! synput - drive the synthetic input engine from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use synput_core::backend;
use synput_core::{
    BackendKind, DeliveryBackend, DeliveryReport, EngineConfig, InputEngine, InputSession,
    LogicalKey, Point, PointerButton,
};
use tracing::{debug, info, warn};

const DEFAULT_CONFIG: &str = "synput.json";

#[derive(Parser, Debug)]
#[command(name = "synput", version, about = "Synthesize keyboard and pointer input into a window", long_about = None)]
struct Args {
    /// Engine configuration (JSON). Defaults to ./synput.json when present.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Delivery backend (recording, post-message, send-input, xtest, x-send-event)
    #[arg(short, long, env = "SYNPUT_BACKEND")]
    backend: Option<BackendKind>,

    /// Target window handle, decimal or 0x-prefixed hex
    #[arg(short, long, env = "SYNPUT_TARGET", value_parser = parse_handle)]
    target: u64,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type text; U+E000..U+E03C encode named keys
    Type {
        text: String,
        /// Delay per key in milliseconds
        #[arg(short, long, value_name = "MS")]
        delay: Option<u64>,
    },
    /// Press keys (names like shift, enter, f5, or single characters) and keep them down
    Press {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Release keys
    Release {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Press keys in order, then release them in reverse
    Chord {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Click {
        x: i32,
        y: i32,
        #[arg(short, long, value_enum, default_value = "left")]
        button: ButtonArg,
    },
    DoubleClick {
        x: i32,
        y: i32,
    },
    Move {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
        #[arg(short, long, default_value = "0", value_name = "MS")]
        duration: u64,
    },
    /// Press a button at one point, drag to another, release
    Drag {
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
        #[arg(short, long, default_value = "250", value_name = "MS")]
        duration: u64,
        #[arg(short, long, value_enum, default_value = "left")]
        button: ButtonArg,
    },
    /// Keep re-asserting the pointer at a position for a while
    Hover {
        x: i32,
        y: i32,
        #[arg(short, long, default_value = "1000", value_name = "MS")]
        duration: u64,
    },
    /// Report whether injected events are still draining
    Pending,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ButtonArg {
    Left,
    Middle,
    Right,
}

impl From<ButtonArg> for PointerButton {
    fn from(b: ButtonArg) -> Self {
        match b {
            ButtonArg::Left => PointerButton::Left,
            ButtonArg::Middle => PointerButton::Middle,
            ButtonArg::Right => PointerButton::Right,
        }
    }
}

fn parse_handle(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid handle '{}': {}", s, e))
}

fn parse_keys(names: &[String]) -> Result<Vec<LogicalKey>> {
    names
        .iter()
        .map(|n| LogicalKey::parse(n).with_context(|| format!("Unknown key '{}'", n)))
        .collect()
}

fn default_backend() -> BackendKind {
    if cfg!(windows) {
        BackendKind::PostMessage
    } else if cfg!(all(target_os = "linux", feature = "x11")) {
        BackendKind::XTest
    } else {
        BackendKind::Recording
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p),
        None if Path::new(DEFAULT_CONFIG).exists() => EngineConfig::load(DEFAULT_CONFIG),
        None => Ok(EngineConfig::default()),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("synput_core={level},synput={level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    debug!("Config: {:?}", config);

    let kind = args.backend.unwrap_or_else(default_backend);
    let backend = backend::open(kind)?;
    let mut engine = InputEngine::new(backend, config)?;
    let mut session = engine.open_session(args.target)?;
    info!("Target {} via {}", session.target(), engine.backend().name());

    let report = run(&mut engine, &mut session, args.command)?;
    if let Some(report) = report {
        if !report.is_complete() {
            warn!("{} events were not delivered", report.failed);
        }
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

fn run<B: DeliveryBackend>(
    engine: &mut InputEngine<B>,
    session: &mut InputSession,
    command: Command,
) -> Result<Option<DeliveryReport>> {
    let report = match command {
        Command::Type { text, delay } => engine.synthesize_keys(session, &text, delay)?,
        Command::Press { keys } => {
            let mut report = DeliveryReport::default();
            for key in parse_keys(&keys)? {
                report.merge(engine.press_key(session, key)?);
            }
            report
        }
        Command::Release { keys } => {
            let mut report = DeliveryReport::default();
            for key in parse_keys(&keys)? {
                report.merge(engine.release_key(session, key)?);
            }
            report
        }
        Command::Chord { keys } => {
            let keys = parse_keys(&keys)?;
            let mut report = DeliveryReport::default();
            for key in &keys {
                report.merge(engine.press_key(session, *key)?);
            }
            for key in keys.iter().rev() {
                report.merge(engine.release_key(session, *key)?);
            }
            report
        }
        Command::Click { x, y, button } => engine.click(session, Point::new(x, y), button.into())?,
        Command::DoubleClick { x, y } => engine.double_click(session, Point::new(x, y))?,
        Command::Move {
            from_x,
            from_y,
            to_x,
            to_y,
            duration,
        } => engine.move_pointer(
            session,
            Duration::from_millis(duration),
            Point::new(from_x, from_y),
            Point::new(to_x, to_y),
        )?,
        Command::Drag {
            from_x,
            from_y,
            to_x,
            to_y,
            duration,
            button,
        } => {
            let from = Point::new(from_x, from_y);
            let to = Point::new(to_x, to_y);
            let mut report = engine.press_pointer(session, from, button.into())?;
            report.merge(engine.move_pointer(session, Duration::from_millis(duration), from, to)?);
            report.merge(engine.release_pointer(session, to, button.into())?);
            report
        }
        Command::Hover { x, y, duration } => {
            let at = Point::new(x, y);
            let report = engine.move_pointer(session, Duration::ZERO, at, at)?;
            if engine.start_hover(session)? {
                std::thread::sleep(Duration::from_millis(duration));
                session.stop_hover();
            }
            report
        }
        Command::Pending => {
            let pending = engine.has_pending_events(session.target());
            println!("{}", serde_json::json!({ "pending": pending }));
            return Ok(None);
        }
    };
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("0x1A2B"), Ok(0x1A2B));
        assert_eq!(parse_handle("42"), Ok(42));
        assert!(parse_handle("window").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "synput", "--backend", "recording", "--target", "0x10", "click", "5", "6", "-b", "right",
        ])
        .unwrap();
        assert_eq!(args.target, 0x10);
        assert_eq!(args.backend, Some(BackendKind::Recording));
        assert!(matches!(args.command, Command::Click { x: 5, y: 6, button: ButtonArg::Right }));
    }

    #[test]
    fn test_chord_on_recording_backend() {
        let mut engine = InputEngine::new(synput_core::RecordingBackend::new(), EngineConfig::default()).unwrap();
        let mut session = engine.open_session(9).unwrap();
        let report = run(
            &mut engine,
            &mut session,
            Command::Chord {
                keys: vec!["ctrl".into(), "c".into()],
            },
        )
        .unwrap()
        .unwrap();
        assert!(report.is_complete());
        assert_eq!(engine.backend().events().len(), 4);
        assert!(session.synthesizer().modifiers().latched().is_empty());
    }
}
