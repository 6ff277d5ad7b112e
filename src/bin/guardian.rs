// Guardian CLI - drives a safety session from terminal commands
// Useful for drills: every panic step runs against local adapters

use anyhow::{Context, Result};
use clap::Parser;
use guardian::app_state::{
    PANIC_TAPS_DEFAULT, PANIC_TAPS_MAX, PANIC_TAPS_MIN, STEALTH_TIMEOUT_DEFAULT_MINUTES,
    STEALTH_TIMEOUT_MAX_MINUTES, STEALTH_TIMEOUT_MIN_MINUTES,
};
use guardian::panic::{PanicServices, PanicSettings};
use guardian::platform::local::{
    ContactDirectory, JsonlIncidentRecorder, LogDispatcher, OfflineAuth, StaticLocation,
};
use guardian::platform::store::FileStore;
use guardian::platform::{
    for_current_platform, AppTransition, KeyValueStore, LifecycleHub, ProcessController,
    RetainProcess,
};
use guardian::{config, config_file::Config, ui, SafetySession, SessionSettings};
use log::{error, info, warn};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

/// Personal-safety drill harness: panic gesture, panic sequence and stealth mode
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Personal-safety drill harness: panic gesture, panic sequence and stealth mode",
    long_about = "Personal-safety drill harness: panic gesture, panic sequence and stealth mode.

SETUP:
  Before using Guardian, run the setup command to configure your unlock code:
    guardian --setup

  Configuration is stored at the platform config directory, for example:
    ~/.config/guardian/config.toml

COMMANDS (one per line on stdin):
  tap              Register one tap toward the panic gesture
  touch            Register a user interaction (restarts the stealth timeout)
  background       Simulate the app moving to the background
  foreground       Simulate the app returning to the foreground
  stealth          Enter stealth mode
  unlock <code>    Leave stealth mode
  panic            Trigger the panic sequence directly
  status           Show session status
  quit             Exit"
)]
struct Args {
    /// Run interactive setup to configure the unlock code and settings
    #[arg(long)]
    setup: bool,

    /// Start in stealth mode
    #[arg(long)]
    stealth: bool,

    /// Stealth auto-timeout in minutes (1-60, overrides config file)
    #[arg(long)]
    stealth_timeout: Option<u64>,

    /// Taps in the panic gesture (2-10, overrides config file)
    #[arg(long)]
    panic_taps: Option<u32>,

    /// Keep the process alive after a panic run instead of exiting
    #[arg(long)]
    drill: bool,
}

/// Helper function to prompt for a number with a default value
fn prompt_number(prompt: &str, default: u64) -> Result<u64> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        Ok(default)
    } else {
        input
            .parse::<u64>()
            .with_context(|| format!("Invalid number: {}", input))
    }
}

/// Run interactive setup to configure the unlock code and settings
fn run_setup() -> Result<()> {
    println!("Guardian Setup");
    println!("==============\n");

    // Non-echoing: the unlock code is typed on the disguise screen
    let code = rpassword::prompt_password("Enter stealth unlock code: ")
        .context("Failed to read unlock code")?;

    if code.trim().is_empty() {
        anyhow::bail!("Error: Unlock code cannot be empty");
    }

    let confirm = rpassword::prompt_password("Confirm unlock code: ")
        .context("Failed to read confirmation")?;

    if code != confirm {
        anyhow::bail!("Error: Unlock codes do not match");
    }

    let stealth_timeout = prompt_number(
        &format!(
            "Stealth auto-timeout in minutes (default: {}): ",
            STEALTH_TIMEOUT_DEFAULT_MINUTES
        ),
        STEALTH_TIMEOUT_DEFAULT_MINUTES,
    )?;

    let panic_taps = prompt_number(
        &format!("Taps in the panic gesture (default: {}): ", PANIC_TAPS_DEFAULT),
        u64::from(PANIC_TAPS_DEFAULT),
    )?;

    let mut cfg = Config::new(&code, stealth_timeout).context("Failed to create configuration")?;
    cfg.panic_tap_count = u32::try_from(panic_taps).context("Tap count out of range")?;
    cfg.validate().context("Invalid settings")?;

    cfg.save().context("Failed to save configuration")?;

    println!("\nConfiguration saved to: {}", Config::config_path()?.display());
    println!("Add trusted contacts under [[contacts]] in that file.");
    println!("Setup complete!");
    println!("\nYou can now run 'guardian' to start a session.");

    Ok(())
}

/// Precedence: CLI arg > env var > config file
fn resolve_stealth_timeout(arg: Option<u64>, cfg: &Config) -> u64 {
    match arg {
        Some(minutes)
            if (STEALTH_TIMEOUT_MIN_MINUTES..=STEALTH_TIMEOUT_MAX_MINUTES).contains(&minutes) =>
        {
            info!("Stealth timeout set via --stealth-timeout: {} minutes", minutes);
            minutes
        }
        Some(minutes) => {
            warn!(
                "Invalid --stealth-timeout value: {} (must be {}-{} minutes). Using config file or environment variable.",
                minutes, STEALTH_TIMEOUT_MIN_MINUTES, STEALTH_TIMEOUT_MAX_MINUTES
            );
            config::parse_stealth_timeout().unwrap_or(cfg.stealth_timeout_minutes)
        }
        None => config::parse_stealth_timeout().unwrap_or(cfg.stealth_timeout_minutes),
    }
}

fn resolve_panic_taps(arg: Option<u32>, cfg: &Config) -> u32 {
    match arg {
        Some(taps) if (PANIC_TAPS_MIN..=PANIC_TAPS_MAX).contains(&taps) => {
            info!("Panic gesture set via --panic-taps: {} taps", taps);
            taps
        }
        Some(taps) => {
            warn!(
                "Invalid --panic-taps value: {} (must be {}-{}). Using config file or environment variable.",
                taps, PANIC_TAPS_MIN, PANIC_TAPS_MAX
            );
            config::parse_panic_taps().unwrap_or(cfg.panic_tap_count)
        }
        None => config::parse_panic_taps().unwrap_or(cfg.panic_tap_count),
    }
}

fn print_status(session: &SafetySession) {
    println!(
        "stealth: {}  panic enabled: {}  panic executing: {}  pending taps: {}  foreground: {}",
        session.is_stealth_active(),
        session.state.is_panic_enabled(),
        session.is_panic_executing(),
        session.pending_taps(),
        session.state.is_foreground(),
    );
    if let Some(remaining) = session.stealth_remaining() {
        println!("stealth times out in {}s", remaining.as_secs());
    }
}

async fn collect_panic_report(session: &SafetySession) {
    if let Some(report) = session.wait_for_panic().await {
        println!(
            "panic run finished: {} alert(s) sent, {} failed, {} step failure(s)",
            report.alerts_sent,
            report.alerts_failed,
            report.failures.len()
        );
        ui::notifications::show_help_sent_notification(&report);
    }
}

async fn run_session(args: Args, cfg: Config, unlock_code: String) -> Result<()> {
    let data_dir = cfg.resolve_data_dir()?;
    info!("Data directory: {}", data_dir.display());

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir.join("store.json")));
    let process: Arc<dyn ProcessController> = if args.drill {
        info!("Drill mode: the process stays alive after a panic run");
        Arc::new(RetainProcess)
    } else {
        for_current_platform()
    };

    let services = PanicServices {
        store: Arc::clone(&store),
        auth: Arc::new(OfflineAuth::new(store)),
        location: Arc::new(StaticLocation::new(cfg.location)),
        directory: Arc::new(ContactDirectory::new(cfg.contacts.clone())),
        dispatcher: Arc::new(LogDispatcher),
        incidents: Arc::new(JsonlIncidentRecorder::new(data_dir.join("incidents.jsonl"))),
        process,
    };
    let panic_settings = PanicSettings {
        alert_radius_km: cfg.alert_radius_km,
        ..PanicSettings::default()
    };
    let settings = SessionSettings {
        panic_taps: resolve_panic_taps(args.panic_taps, &cfg),
        tap_window: Duration::from_millis(cfg.panic_tap_window_ms),
        stealth_timeout_minutes: resolve_stealth_timeout(args.stealth_timeout, &cfg),
        ..SessionSettings::default()
    };

    let hub = LifecycleHub::new();
    let session = SafetySession::new(services, Arc::new(hub.clone()), settings, panic_settings)
        .context("Invalid session settings")?;
    session.set_unlock_code(&unlock_code);
    session
        .enable_panic_gesture()
        .context("Failed to enable panic gesture")?;

    if args.stealth {
        session
            .enter_stealth()
            .context("Failed to enter stealth mode")?;
        info!("Starting in STEALTH mode (--stealth flag)");
    }

    info!("Guardian is running - type 'quit' to exit");
    print_status(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };

        match command {
            "tap" => {
                if session.record_tap(Instant::now()) {
                    collect_panic_report(&session).await;
                }
            }
            "touch" => session.record_interaction(),
            "background" => hub.emit(AppTransition::Background),
            "foreground" => hub.emit(AppTransition::Foreground),
            "stealth" => match session.enter_stealth() {
                Ok(_) => println!("stealth mode on"),
                Err(e) => error!("Failed to enter stealth mode: {}", e),
            },
            "unlock" => {
                let code = parts.collect::<Vec<_>>().join(" ");
                if session.exit_stealth(&code) {
                    println!("stealth mode off");
                } else {
                    println!("still in stealth mode");
                }
            }
            "panic" => {
                if session.trigger_panic() {
                    collect_panic_report(&session).await;
                } else {
                    println!("panic sequence already ran this session");
                }
            }
            "status" => print_status(&session),
            "quit" | "exit" => break,
            other => warn!("Unknown command: {}", other),
        }
    }

    info!("Session ended");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.setup {
        return run_setup();
    }

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting Guardian");

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            error!("\nRun 'guardian --setup' to configure the application.");
            std::process::exit(1);
        }
    };

    let unlock_code = match cfg.get_unlock_code() {
        Ok(code) => code,
        Err(e) => {
            error!("Failed to decrypt unlock code: {:#}", e);
            error!("Your configuration file may be corrupted.");
            error!("Run 'guardian --setup' to reconfigure.");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run_session(args, cfg, unlock_code))?;

    info!("CLI shutdown complete");
    Ok(())
}
