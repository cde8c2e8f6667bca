//! rpgtop - top-like live view of PostgreSQL backends.
//!
//! Usage:
//!   rpgtop                          # local server via the default socket
//!   rpgtop -h db1 -U app -d appdb   # remote server, no OS statistics
//!   rpgtop --service reporting      # parameters from ~/.pg_service.conf
//!   rpgtop --output snapshots.jsonl # also append every snapshot as JSON lines

use std::any::Any;
use std::fs::OpenOptions;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use rpgtop::collector::{DiskStatsSampler, PgConnector, ProcMerger, RealFs};
use rpgtop::config::{Config, ConnectionOverrides, DisplayFlags, clamp_refresh};
use rpgtop::error::AppError;
use rpgtop::export::Exporter;
use rpgtop::lifecycle::{Controller, Exit, install_signal_handler};
use rpgtop::poll::{CycleOptions, PollCycle, extras_for};
use rpgtop::session::{Session, SessionError};
use rpgtop::source::SourceError;
use rpgtop::tui::{CrosstermInput, CrosstermScreen, ScreenGuard, TerminalPrompt, TuiRenderer};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Live view of PostgreSQL backend activity.
#[derive(Parser, Debug)]
#[command(name = "rpgtop", version, about = "PostgreSQL activity monitor", disable_help_flag = true)]
struct Args {
    /// Database server host or socket directory.
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Database server port.
    #[arg(short = 'p', long)]
    port: Option<String>,

    /// Database user name.
    #[arg(short = 'U', long)]
    username: Option<String>,

    /// Database name to connect to.
    #[arg(short = 'd', long)]
    dbname: Option<String>,

    /// Service name from the libpq service file.
    #[arg(long)]
    service: Option<String>,

    /// disable, prefer or require.
    #[arg(long)]
    sslmode: Option<String>,

    /// Amazon RDS: never read OS statistics, hide `rdsadmin`.
    #[arg(long)]
    rds: bool,

    /// Skip total database size (pg_database_size is slow on big clusters).
    #[arg(long)]
    no_db_size: bool,

    /// Hide queries running for less than SECONDS.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    min_duration: f64,

    /// Refresh delay, 0.5 to 5 seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 2.0)]
    refresh: f64,

    /// Append every snapshot to PATH as JSON lines.
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write logs to PATH (the terminal is taken by the UI).
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Print full diagnostics on fatal errors.
    #[arg(long)]
    debug: bool,

    /// Never prompt for a password.
    #[arg(short = 'w', long)]
    no_password: bool,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    #[arg(long)]
    no_database: bool,
    #[arg(long)]
    no_user: bool,
    #[arg(long)]
    no_client: bool,
    #[arg(long)]
    no_cpu: bool,
    #[arg(long)]
    no_mem: bool,
    #[arg(long)]
    no_read: bool,
    #[arg(long)]
    no_write: bool,
    #[arg(long)]
    no_time: bool,
    #[arg(long)]
    no_wait: bool,
    #[arg(long)]
    no_app_name: bool,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    fn into_config(self) -> Result<Config, AppError> {
        let refresh = Duration::try_from_secs_f64(self.refresh)
            .map_err(|_| AppError::Config(format!("invalid refresh delay: {}", self.refresh)))?;
        if !(self.min_duration >= 0.0) {
            return Err(AppError::Config(format!(
                "invalid minimum duration: {}",
                self.min_duration
            )));
        }

        let overrides = ConnectionOverrides {
            host: self.host,
            port: self.port,
            user: self.username,
            dbname: self.dbname,
            service: self.service,
            sslmode: self.sslmode,
            rds_mode: self.rds,
        };
        let connection = overrides.resolve(&|key| std::env::var(key).ok(), &|path| {
            std::fs::read_to_string(path)
        })?;

        Ok(Config {
            connection,
            flags: DisplayFlags {
                database: !self.no_database,
                app_name: !self.no_app_name,
                user: !self.no_user,
                client: !self.no_client,
                cpu: !self.no_cpu,
                mem: !self.no_mem,
                read: !self.no_read,
                write: !self.no_write,
                time: !self.no_time,
                wait: !self.no_wait,
            },
            refresh: clamp_refresh(refresh),
            min_duration: self.min_duration,
            skip_sizes: self.no_db_size,
            output: self.output,
            debug: self.debug,
            prompt_password: !self.no_password,
            proc_path: self.proc_path,
        })
    }
}

fn init_logging(path: &Path, verbose: u8) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("rpgtop={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

/// Restores the terminal before anything is printed about a panic. The
/// default report is only shown with `--debug`.
fn install_panic_hook(guard: Arc<ScreenGuard>, debug: bool) {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        guard.release();
        if debug {
            original_hook(info);
        }
    }));
}

/// Runs `f`, turning a panic into an unclassified fatal exit. The terminal
/// is released on return either way.
fn run_guarded(guard: &ScreenGuard, f: impl FnOnce() -> Exit) -> Exit {
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    guard.release();
    match result {
        Ok(exit) => exit,
        Err(payload) => Exit::Fatal(AppError::Unclassified(panic_message(payload.as_ref()))),
    }
}

fn startup_error(e: SourceError) -> AppError {
    if e.is_connection_loss() {
        AppError::Connection(e.to_string())
    } else {
        AppError::Unclassified(e.to_string())
    }
}

fn run(config: Config, guard: Arc<ScreenGuard>) -> Exit {
    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_signal_handler(Arc::clone(&shutdown), Arc::clone(&guard)) {
        return Exit::Fatal(AppError::Unclassified(format!(
            "cannot install signal handler: {}",
            e
        )));
    }

    let mut session = Session::new(
        PgConnector::new(&config.proc_path),
        config.connection.clone(),
    );
    if config.prompt_password {
        session = session.with_prompt(Box::new(TerminalPrompt));
    }
    match session.connect(true) {
        Ok(()) => {}
        Err(SessionError::Fatal(e)) => return Exit::Fatal(e),
        Err(SessionError::ConnectionFailed(msg)) => {
            return Exit::Fatal(AppError::Connection(msg));
        }
    }

    let local_access = match session.detect_local_access() {
        Ok(local_access) => local_access,
        Err(e) => return Exit::Fatal(startup_error(e)),
    };
    if !local_access {
        info!(
            "no local access to {}, OS statistics disabled",
            config.connection.identity()
        );
    }
    let extras = match extras_for(&mut session, local_access) {
        Ok(extras) => extras,
        Err(e) => return Exit::Fatal(startup_error(e)),
    };

    let cycle = PollCycle::new(
        ProcMerger::new(RealFs::new(), &config.proc_path).with_min_duration(config.min_duration),
        DiskStatsSampler::with_paths(RealFs::new(), &config.proc_path, "/sys/block"),
        local_access,
        extras,
        CycleOptions {
            flags: config.flags,
            skip_sizes: config.skip_sizes,
            refresh: config.refresh,
        },
    );
    let renderer = match TuiRenderer::new() {
        Ok(renderer) => renderer,
        Err(e) => return Exit::Fatal(AppError::Display(e.to_string())),
    };

    let mut controller = Controller::new(
        session,
        cycle,
        renderer,
        CrosstermInput,
        guard,
        shutdown,
        config.refresh,
    );
    if let Some(path) = &config.output {
        match Exporter::create(path) {
            Ok(exporter) => controller = controller.with_exporter(exporter),
            Err(e) => {
                return Exit::Fatal(AppError::Config(format!(
                    "cannot open {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    controller.run()
}

fn main() {
    let args = Args::parse();

    if let Some(path) = &args.log_file
        && let Err(e) = init_logging(path, args.verbose)
    {
        eprintln!("rpgtop: cannot open log file {}: {}", path.display(), e);
        std::process::exit(1);
    }

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rpgtop: {}", e.short_message());
            std::process::exit(e.exit_code());
        }
    };
    let debug = config.debug;

    let guard = Arc::new(ScreenGuard::new(CrosstermScreen));
    install_panic_hook(Arc::clone(&guard), debug);

    let exit = run_guarded(&guard, || run(config, Arc::clone(&guard)));
    if let Exit::Fatal(e) = &exit {
        eprintln!("rpgtop: {}", e.report(debug));
    }
    std::process::exit(exit.code());
}
