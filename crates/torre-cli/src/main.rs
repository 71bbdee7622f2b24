// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use runtime::LiveRuntime;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;
use torre_app::{TripBackend, TripListState, parse_trips_csv};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_SEED: u64 = 42;
const DEMO_TRIP_COUNT: usize = 24;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `torre --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;
    init_logging(&config)?;

    if options.demo {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        info!(seed = DEMO_SEED, trips = DEMO_TRIP_COUNT, "starting with demo fleet");
        let backend = torre_testkit::MemoryBackend::demo(DEMO_SEED, DEMO_TRIP_COUNT, now);
        return launch(backend, &config, &options);
    }

    let base_url = config.api_base_url();
    let client = torre_api::Client::new(&base_url, config.api_timeout()?).with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;
    if options.check_only {
        client.ping()?;
        println!("ok: {} is reachable", client.base_url());
        return Ok(());
    }
    launch(client, &config, &options)
}

fn launch<B>(backend: B, config: &Config, options: &CliOptions) -> Result<()>
where
    B: TripBackend + Send + Sync + 'static,
{
    if let Some(csv_path) = &options.import_path {
        let count = import_csv(&backend, csv_path)?;
        println!("imported {count} trips from {}", csv_path.display());
        return Ok(());
    }
    if options.check_only {
        return Ok(());
    }

    let mut runtime = LiveRuntime::new(backend, config.projects(), config.settle_delay()?);
    let mut state = TripListState::new(
        config.trip_scope(),
        config.filter_scope(),
        OffsetDateTime::now_utc(),
    );
    info!(scope = config.trip_scope().as_str(), "opening trip console");
    torre_tui::run_app(&mut state, &mut runtime)
}

/// Posts every row of a trips spreadsheet in one batch. Nothing is sent when
/// any row fails to parse.
fn import_csv<B: TripBackend + ?Sized>(backend: &B, path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("open CSV {}", path.display()))?;
    let report = parse_trips_csv(file).with_context(|| format!("read CSV {}", path.display()))?;
    if report.dropped_rows > 0 {
        info!(
            dropped = report.dropped_rows,
            "skipped rows whose column count differs from the header"
        );
    }
    let trips = report.into_trips()?;
    let created = backend
        .create_trips(&trips)
        .with_context(|| format!("import {} trips", trips.len()))?;
    info!(count = created.len(), path = %path.display(), "trips imported");
    Ok(created.len())
}

fn init_logging(config: &Config) -> Result<()> {
    let log_path = config.log_file()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].file to a writable path",
                log_path.display()
            )
        })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level()))
        .with_context(|| format!("invalid [log].level {:?}", config.log_level()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_example: bool,
    demo: bool,
    check_only: bool,
    import_path: Option<PathBuf>,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_example: false,
        demo: false,
        check_only: false,
        import_path: None,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--import" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--import requires a CSV file path"))?;
                options.import_path = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => options.print_config_path = true,
            "--print-example-config" => options.print_example = true,
            "--demo" => options.demo = true,
            "--check" => options.check_only = true,
            "--help" | "-h" => options.show_help = true,
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("torre: fleet trip control console");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch against an in-memory demo fleet");
    println!("  --check                  Validate config and reach the trips API");
    println!("  --import <csv>           Create trips from a spreadsheet export and exit");
    println!("  --help                   Show this help");
}
