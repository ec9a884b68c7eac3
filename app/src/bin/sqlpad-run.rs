use std::io;
use std::path::PathBuf;
use std::time::Instant;

use sqlpad_adapters::export::{export_result, ExportFormat};
use sqlpad_core::config::WorkbenchConfig;
use sqlpad_core::session::Session;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseOutcome {
    Config,
    HelpRequested,
}

#[derive(Debug, Clone, Default)]
struct RunConfig {
    config_path: Option<PathBuf>,
    query_id: Option<String>,
    sql: Option<String>,
    format: Option<ExportFormat>,
    out: Option<PathBuf>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct RunSummary {
    query_id: String,
    tab_name: String,
    rows: usize,
    execution_time: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let run = parse_args()?;
    let workbench = load_config(&run)?;
    let mut session = Session::from_config(&workbench)?;

    let summary = run_headless(&mut session, &run).await?;
    println!("metric.query_id={}", summary.query_id);
    println!("metric.output_tab={}", summary.tab_name);
    println!("metric.rows={}", summary.rows);
    println!("metric.execution_time={}", summary.execution_time);

    if let Some(out) = &run.out {
        let format = resolve_format(&run, out)?;
        let rows = session
            .tabs()
            .active_cached_result()
            .ok_or_else(|| io_other("query produced no rows to export"))?;
        let written = export_result(out, format, rows.rows())?;
        println!("metric.exported_rows={written}");
        println!("metric.export_path={}", out.display());
    }

    session.teardown();
    Ok(())
}

fn load_config(run: &RunConfig) -> Result<WorkbenchConfig, Box<dyn std::error::Error>> {
    let mut workbench = match &run.config_path {
        Some(path) => WorkbenchConfig::load_from_path(path.clone())?,
        None => WorkbenchConfig::load_default()?,
    };
    let execution = &mut workbench.settings_mut().execution;
    if let Some(min) = run.min_delay_ms {
        execution.min_delay_ms = min;
    }
    if let Some(max) = run.max_delay_ms {
        execution.max_delay_ms = max;
    }
    execution.validate()?;
    Ok(workbench)
}

async fn run_headless(session: &mut Session, run: &RunConfig) -> io::Result<RunSummary> {
    let now = Instant::now();
    match (&run.query_id, &run.sql) {
        (Some(query_id), None) => {
            if !session.select_fixture(query_id) {
                return Err(io_other(format!("unknown query id `{query_id}`")));
            }
            session.execute(now).map_err(io_other)?;
        }
        (None, Some(sql)) => {
            session.execute_text(sql, now).map_err(io_other)?;
        }
        (None, None) => {
            session.execute(now).map_err(io_other)?;
        }
        (Some(_), Some(_)) => {
            return Err(io_other("`--query-id` and `--sql` cannot be combined"));
        }
    }

    let finished = session.run_until_idle().await;
    tracing::debug!(finished, "headless run drained");

    let tab = session
        .tabs()
        .active_output_tab()
        .ok_or_else(|| io_other("no output tab was created"))?;
    let cached = tab.cached();
    Ok(RunSummary {
        query_id: tab.query_id().unwrap_or_default().to_string(),
        tab_name: tab.name().to_string(),
        rows: cached.map_or(0, |cached| cached.rows().len()),
        execution_time: cached
            .and_then(|cached| cached.execution_time())
            .unwrap_or("n/a")
            .to_string(),
    })
}

fn resolve_format(run: &RunConfig, out: &std::path::Path) -> io::Result<ExportFormat> {
    if let Some(format) = run.format {
        return Ok(format);
    }
    match out.extension().and_then(|extension| extension.to_str()) {
        Some(extension) => extension.parse::<ExportFormat>().map_err(io_other),
        None => Ok(ExportFormat::Csv),
    }
}

fn parse_args() -> io::Result<RunConfig> {
    let mut config = RunConfig::default();
    let outcome = parse_args_from(std::env::args().skip(1), &mut config)?;
    if outcome == ParseOutcome::HelpRequested {
        print_help();
        std::process::exit(0);
    }
    Ok(config)
}

fn parse_args_from(
    args: impl IntoIterator<Item = String>,
    config: &mut RunConfig,
) -> io::Result<ParseOutcome> {
    let mut args = args.into_iter();

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-h" | "--help" => return Ok(ParseOutcome::HelpRequested),
            "--config" => config.config_path = Some(next_value(&mut args, "--config")?.into()),
            "--query-id" => config.query_id = Some(next_value(&mut args, "--query-id")?),
            "--sql" => config.sql = Some(next_value(&mut args, "--sql")?),
            "--format" => {
                config.format = Some(
                    next_value(&mut args, "--format")?
                        .parse::<ExportFormat>()
                        .map_err(io_other)?,
                );
            }
            "--out" => config.out = Some(next_value(&mut args, "--out")?.into()),
            "--min-delay-ms" => {
                config.min_delay_ms = Some(
                    next_value(&mut args, "--min-delay-ms")?
                        .parse::<u64>()
                        .map_err(|error| {
                            io_other(format!("invalid --min-delay-ms value: {error}"))
                        })?,
                );
            }
            "--max-delay-ms" => {
                config.max_delay_ms = Some(
                    next_value(&mut args, "--max-delay-ms")?
                        .parse::<u64>()
                        .map_err(|error| {
                            io_other(format!("invalid --max-delay-ms value: {error}"))
                        })?,
                );
            }
            _ => {
                return Err(io_other(format!("unknown argument `{flag}`")));
            }
        }
    }

    Ok(ParseOutcome::Config)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> io::Result<String> {
    args.next()
        .ok_or_else(|| io_other(format!("missing value for `{flag}`")))
}

fn print_help() {
    println!(
        "sqlpad headless runner\n\n\
Usage:\n  cargo run -p sqlpad-app --bin sqlpad-run -- [OPTIONS]\n\n\
Options:\n  --config <path>         Config file (default: platform config dir)\n  --query-id <id>         Predefined query to run (default: the first one)\n  --sql <text>            Query text; must match a predefined query\n  --format <csv|json>     Export format (default: from --out extension)\n  --out <path>            Write the result rows to this file\n  --min-delay-ms <ms>     Lower bound of the simulated latency\n  --max-delay-ms <ms>     Upper bound of the simulated latency\n\n\
Environment:\n  SQLPAD_CONFIG_DIR overrides the config directory, RUST_LOG the log filter.\n"
    );
}

fn io_other(error: impl std::fmt::Display) -> io::Error {
    io::Error::other(error.to_string())
}
