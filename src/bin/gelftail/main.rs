// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use gelftail::init::agent::{Agent, ShutdownReport};
use gelftail::init::args::AgentArgs;
use gelftail::init::config::AgentConfig;

#[derive(Debug, Parser)]
#[command(name = "gelftail")]
#[command(bin_name = "gelftail")]
#[command(version, long_about = None)]
#[command(about = "Follow a log file and ship every line to Graylog as GELF over UDP")]
struct Arguments {
    #[arg(value_enum, long, env = "GELFTAIL_LOG_FORMAT", default_value = "text")]
    /// Log format
    log_format: LogFormatArg,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let config = match opt.agent.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&opt.log_format, opt.agent.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run_agent(config) {
        Ok(report) => {
            info!(
                reason = %report.event,
                sent = report.stats.sent,
                dropped = report.stats.dropped,
                failed = report.stats.failed,
                "Stopped gelftail."
            );
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!(error = e, "Failed to run agent.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_agent(config: AgentConfig) -> Result<ShutdownReport, BoxError> {
    let report = Agent::new(config).run(signal_wait()).await?;

    if report.forced {
        // tasks that ignored the abort would keep the runtime from shutting down
        eprintln!("shutdown was ignored, bailing out now");
        std::process::exit(1);
    }

    Ok(report)
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg, verbose: bool) -> Result<LoggerGuard, BoxError> {
    LogTracer::init().expect("Unable to setup log tracer!");

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

async fn signal_wait() -> String {
    let mut sig_term = sig(SignalKind::terminate());
    let mut sig_int = sig(SignalKind::interrupt());
    let mut sig_hup = sig(SignalKind::hangup());

    let name = select! {
        _ = sig_term.recv() => "SIGTERM",
        _ = sig_int.recv() => "SIGINT",
        _ = sig_hup.recv() => "SIGHUP",
    };
    name.to_string()
}

fn sig(kind: SignalKind) -> tokio::signal::unix::Signal {
    signal(kind).expect("Unable to install signal handler")
}
