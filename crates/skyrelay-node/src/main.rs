mod config;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use skyrelay_feed::opensky::redacted_root_url;
use skyrelay_feed::OpenSkyClient;
use skyrelay_server::serve_relay;

use config::{describe_bounds, Cli, ObservabilityConfig, Settings};

/// Bad arguments or configuration.
const EXIT_USAGE: u8 = 1;
/// Anything that stops the relay once it is running.
const EXIT_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let settings = match config::load(&cli).and_then(config::Config::resolve) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("skyrelay: {e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_tracing(&settings.observability);
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "unrecoverable failure");
        std::process::exit(i32::from(EXIT_FAILURE));
    }));

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "relay failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_tracing(observability: &ObservabilityConfig) {
    match observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&observability.log_level)
                .init();
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let os = &settings.opensky;
    tracing::info!(
        user = os.credentials.as_ref().map_or("anonymous", |c| c.user.as_str()),
        root_url = %redacted_root_url(&os.root_url),
        interval_secs = settings.relay.poll_interval.as_secs(),
        icao24 = %os.icao24s.join("-"),
        bounds = %describe_bounds(os.bounds),
        port = settings.listen.port(),
        tickle_secs = settings.relay.tickle_interval.as_secs(),
        json_file = ?os.json_dump,
        "relay starting"
    );

    let feed = OpenSkyClient::new(settings.opensky).context("failed to create OpenSky client")?;
    let shutdown = CancellationToken::new();
    let serve = serve_relay(settings.listen, feed, settings.relay, shutdown.clone());
    tokio::pin!(serve);

    tokio::select! {
        res = &mut serve => {
            return res.with_context(|| format!("relay on {} stopped", settings.listen));
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
        }
    }

    tracing::info!("shutdown requested");
    shutdown.cancel();
    serve.await.context("relay shutdown failed")
}
