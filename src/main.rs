use std::process::ExitCode;

use log::{error, info};

use ss_relay::config::Config;
use ss_relay::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            // The logger isn't initialized yet at this point (it depends on
            // the config's verbosity), so a bad config is reported directly.
            eprintln!("ss-relayd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logger(config.verbose);

    if let Some(path) = &config.pid_file {
        if let Err(e) = write_pid_file(path) {
            error!("failed to write pid file {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "ss-relayd started, method={}, connect_timeout={}s",
        config.method, config.timeout_secs
    );

    tokio::select! {
        _ = server.serve() => {}
        _ = shutdown_signal() => {
            info!("shutting down");
        }
    }

    ExitCode::SUCCESS
}

fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose && std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn write_pid_file(path: &std::path::Path) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = ctrl_c => {}
    }
}
