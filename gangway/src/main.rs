use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gangway::cli::Cli;
use gangway::{ServerConfig, SpaMode, build_router, build_state};
use gangway_processes::supervisor::DEFAULT_GRACE_PERIOD;
use gangway_processes::{ProcessEvent, RunOptions, StreamKind, Supervisor};
use gangway_tunnel::{Provider, TunnelManager, TunnelOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gangway::log::init(cli.verbose, cli.quiet);

    let root = cli
        .dir
        .canonicalize()
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot serve {}", cli.dir.display()))?;

    // Supervised process output passes straight through to the terminal.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let supervisor = Arc::new(Supervisor::new(events_tx));
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ProcessEvent::Output {
                    stream: StreamKind::Stdout,
                    text,
                } => println!("{text}"),
                ProcessEvent::Output {
                    stream: StreamKind::Stderr,
                    text,
                } => eprintln!("{text}"),
                ProcessEvent::Exited { code, signal } => {
                    info!(
                        "process exited (code {:?}, signal {:?})",
                        code,
                        signal.as_deref()
                    );
                }
                ProcessEvent::SpawnFailed { message } => {
                    error!("process failed: {message}");
                }
            }
        }
    });

    let run_options = RunOptions {
        cwd: Some(root.clone()),
        name: cli.name.clone(),
        watch: cli.watch,
    };
    if let Some(script) = &cli.run {
        supervisor.start(gangway_processes::npm_script(script, &run_options)?)?;
    } else if let Some(command) = &cli.exec {
        supervisor.start(gangway_processes::direct(command, &run_options)?)?;
    } else if let Some(target) = &cli.pm2 {
        supervisor.start(gangway_processes::pm2(target, &run_options).await?)?;
    }

    let tunnel = Arc::new(TunnelManager::new());
    if let Some(provider_name) = &cli.tunnel {
        let provider = Provider::from_name(Some(provider_name.as_str()));
        let options = TunnelOptions {
            subdomain: cli.subdomain.clone(),
            authtoken: cli.authtoken.clone(),
        };
        start_tunnel(&tunnel, cli.port, provider, &options);
    }

    let spa = if cli.spa {
        SpaMode::All
    } else if cli.spa_ignore_assets {
        SpaMode::IgnoreAssets
    } else {
        SpaMode::Off
    };
    let config = ServerConfig {
        root: root.clone(),
        spa,
        rate_limit: cli.rate_limit,
        upload: cli.upload,
        log_file: cli.log_file.clone(),
    };
    let run_requested = cli.run.is_some() || cli.exec.is_some() || cli.pm2.is_some();
    let state = build_state(
        &config,
        run_requested.then(|| Arc::clone(&supervisor)),
        cli.tunnel.is_some().then(|| Arc::clone(&tunnel)),
    )
    .into_diagnostic()?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to bind port {}", cli.port))?;
    info!(
        "serving {} at http://localhost:{}",
        root.display(),
        cli.port
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .into_diagnostic()?;

    // Shutdown sequence: graceful-then-forceful for the child, then the
    // tunnel backend.
    supervisor.stop();
    tunnel.stop();
    wait_for_process_exit(&supervisor, DEFAULT_GRACE_PERIOD + Duration::from_secs(1)).await;

    Ok(())
}

/// Tunnel startup is best-effort: a missing or broken backend must not take
/// the local server down with it.
fn start_tunnel(tunnel: &TunnelManager, port: u16, provider: Provider, options: &TunnelOptions) {
    if let Err(e) = tunnel.start(port, provider, options) {
        warn!("tunnel not started ({e}); continuing without a public URL");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
    }
    info!("shutting down");
}

/// Give the supervisor's stop sequence time to finish (including a possible
/// forceful kill) before the process exits.
async fn wait_for_process_exit(supervisor: &Supervisor, deadline: Duration) {
    let start = Instant::now();
    while supervisor.is_running() && start.elapsed() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if supervisor.is_running() {
        warn!("supervised process did not exit before shutdown deadline");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tunnel_failure_does_not_abort_startup() {
        let tunnel = TunnelManager::new();
        // The localtonet client is not installed in the test environment, so
        // the spawn fails; startup shrugs it off and the slot stays vacant.
        start_tunnel(&tunnel, 39999, Provider::Localtonet, &TunnelOptions::default());
        assert!(!tunnel.is_running());
    }
}
