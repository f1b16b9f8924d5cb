//! Daemon Supervision: the root command that wires every component
//! together under one cancellation token and waits on OS signals.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Configuration;
use crate::error::{DaemonError, Result};
use crate::lb::{self, LbClient};
use crate::monitor::listener;
use crate::monitor::{AutoscalerConfig, Supervisor};
use crate::runtime::DockerRuntime;
use crate::scale::Scaler;

/// Runs the daemon until a termination signal is received or a
/// component fails fatally. Returns `Err` only on a propagated fatal
/// error (§6: exit code 1); a clean shutdown returns `Ok(())`.
pub async fn run(config_path: &str) -> Result<()> {
    let config = if std::path::Path::new(config_path).exists() {
        Configuration::load(config_path).map_err(|e| {
            DaemonError::Other(format!(
                "failed to load configuration from {}: {:#}",
                config_path, e
            ))
        })?
    } else {
        info!(path = %config_path, "no config file found, using defaults");
        Configuration::default()
    };

    info!(
        max_monitors = config.max_monitors,
        warmup_secs = config.warmup_secs,
        cooldown_secs = config.cooldown_secs,
        lb_bind = %config.lb_bind,
        "golypus starting"
    );

    let runtime = Arc::new(DockerRuntime::connect()?);
    let lb_client = Arc::new(LbClient::new(config.lb_client_url()));
    let scaler = Arc::new(Scaler::new(runtime.clone(), lb_client));

    let root_token = CancellationToken::new();

    let autoscaler_config = AutoscalerConfig {
        cooldown: config.cooldown(),
        poll_idle: config.poll_idle(),
    };

    let supervisor = Arc::new(Supervisor::new(
        runtime.clone(),
        scaler.clone(),
        autoscaler_config,
        config.max_monitors,
        root_token.child_token(),
    ));

    let listener_token = root_token.child_token();
    let listener_runtime = runtime.clone();
    let listener_supervisor = supervisor.clone();
    let warmup = config.warmup();
    let mut listener_handle = tokio::spawn(async move {
        listener::run(listener_runtime, listener_supervisor, warmup, listener_token).await
    });

    let control_plane_token = root_token.child_token();
    let lb_bind = config.lb_bind.clone();
    let lb_path = config.lb_path.clone();
    let mut control_plane_handle =
        tokio::spawn(async move { lb::run_control_plane(&lb_bind, &lb_path, control_plane_token).await });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let mut listener_result: Option<Result<()>> = None;
    let mut control_plane_result: Option<Result<()>> = None;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigquit.recv() => info!("received SIGQUIT, shutting down (draining)"),
        result = &mut listener_handle => {
            warn!("event listener exited before a shutdown signal was received");
            listener_result = Some(listener_outcome(result));
        }
        result = &mut control_plane_handle => {
            warn!("lb control plane exited before a shutdown signal was received");
            control_plane_result = Some(control_plane_outcome(result));
        }
    }

    root_token.cancel();
    supervisor.shutdown().await;

    let listener_result = match listener_result {
        Some(r) => r,
        None => listener_outcome(listener_handle.await),
    };
    let control_plane_result = match control_plane_result {
        Some(r) => r,
        None => control_plane_outcome(control_plane_handle.await),
    };

    listener_result?;
    control_plane_result?;

    info!("golypus stopped");
    Ok(())
}

fn listener_outcome(
    joined: std::result::Result<
        std::result::Result<(), listener::ListenerError>,
        tokio::task::JoinError,
    >,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "event listener failed");
            Err(e.into())
        }
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => {
            error!(error = %e, "event listener task panicked");
            Err(e.into())
        }
    }
}

fn control_plane_outcome(
    joined: std::result::Result<
        std::result::Result<(), lb::ControlPlaneError>,
        tokio::task::JoinError,
    >,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "lb control plane failed");
            Err(e.into())
        }
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => {
            error!(error = %e, "lb control plane task panicked");
            Err(e.into())
        }
    }
}
