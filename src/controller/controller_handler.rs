use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::command_channel::{CommandChannel, FileCommandChannel};
use crate::configuration::config::Config;
use crate::data_capture::{CaptureProvider, CommandCamera};
use crate::error_handling::types::*;
use crate::reconciliation::artifact::sweep_stale;
use crate::reconciliation::{CaptureCycle, CycleSettings, Reconciler, RunSummary};
use crate::storage::{ArtifactStore, FileArtifactStore, FileResultLedger, ResultLedger};

/// The four collaborators a capture cycle is wired to.
#[derive(Clone)]
pub struct Components {
    pub camera: Arc<dyn CaptureProvider>,
    pub store: Arc<dyn ArtifactStore>,
    pub ledger: Arc<dyn ResultLedger>,
    pub channel: Arc<dyn CommandChannel>,
}

pub struct Controller {
    components: Components,
    settings: CycleSettings,
}

impl Controller {
    /// Validates `config`, prepares the work directory and builds the local
    /// backends. Nothing is watched until [`Controller::run`].
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("[+] Creating controller");
        config.validate()?;

        let work_dir = &config.cycle.work_dir;
        std::fs::create_dir_all(work_dir).map_err(|e| {
            ControllerError::InitializationFailed(format!(
                "cannot create work directory {}: {}",
                work_dir.display(),
                e
            ))
        })?;
        match sweep_stale(work_dir) {
            Ok(0) => {}
            Ok(n) => warn!("Removed {} stale artifact(s) from {}", n, work_dir.display()),
            Err(e) => warn!("Unable to sweep {}: {}", work_dir.display(), e),
        }

        let components = Components {
            camera: Arc::new(CommandCamera::new(&config.camera, work_dir)),
            store: Arc::new(FileArtifactStore::from_config(&config.storage)?),
            ledger: Arc::new(FileResultLedger::from_config(&config.ledger)?),
            channel: Arc::new(FileCommandChannel::from_config(&config.command)),
        };
        debug!("Backends ready: {:?}", config.storage.visibility);

        Ok(Self::with_components(
            components,
            CycleSettings::from_config(&config),
        ))
    }

    pub fn with_components(components: Components, settings: CycleSettings) -> Self {
        Self {
            components,
            settings,
        }
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<RunSummary, ControllerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the reconciliation loop until `stop` resolves or the command
    /// subscription ends, then waits for the in-flight cycle to finish.
    pub async fn run_until<F>(&self, stop: F) -> Result<RunSummary, ControllerError>
    where
        F: Future<Output = ()>,
    {
        let channel = Arc::clone(&self.components.channel);
        match channel.read().await {
            Ok(Some(record)) => info!(
                "Command record present (requested: {}, last processed: {:?})",
                record.is_requested, record.last_processed
            ),
            Ok(None) => warn!("Command record does not exist yet, waiting for it"),
            Err(e) => warn!("Unable to read command record: {}", e),
        }

        let subscription = channel.watch().await?;
        info!("[+] Watching command record");

        let cycle = Arc::new(CaptureCycle::new(
            Arc::clone(&self.components.camera),
            Arc::clone(&self.components.store),
            Arc::clone(&self.components.ledger),
            channel,
            self.settings.clone(),
        ));
        let shutdown = CancellationToken::new();
        let mut task = tokio::spawn(Reconciler::new(cycle).run(subscription, shutdown.clone()));

        tokio::pin!(stop);
        let joined = tokio::select! {
            _ = &mut stop => {
                info!("[+] Shutdown signal received, draining");
                shutdown.cancel();
                (&mut task).await
            }
            joined = &mut task => {
                warn!("Reconciliation loop ended on its own");
                joined
            }
        };

        joined.map_err(|e| {
            error!("[!] Reconciliation loop crashed: {}", e);
            ControllerError::SupervisionFailed(e.to_string())
        })
    }
}

/// Resolves once `listener` reports a signal. A listener that could not be
/// registered never resolves, so a registration failure cannot stop the agent.
async fn delivered<F>(name: &str, listener: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listener.await {
        error!("[!] Unable to listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        let mut term = signal(SignalKind::terminate())?;
        term.recv().await;
        Ok::<(), std::io::Error>(())
    };
    tokio::select! {
        _ = delivered("SIGINT", tokio::signal::ctrl_c()) => {}
        _ = delivered("SIGTERM", terminate) => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    delivered("Ctrl-C", tokio::signal::ctrl_c()).await;
}
