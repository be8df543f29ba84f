//! Reconstruction job supervisor
//!
//! Owns at most one live job. Outputs are relayed to the sink by one
//! consumer task per job; the consumer only emits events.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{JobConfiguration, JobOutput, ReconstructionEngine, ReconstructionJob, Request};
use super::listing::{list_directory, DirectoryListing};
use crate::bridge::{BridgeEvent, EventSink, ReconstructionEvent};
use crate::config::{resolve_path, CaptureConfig};
use crate::error::{EngineError, ReconstructionError};

struct LiveJob {
    id: Uuid,
    job: Arc<dyn ReconstructionJob>,
    consumer: JoinHandle<()>,
    // Set by the consumer before it relays the final output
    done: Arc<AtomicBool>,
}

impl LiveJob {
    fn is_live(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }
}

async fn relay_outputs(
    id: Uuid,
    mut outputs: mpsc::UnboundedReceiver<JobOutput>,
    sink: Arc<dyn EventSink>,
    done: Arc<AtomicBool>,
) {
    while let Some(output) = outputs.recv().await {
        let terminal = output.is_terminal();
        if terminal {
            done.store(true, Ordering::SeqCst);
        }

        match output.to_event() {
            Some(event) => {
                if let ReconstructionEvent::Error { error, code, .. } = &event {
                    warn!("Job {} request failed ({}): {}", id, code, error);
                }
                sink.send_event(&BridgeEvent::Reconstruction(event));
            }
            None => debug!("Job {} output not relayed: {:?}", id, output),
        }

        if terminal {
            break;
        }
    }

    done.store(true, Ordering::SeqCst);
    info!("Job {} output stream finished", id);
}

/// Drives reconstruction jobs and relays their outputs as bridge events
pub struct ReconstructionSupervisor {
    engine: Arc<dyn ReconstructionEngine>,
    sink: Arc<dyn EventSink>,
    working_root: PathBuf,
    accepted_extensions: Vec<String>,
    live: Mutex<Option<LiveJob>>,
}

impl ReconstructionSupervisor {
    pub fn new(
        engine: Arc<dyn ReconstructionEngine>,
        sink: Arc<dyn EventSink>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            engine,
            sink,
            working_root: config.directories.working_root.clone(),
            accepted_extensions: config
                .reconstruction
                .accepted_image_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            live: Mutex::new(None),
        }
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    fn resolve(&self, what: &str, relative: &str) -> Result<PathBuf, ReconstructionError> {
        resolve_path(&self.working_root, relative)
            .map_err(|e| ReconstructionError::Input(format!("{what}: {e}")))
    }

    fn is_accepted_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.accepted_extensions.iter().any(|a| *a == ext)
            })
            .unwrap_or(false)
    }

    fn validate_input(&self, input: &Path) -> Result<usize, ReconstructionError> {
        if !input.is_dir() {
            return Err(ReconstructionError::Input(format!(
                "Input directory does not exist: {}",
                input.display()
            )));
        }

        let images = std::fs::read_dir(input)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_accepted_image(path))
            .count();

        if images == 0 {
            return Err(ReconstructionError::Input(format!(
                "No images found in {}",
                input.display()
            )));
        }
        Ok(images)
    }

    fn prepare_output(checkpoint: &Path, output: &Path) -> Result<(), ReconstructionError> {
        std::fs::create_dir_all(checkpoint).map_err(|e| ReconstructionError::Preparation {
            what: "checkpoint directory",
            message: e.to_string(),
        })?;

        if output.is_file() {
            std::fs::remove_file(output).map_err(|e| ReconstructionError::Preparation {
                what: "output file",
                message: e.to_string(),
            })?;
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReconstructionError::Preparation {
                what: "output directory",
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn report_engine_error(&self, request: &Request, err: &EngineError) {
        error!("Reconstruction engine error: {}", err);
        self.sink.send_event(&BridgeEvent::Reconstruction(ReconstructionEvent::Error {
            error: err.message.clone(),
            code: err.code(),
            request: request.to_string(),
        }));
    }

    /// Validate inputs, start a job and relay its outputs.
    ///
    /// Paths are relative to the working root. Resolves once the job is
    /// accepted; progress and completion arrive as events. A job that is
    /// still live is cancelled before its output location is touched; a
    /// request rejected as invalid input leaves it running.
    pub async fn start_reconstruction(
        &self,
        input: &str,
        checkpoint: &str,
        output: &str,
    ) -> Result<bool, ReconstructionError> {
        let input_dir = self.resolve("input path", input)?;
        let checkpoint_dir = self.resolve("checkpoint path", checkpoint)?;
        let output_path = self.resolve("output path", output)?;

        let images = self.validate_input(&input_dir)?;

        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            if previous.is_live() {
                info!("Cancelling job {} to start a new one", previous.id);
                previous.consumer.abort();
                previous.job.cancel();
                self.sink
                    .send_event(&BridgeEvent::Reconstruction(ReconstructionEvent::Cancelled));
            }
        }

        Self::prepare_output(&checkpoint_dir, &output_path)?;

        let request = Request::ModelFile {
            path: output_path.clone(),
        };
        let configuration = JobConfiguration {
            input_directory: input_dir,
            checkpoint_directory: checkpoint_dir,
        };

        let job = self.engine.create_job(&configuration).map_err(|e| {
            self.report_engine_error(&request, &e);
            ReconstructionError::from(e)
        })?;
        let outputs = job.process(vec![request.clone()]).map_err(|e| {
            self.report_engine_error(&request, &e);
            ReconstructionError::from(e)
        })?;

        let id = Uuid::new_v4();
        let done = Arc::new(AtomicBool::new(false));
        let consumer = tokio::spawn(relay_outputs(id, outputs, self.sink.clone(), done.clone()));
        *live = Some(LiveJob {
            id,
            job,
            consumer,
            done,
        });

        info!(
            "Started reconstruction job {} ({} images -> {:?})",
            id, images, output_path
        );
        Ok(true)
    }

    /// Cancel the live job, if any. Always returns true.
    pub async fn cancel_reconstruction(&self) -> bool {
        let mut live = self.live.lock().await;
        match live.take() {
            Some(job) if job.is_live() => {
                job.job.cancel();
                info!("Cancelled reconstruction job {}", job.id);
                self.sink
                    .send_event(&BridgeEvent::Reconstruction(ReconstructionEvent::Cancelled));
            }
            _ => debug!("cancel ignored, no live reconstruction job"),
        }
        true
    }

    /// Whether a job is running and has not reached a terminal output
    pub async fn has_live_job(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .map(LiveJob::is_live)
            .unwrap_or(false)
    }

    /// List a directory relative to the working root
    pub fn list_directory_contents(&self, dir: &str) -> Result<DirectoryListing, ReconstructionError> {
        list_directory(&self.resolve("directory", dir)?)
    }
}

impl std::fmt::Debug for ReconstructionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconstructionSupervisor")
            .field("working_root", &self.working_root)
            .field("accepted_extensions", &self.accepted_extensions)
            .finish()
    }
}
