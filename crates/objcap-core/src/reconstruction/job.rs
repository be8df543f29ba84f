//! Seams to the native reconstruction engine

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bridge::ReconstructionEvent;
use crate::error::EngineError;

/// Inputs a reconstruction job is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfiguration {
    pub input_directory: PathBuf,
    pub checkpoint_directory: PathBuf,
}

/// A unit of work submitted to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Produce a model file at the given path
    ModelFile { path: PathBuf },
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::ModelFile { path } => write!(f, "modelFile({})", path.display()),
        }
    }
}

/// One element of a job's output stream
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    /// Every request has been processed; the stream ends
    ProcessingComplete,
    RequestError { request: Request, error: EngineError },
    RequestComplete { request: Request },
    RequestProgress { request: Request, fraction: f64 },
    /// Detailed progress; not relayed
    RequestProgressInfo { request: Request },
    InputComplete,
    InvalidSample { id: String, reason: String },
    SkippedSample { id: String },
    AutomaticDownsampling,
    /// The job was cancelled; the stream ends
    ProcessingCancelled,
    /// Not relayed
    StitchingIncomplete,
    /// An output this crate does not know about
    Unrecognized(String),
}

impl JobOutput {
    /// The event relayed for this output, if any
    pub fn to_event(&self) -> Option<ReconstructionEvent> {
        let event = match self {
            JobOutput::ProcessingComplete => ReconstructionEvent::Complete,
            JobOutput::RequestError { request, error } => ReconstructionEvent::Error {
                error: error.message.clone(),
                code: error.code(),
                request: request.to_string(),
            },
            JobOutput::RequestComplete { .. } => ReconstructionEvent::RequestComplete,
            JobOutput::RequestProgress { fraction, .. } => ReconstructionEvent::Progress {
                progress: clamp_fraction(*fraction),
            },
            JobOutput::InputComplete => ReconstructionEvent::InputComplete,
            JobOutput::InvalidSample { id, reason } => ReconstructionEvent::InvalidSample {
                id: id.clone(),
                reason: reason.clone(),
            },
            JobOutput::SkippedSample { id } => ReconstructionEvent::SkippedSample { id: id.clone() },
            JobOutput::AutomaticDownsampling => ReconstructionEvent::AutomaticDownsampling,
            JobOutput::ProcessingCancelled => ReconstructionEvent::ProcessingCancelled,
            JobOutput::Unrecognized(_) => ReconstructionEvent::UnknownOutput,
            JobOutput::RequestProgressInfo { .. } | JobOutput::StitchingIncomplete => return None,
        };
        Some(event)
    }

    /// Whether the stream ends after this output
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobOutput::ProcessingComplete | JobOutput::ProcessingCancelled
        )
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Creates reconstruction jobs
pub trait ReconstructionEngine: Send + Sync {
    fn create_job(
        &self,
        configuration: &JobConfiguration,
    ) -> Result<Arc<dyn ReconstructionJob>, EngineError>;
}

/// A created reconstruction job.
///
/// `process` may be called once; the returned stream is finite and ends
/// after `ProcessingComplete` or `ProcessingCancelled`.
pub trait ReconstructionJob: Send + Sync {
    fn process(
        &self,
        requests: Vec<Request>,
    ) -> Result<mpsc::UnboundedReceiver<JobOutput>, EngineError>;
    fn cancel(&self);
}
