//! Offline photogrammetry reconstruction
//!
//! The engine itself is external and reached through
//! [`ReconstructionEngine`]; this module validates inputs, supervises the
//! single live job and relays its outputs.

mod job;
mod listing;
mod supervisor;

pub use job::{JobConfiguration, JobOutput, ReconstructionEngine, ReconstructionJob, Request};
pub use listing::{list_directory, DirectoryListing, FileEntry};
pub use supervisor::ReconstructionSupervisor;
