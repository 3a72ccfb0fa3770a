use thiserror::Error;

use crate::config::ConfigError;
use crate::payload::PayloadError;
use crate::remap::RemapError;
use crate::scan::ScanError;
use crate::synth::SynthError;

/// Structured cause carried by a failed build outcome.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Remap(#[from] RemapError),

    #[error(transparent)]
    Synthesis(#[from] SynthError),

    #[error("Build worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
