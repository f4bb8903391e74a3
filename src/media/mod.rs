pub mod engine;
pub mod error;
pub mod primitives;
pub mod probe;
pub mod runner;

pub use engine::{AudioEngine, FfmpegEngine};
pub use error::MediaError;
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use runner::{FfmpegRunner, SystemFfmpegRunner};
