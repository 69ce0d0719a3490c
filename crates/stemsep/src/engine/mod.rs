pub mod adapter;
pub mod backend;
pub mod decode;

pub use adapter::SeparationEngineAdapter;
pub use backend::{EngineError, EngineFactory, SeparationEngine, Stem, StereoWaveform};
pub use decode::DecodedAudio;
