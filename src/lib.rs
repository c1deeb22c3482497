// Library interface for the inclinefit modules
// This allows integration tests to access the core functionality

pub mod aggregates;
pub mod analysis;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod messages;
pub mod presence;
pub mod report;
pub mod rewrite;
pub mod synth;
pub mod timeline;

// Re-export commonly used types for convenience
pub use analysis::{analyze, CompletenessReport};
pub use codec::{decode_bytes, decode_file, encode, encode_file, CodecCapabilities, EncodeOutcome};
pub use config::AppConfig;
pub use error::{CodecError, InclineError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use messages::{FieldValue, Message, MessageKind};
pub use rewrite::{inject, RewriteStats};
pub use synth::{synthesize, SynthesisParams, SyntheticTrack};
pub use timeline::{DistanceTimeline, KnotPolicy, Sample, TimelineBuilder};
