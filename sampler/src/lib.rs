pub mod ffmpeg;
pub mod sampler;
pub mod source;

pub use ffmpeg::FfmpegSource;
pub use sampler::{sample_count, sample_timestamp_us, FrameSampler, SampleError};
pub use source::{SourceError, VideoSource};
