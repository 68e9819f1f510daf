use miette::Diagnostic;
use thiserror::Error;

/// Error returned by an [`crate::ImageSink`].
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Diagnostic, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] common::Error),

    #[error("invalid frame count: {got}")]
    #[diagnostic(code(dc6::invalid_frame_count))]
    InvalidFrameCount { got: i32 },

    #[error("frame {index} has an invalid offset: {offset}")]
    #[diagnostic(code(dc6::invalid_frame_offset))]
    InvalidFrameOffset { index: usize, offset: i32 },

    #[error("frame {index} has an invalid encoded length: {length}")]
    #[diagnostic(code(dc6::invalid_frame_length))]
    InvalidFrameLength { index: usize, length: i32 },

    #[error("frame index out of range: requested={requested}, frame_count={frame_count}")]
    #[diagnostic(code(dc6::frame_index_out_of_range))]
    FrameIndexOutOfRange {
        requested: usize,
        frame_count: usize,
    },

    #[error("invalid frame dimensions: {width}x{height}")]
    #[diagnostic(
        code(dc6::invalid_dimensions),
        help("a frame holds at most 16777216 pixels")
    )]
    InvalidDimensions { width: u32, height: u32 },

    #[error("failed to allocate {size} bytes for a decoded frame")]
    #[diagnostic(code(dc6::allocation_failed))]
    AllocationFailed { size: usize },

    #[error("image sink failed to store '{destination}'")]
    #[diagnostic(code(dc6::sink_error))]
    Sink {
        destination: String,
        #[source]
        source: SinkError,
    },

    #[error("integer overflow")]
    #[diagnostic(code(dc6::integer_overflow))]
    IntegerOverflow,
}
