use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("stream reading error")]
    #[diagnostic(code(common::io_error))]
    Io(#[from] std::io::Error),

    #[error(
        "truncated record at offset {offset} (expected {expected} bytes, received {actual} bytes)"
    )]
    #[diagnostic(code(common::truncated_record))]
    TruncatedRecord {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("field of {size} bytes at {position} does not fit a {record_size}-byte record")]
    #[diagnostic(code(common::field_out_of_range))]
    FieldOutOfRange {
        position: usize,
        size: usize,
        record_size: usize,
    },

    #[error("reader stopped after a failed read at offset {offset}")]
    #[diagnostic(
        code(common::poisoned),
        help("a failed read leaves the cursor undefined, open the source again")
    )]
    Poisoned { offset: u64 },

    #[error("integer overflow")]
    #[diagnostic(code(common::integer_overflow))]
    IntegerOverflow,
}
