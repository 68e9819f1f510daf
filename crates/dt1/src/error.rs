use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] common::Error),

    #[error("invalid tile count: {got}")]
    #[diagnostic(code(dt1::invalid_tile_count))]
    InvalidTileCount { got: i32 },

    #[error("tile {tile} has an invalid block count: {got}")]
    #[diagnostic(code(dt1::invalid_block_count))]
    InvalidBlockCount { tile: usize, got: i32 },

    #[error("invalid {field} pointer: {value}")]
    #[diagnostic(code(dt1::invalid_pointer))]
    InvalidPointer { field: &'static str, value: i32 },

    #[error("invalid block payload length: {length}")]
    #[diagnostic(code(dt1::invalid_block_length))]
    InvalidBlockLength { length: i32 },

    #[error("integer overflow")]
    #[diagnostic(code(dt1::integer_overflow))]
    IntegerOverflow,
}
