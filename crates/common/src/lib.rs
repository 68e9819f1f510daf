pub mod error;
mod palette;
mod reader;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub use crate::error::Error;
pub use crate::palette::{Palette, PALETTE_ENTRY_SIZE};
pub use crate::reader::{Record, RecordReader};

pub type Result<T> = core::result::Result<T, Error>;

/// Case-insensitive extension check, `extension` given without the dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Expands `inputs` into a list of files carrying `extension`.
///
/// Files are taken as given regardless of their extension. Directories are
/// walked recursively in name order; entries that cannot be read are logged
/// and skipped.
pub fn files_with_extension(inputs: &[PathBuf], extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("failed to traverse {}: {err}", input.display());
                    continue;
                }
            };
            if entry.file_type().is_file() && has_extension(entry.path(), extension) {
                files.push(entry.into_path());
            }
        }
    }
    files
}
