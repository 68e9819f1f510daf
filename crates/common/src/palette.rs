use std::io::Read;
use std::path::Path;

use crate::Result;

/// Size of one RGB triple in a palette source.
pub const PALETTE_ENTRY_SIZE: usize = 3;

/// Ordered RGB colour table; the position of a triple is its palette index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Builds a palette from flat RGB bytes. A trailing partial triple is ignored.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let chunks = bytes.chunks_exact(PALETTE_ENTRY_SIZE);
        let leftover = chunks.remainder().len();
        if leftover != 0 {
            log::warn!(
                "palette source has {leftover} trailing bytes after {} full entries",
                bytes.len() / PALETTE_ENTRY_SIZE
            );
        }
        Self {
            colors: chunks.map(|rgb| [rgb[0], rgb[1], rgb[2]]).collect(),
        }
    }

    /// Consumes `reader` until exhausted.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let palette = Self::from_bytes(&bytes);
        log::debug!(
            "loaded {} palette entries from {}",
            palette.len(),
            path.as_ref().display()
        );
        Ok(palette)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn get(&self, index: usize) -> Option<[u8; 3]> {
        self.colors.get(index).copied()
    }

    /// Colour at `index` as opaque RGBA.
    pub fn rgba(&self, index: usize) -> Option<[u8; 4]> {
        self.get(index).map(|[r, g, b]| [r, g, b, 255])
    }
}

impl FromIterator<[u8; 3]> for Palette {
    fn from_iter<I: IntoIterator<Item = [u8; 3]>>(iter: I) -> Self {
        Self {
            colors: iter.into_iter().collect(),
        }
    }
}
