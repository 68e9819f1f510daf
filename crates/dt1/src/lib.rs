pub mod error;

use core::ops::Range;
use std::io::{Read, Seek};

use common::{Record, RecordReader};
use serde::Serialize;

use crate::error::Error;

pub type Result<T> = core::result::Result<T, Error>;

pub const HEADER_SIZE: usize = 276;
pub const HEADER_RESERVED_SIZE: usize = 260;
pub const BLOCK_RECORD_SIZE: usize = 20;
pub const SUBTILE_COUNT: usize = 25;

/// Block format tag of the fixed 256-byte isometric encoding.
pub const ISOMETRIC_FORMAT: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Header {
    pub major_version: i32,
    pub minor_version: i32,
    #[serde(skip)]
    pub reserved: [u8; HEADER_RESERVED_SIZE],
    pub tile_count: i32,
    pub tile_array_pointer: i32,
}

/// On-disk tile record layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TileLayout {
    /// 96-byte records carrying block pointer, block data size and block count.
    #[default]
    Current,
    /// 72-byte records without block information.
    Legacy,
}

impl TileLayout {
    pub const fn record_size(self) -> usize {
        match self {
            Self::Current => 96,
            Self::Legacy => 72,
        }
    }

    pub const fn has_blocks(self) -> bool {
        matches!(self, Self::Current)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub direction: i32,
    pub roof_height: i16,
    pub material_flags: i16,
    /// Stored signed on disk; always the magnitude here.
    pub height: u32,
    pub width: u32,
    pub tile_type: i32,
    pub style: i32,
    pub sequence: i32,
    pub rarity: i32,
    pub subtile_flags: [u8; SUBTILE_COUNT],
    pub block_pointer: i32,
    pub block_data_length: i32,
    pub block_count: i32,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Block {
    pub x: i16,
    pub y: i16,
    pub grid_x: u8,
    pub grid_y: u8,
    pub format: u8,
    pub length: i32,
    /// Relative to the owning tile's `block_pointer`.
    pub file_offset: i32,
    #[serde(skip_serializing)]
    pub payload: Vec<u8>,
}

impl Block {
    pub fn is_isometric(&self) -> bool {
        self.format == ISOMETRIC_FORMAT
    }
}

/// Header plus every tile with its blocks and their raw payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dt1 {
    pub header: Header,
    pub layout: TileLayout,
    pub tiles: Vec<Tile>,
}

impl Dt1 {
    pub fn open<R: Read + Seek>(inner: R) -> Result<Self> {
        Self::open_with(inner, TileLayout::Current)
    }

    pub fn open_with<R: Read + Seek>(inner: R, layout: TileLayout) -> Result<Self> {
        let mut reader = RecordReader::new(inner);
        let header = parse_tile_container_header(&mut reader)?;
        let tiles = walk_tiles_with(&mut reader, &header, layout)?;
        Ok(Self {
            header,
            layout,
            tiles,
        })
    }

    pub fn block_count(&self) -> usize {
        self.tiles.iter().map(|tile| tile.blocks.len()).sum()
    }
}

pub fn parse_tile_container_header<R: Read>(reader: &mut RecordReader<R>) -> Result<Header> {
    let mut record = reader.read_record(HEADER_SIZE)?;
    let header = Header {
        major_version: record.i32()?,
        minor_version: record.i32()?,
        reserved: record.bytes()?,
        tile_count: record.i32()?,
        tile_array_pointer: record.i32()?,
    };
    log::debug!(
        "dt1 header: version={}.{}, tiles={}, tile_array_pointer={}",
        header.major_version,
        header.minor_version,
        header.tile_count,
        header.tile_array_pointer
    );
    Ok(header)
}

/// Walks the tile array using [`TileLayout::Current`].
pub fn walk_tiles<R: Read + Seek>(
    reader: &mut RecordReader<R>,
    header: &Header,
) -> Result<Vec<Tile>> {
    walk_tiles_with(reader, header, TileLayout::Current)
}

pub fn walk_tiles_with<R: Read + Seek>(
    reader: &mut RecordReader<R>,
    header: &Header,
    layout: TileLayout,
) -> Result<Vec<Tile>> {
    let count = usize::try_from(header.tile_count).map_err(|_| Error::InvalidTileCount {
        got: header.tile_count,
    })?;
    let pointer = pointer_offset("tile array", header.tile_array_pointer)?;
    let record_size = layout.record_size();
    let table_size = count
        .checked_mul(record_size)
        .ok_or(Error::IntegerOverflow)?;
    reader.seek_record(pointer, table_size)?;

    let mut tiles = Vec::with_capacity(count);
    for _ in 0..count {
        let record = reader.read_record(record_size)?;
        tiles.push(parse_tile(record, layout)?);
    }

    for (index, tile) in tiles.iter_mut().enumerate() {
        tile.blocks = walk_blocks(reader, index, tile)?;
    }
    log::debug!(
        "walked {} tiles with {} blocks",
        tiles.len(),
        tiles.iter().map(|tile| tile.blocks.len()).sum::<usize>()
    );
    Ok(tiles)
}

/// Absolute byte range of a block payload: `block_pointer + file_offset .. + length`.
///
/// Fails with a truncated-record error when the range ends past `stream_len`.
pub fn resolve_block_payload(
    block_pointer: i32,
    file_offset: i32,
    length: i32,
    stream_len: u64,
) -> Result<Range<u64>> {
    let base = pointer_offset("block array", block_pointer)?;
    let relative = pointer_offset("block payload", file_offset)?;
    let size = u64::try_from(length).map_err(|_| Error::InvalidBlockLength { length })?;
    let start = base.checked_add(relative).ok_or(Error::IntegerOverflow)?;
    let end = start.checked_add(size).ok_or(Error::IntegerOverflow)?;
    if end > stream_len {
        return Err(common::Error::TruncatedRecord {
            offset: start,
            expected: usize::try_from(size).map_err(|_| Error::IntegerOverflow)?,
            actual: usize::try_from(stream_len.saturating_sub(start)).unwrap_or(usize::MAX),
        }
        .into());
    }
    Ok(start..end)
}

fn walk_blocks<R: Read + Seek>(
    reader: &mut RecordReader<R>,
    tile_index: usize,
    tile: &Tile,
) -> Result<Vec<Block>> {
    let count = usize::try_from(tile.block_count).map_err(|_| Error::InvalidBlockCount {
        tile: tile_index,
        got: tile.block_count,
    })?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let base = pointer_offset("block array", tile.block_pointer)?;
    let table_size = count
        .checked_mul(BLOCK_RECORD_SIZE)
        .ok_or(Error::IntegerOverflow)?;
    reader.seek_record(base, table_size)?;

    let mut blocks = Vec::with_capacity(count);
    for _ in 0..count {
        let record = reader.read_record(BLOCK_RECORD_SIZE)?;
        blocks.push(parse_block(record)?);
    }

    let stream_len = reader.stream_len()?;
    for block in &mut blocks {
        let range = resolve_block_payload(
            tile.block_pointer,
            block.file_offset,
            block.length,
            stream_len,
        )?;
        let size = usize::try_from(range.end - range.start).map_err(|_| Error::IntegerOverflow)?;
        block.payload = reader.read_record_at(range.start, size)?.into_bytes();
    }
    log::trace!("tile {tile_index}: {count} blocks at {base}");
    Ok(blocks)
}

fn parse_tile(mut record: Record, layout: TileLayout) -> Result<Tile> {
    let direction = record.i32()?;
    let roof_height = record.i16()?;
    let material_flags = record.i16()?;
    let height = record.i32()?.unsigned_abs();
    let width = record.i32()?.unsigned_abs();
    record.skip(4)?;
    let tile_type = record.i32()?;
    let style = record.i32()?;
    let sequence = record.i32()?;
    let rarity = record.i32()?;
    record.skip(4)?;
    let subtile_flags: [u8; SUBTILE_COUNT] = record.bytes()?;
    record.skip(7)?;

    let (block_pointer, block_data_length, block_count) = if layout.has_blocks() {
        let fields = (record.i32()?, record.i32()?, record.i32()?);
        record.skip(12)?;
        fields
    } else {
        (0, 0, 0)
    };

    Ok(Tile {
        direction,
        roof_height,
        material_flags,
        height,
        width,
        tile_type,
        style,
        sequence,
        rarity,
        subtile_flags,
        block_pointer,
        block_data_length,
        block_count,
        blocks: Vec::new(),
    })
}

fn parse_block(mut record: Record) -> Result<Block> {
    let x = record.i16()?;
    let y = record.i16()?;
    record.skip(2)?;
    let grid_x = record.u8()?;
    let grid_y = record.u8()?;
    let format = record.u8()?;
    record.skip(1)?;
    let length = record.i32()?;
    record.skip(2)?;
    let file_offset = record.i32()?;
    Ok(Block {
        x,
        y,
        grid_x,
        grid_y,
        format,
        length,
        file_offset,
        payload: Vec::new(),
    })
}

fn pointer_offset(field: &'static str, value: i32) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::InvalidPointer { field, value })
}

#[cfg(test)]
mod tests;
