pub mod error;

use std::io::{Read, Seek};

use common::{Palette, RecordReader};

use crate::error::{Error, SinkError};

pub type Result<T> = core::result::Result<T, Error>;

pub const HEADER_SIZE: usize = 24;
pub const FRAME_HEADER_SIZE: usize = 32;

/// Control byte ending the current scanline.
pub const END_OF_LINE: u8 = 0x80;

/// Largest frame the decoder allocates, in pixels (4096 x 4096).
pub const MAX_IMAGE_PIXELS: u64 = 1 << 24;

/// Sprite container header, six little-endian `i32` fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: i32,
    pub flags: i32,
    pub encoding: i32,
    pub padding: i32,
    pub directions: i32,
    pub frame_count: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub flipped: i32,
    pub width: i32,
    pub height: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub unknown: i32,
    pub next_block: i32,
    pub length: i32,
}

impl FrameHeader {
    pub fn image_width(&self) -> u32 {
        self.width.unsigned_abs()
    }

    pub fn image_height(&self) -> u32 {
        self.height.unsigned_abs()
    }
}

/// One frame record: its header and whatever part of the encoded payload the file holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub data: Vec<u8>,
}

impl Frame {
    /// True when the file ended before `header.length` payload bytes.
    pub fn is_truncated(&self) -> bool {
        usize::try_from(self.header.length).is_ok_and(|length| self.data.len() < length)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

impl DecodedImage {
    /// Fully transparent image.
    ///
    /// Fails with [`Error::InvalidDimensions`] above [`MAX_IMAGE_PIXELS`].
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixels = u64::from(width)
            .checked_mul(u64::from(height))
            .ok_or(Error::IntegerOverflow)?;
        if pixels > MAX_IMAGE_PIXELS {
            return Err(Error::InvalidDimensions { width, height });
        }
        let size = pixels
            .checked_mul(4)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or(Error::IntegerOverflow)?;

        let mut rgba8 = Vec::new();
        rgba8
            .try_reserve_exact(size)
            .map_err(|_| Error::AllocationFailed { size })?;
        rgba8.resize(size, 0);
        Ok(Self {
            width,
            height,
            rgba8,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let off = self.pixel_offset(x, y)?;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.rgba8[off..off + 4]);
        Some(px)
    }

    /// Writes one pixel; returns false when (x, y) lies outside the image.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        let Some(off) = self.pixel_offset(x, y) else {
            return false;
        };
        self.rgba8[off..off + 4].copy_from_slice(&rgba);
        true
    }

    fn pixel_offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = usize::try_from(y).ok()?;
        let col = usize::try_from(x).ok()?;
        let width = usize::try_from(self.width).ok()?;
        Some((row * width + col) * 4)
    }
}

/// Destination for decoded frames, e.g. a PNG writer.
pub trait ImageSink {
    /// Takes ownership of `image` and stores it under `destination`.
    fn emit(
        &mut self,
        destination: &str,
        image: DecodedImage,
    ) -> core::result::Result<(), SinkError>;
}

impl ImageSink for Vec<(String, DecodedImage)> {
    fn emit(
        &mut self,
        destination: &str,
        image: DecodedImage,
    ) -> core::result::Result<(), SinkError> {
        self.push((destination.to_string(), image));
        Ok(())
    }
}

/// Reads the header and the frame offset table. The stream is consumed sequentially.
pub fn parse_frame_container<R: Read>(
    reader: &mut RecordReader<R>,
) -> Result<(Header, Vec<i32>)> {
    let mut record = reader.read_record(HEADER_SIZE)?;
    let header = Header {
        version: record.i32()?,
        flags: record.i32()?,
        encoding: record.i32()?,
        padding: record.i32()?,
        directions: record.i32()?,
        frame_count: record.i32()?,
    };

    let count = usize::try_from(header.frame_count).map_err(|_| Error::InvalidFrameCount {
        got: header.frame_count,
    })?;
    let offsets = reader.read_i32_table(count)?;
    log::debug!(
        "dc6 header: version={}, directions={}, frames={}",
        header.version,
        header.directions,
        header.frame_count
    );
    Ok((header, offsets))
}

/// Decodes one RLE-encoded frame into an RGBA image.
///
/// Scanlines run bottom-up: cursor row `y` lands on image row `height - 1 - y`.
/// Writes outside the image or with an index outside the palette are dropped.
/// A literal run cut short by the end of `encoded` ends decoding early.
pub fn decode_frame(
    encoded: &[u8],
    palette: &Palette,
    width: u32,
    height: u32,
) -> Result<DecodedImage> {
    let mut image = DecodedImage::new(width, height)?;
    let mut x = 0u32;
    let mut y = 0u32;
    let mut dropped = 0usize;
    let mut bytes = encoded.iter().copied();

    while let Some(control) = bytes.next() {
        if control == END_OF_LINE {
            x = 0;
            y = y.saturating_add(1);
        } else if control > END_OF_LINE {
            x = x.saturating_add(u32::from(control - END_OF_LINE));
        } else {
            for _ in 0..control {
                let Some(index) = bytes.next() else {
                    log::debug!(
                        "literal run truncated at scanline {y}, {} bytes consumed",
                        encoded.len()
                    );
                    log_dropped(dropped);
                    return Ok(image);
                };
                let row = (y < height).then(|| height - 1 - y);
                let written = match (palette.rgba(usize::from(index)), row) {
                    (Some(rgba), Some(row)) => image.set_pixel(x, row, rgba),
                    _ => false,
                };
                if !written {
                    dropped += 1;
                }
                x = x.saturating_add(1);
            }
        }
    }

    log_dropped(dropped);
    Ok(image)
}

fn log_dropped(dropped: usize) {
    if dropped > 0 {
        log::debug!("dropped {dropped} out-of-range pixel writes");
    }
}

/// Random-access reader over a sprite container.
///
/// Opening reads the header and offset table; frames are then read on demand.
#[derive(Debug)]
pub struct Dc6Reader<R> {
    reader: RecordReader<R>,
    header: Header,
    offsets: Vec<i32>,
}

impl<R: Read + Seek> Dc6Reader<R> {
    pub fn open(inner: R) -> Result<Self> {
        let mut reader = RecordReader::new(inner);
        let (header, offsets) = parse_frame_container(&mut reader)?;
        Ok(Self {
            reader,
            header,
            offsets,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn frame_count(&self) -> usize {
        self.offsets.len()
    }

    /// Closes the container and returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    pub fn read_frame_header(&mut self, index: usize) -> Result<FrameHeader> {
        let offset = self.frame_offset(index)?;
        let mut record = self.reader.read_record_at(offset, FRAME_HEADER_SIZE)?;
        Ok(FrameHeader {
            flipped: record.i32()?,
            width: record.i32()?,
            height: record.i32()?,
            origin_x: record.i32()?,
            origin_y: record.i32()?,
            unknown: record.i32()?,
            next_block: record.i32()?,
            length: record.i32()?,
        })
    }

    /// Reads the frame header and up to `length` bytes of its encoded payload.
    pub fn read_frame(&mut self, index: usize) -> Result<Frame> {
        let header = self.read_frame_header(index)?;
        let length = usize::try_from(header.length).map_err(|_| Error::InvalidFrameLength {
            index,
            length: header.length,
        })?;
        let data = self.reader.read_up_to(length)?;
        if data.len() < length {
            log::debug!(
                "frame {index}: expected {length} payload bytes, file holds {}",
                data.len()
            );
        }
        Ok(Frame { header, data })
    }

    pub fn decode_frame(
        &mut self,
        index: usize,
        palette: &Palette,
    ) -> Result<(FrameHeader, DecodedImage)> {
        let frame = self.read_frame(index)?;
        let image = decode_frame(
            &frame.data,
            palette,
            frame.header.image_width(),
            frame.header.image_height(),
        )?;
        Ok((frame.header, image))
    }

    /// Decodes every frame and hands it to `sink` as `{stem}_{index}`.
    ///
    /// Returns the number of frames emitted.
    pub fn extract_frames<S: ImageSink + ?Sized>(
        &mut self,
        palette: &Palette,
        sink: &mut S,
        stem: &str,
    ) -> Result<usize> {
        for index in 0..self.frame_count() {
            let (header, image) = self.decode_frame(index, palette)?;
            let destination = format!("{stem}_{index}");
            log::debug!(
                "frame {index}: {}x{} at ({}, {}) -> {destination}",
                header.width,
                header.height,
                header.origin_x,
                header.origin_y
            );
            sink.emit(&destination, image).map_err(|source| Error::Sink {
                destination: destination.clone(),
                source,
            })?;
        }
        Ok(self.frame_count())
    }

    fn frame_offset(&self, index: usize) -> Result<u64> {
        let Some(&offset) = self.offsets.get(index) else {
            return Err(Error::FrameIndexOutOfRange {
                requested: index,
                frame_count: self.offsets.len(),
            });
        };
        u64::try_from(offset).map_err(|_| Error::InvalidFrameOffset { index, offset })
    }
}
