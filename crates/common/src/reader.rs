use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::Result;

/// Fixed-size block of bytes read in one piece, decoded field by field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    offset: u64,
    data: Vec<u8>,
    cursor: usize,
}

impl Record {
    pub fn new(offset: u64, data: Vec<u8>) -> Self {
        Self {
            offset,
            data,
            cursor: 0,
        }
    }

    /// Stream offset of the first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes not consumed by field reads yet.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn skip(&mut self, size: usize) -> Result<()> {
        self.take(size).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take(&mut self, size: usize) -> Result<&[u8]> {
        let end = self
            .cursor
            .checked_add(size)
            .ok_or(Error::IntegerOverflow)?;
        let Some(field) = self.data.get(self.cursor..end) else {
            return Err(Error::FieldOutOfRange {
                position: self.cursor,
                size,
                record_size: self.data.len(),
            });
        };
        self.cursor = end;
        Ok(field)
    }
}

/// Little-endian record reader over a byte stream.
///
/// Reads are all-or-nothing: a record is either returned whole or the read
/// fails with [`Error::TruncatedRecord`]. Any failure poisons the reader and
/// every later call returns [`Error::Poisoned`].
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    position: u64,
    stream_len: Option<u64>,
    poisoned: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wraps `inner`, assuming it is positioned at offset 0.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            stream_len: None,
            poisoned: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Closes the reader and hands back the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_record(&mut self, size: usize) -> Result<Record> {
        self.ensure_usable()?;
        let offset = self.position;
        let data = self.read_limited(size)?;
        if data.len() < size {
            self.poisoned = true;
            return Err(Error::TruncatedRecord {
                offset,
                expected: size,
                actual: data.len(),
            });
        }
        log::trace!("read {size}-byte record at offset {offset}");
        Ok(Record::new(offset, data))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_record(4)?.i32()
    }

    /// Reads `count` consecutive `i32` values as one record.
    pub fn read_i32_table(&mut self, count: usize) -> Result<Vec<i32>> {
        let size = count.checked_mul(4).ok_or(Error::IntegerOverflow)?;
        let mut record = self.read_record(size)?;
        (0..count).map(|_| record.i32()).collect()
    }

    /// Reads up to `len` bytes, returning fewer when the stream ends first.
    pub fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        self.read_limited(len)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned {
                offset: self.position,
            });
        }
        Ok(())
    }

    // `len` is an upper bound only; the buffer grows with the bytes actually read.
    fn read_limited(&mut self, len: usize) -> Result<Vec<u8>> {
        let limit = u64::try_from(len).map_err(|_| Error::IntegerOverflow)?;
        let mut data = Vec::new();
        if let Err(err) = (&mut self.inner).take(limit).read_to_end(&mut data) {
            self.poisoned = true;
            return Err(Error::Io(err));
        }
        let advanced = u64::try_from(data.len()).map_err(|_| Error::IntegerOverflow)?;
        self.position = self
            .position
            .checked_add(advanced)
            .ok_or(Error::IntegerOverflow)?;
        Ok(data)
    }
}

impl<R: Read + Seek> RecordReader<R> {
    /// Total stream length in bytes, queried once and cached.
    pub fn stream_len(&mut self) -> Result<u64> {
        self.ensure_usable()?;
        if let Some(len) = self.stream_len {
            return Ok(len);
        }
        let len = self.seek_raw(SeekFrom::End(0))?;
        self.seek_raw(SeekFrom::Start(self.position))?;
        self.stream_len = Some(len);
        Ok(len)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.seek_record(offset, 0)
    }

    /// Moves to `offset` after checking that `size` bytes are available there.
    pub fn seek_record(&mut self, offset: u64, size: usize) -> Result<()> {
        let len = self.stream_len()?;
        let wanted = u64::try_from(size).map_err(|_| Error::IntegerOverflow)?;
        let end = offset.checked_add(wanted).ok_or(Error::IntegerOverflow)?;
        if end > len {
            self.poisoned = true;
            return Err(Error::TruncatedRecord {
                offset,
                expected: size,
                actual: usize::try_from(len.saturating_sub(offset)).unwrap_or(usize::MAX),
            });
        }
        self.seek_raw(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Seeks to `offset` and reads a `size`-byte record there.
    pub fn read_record_at(&mut self, offset: u64, size: usize) -> Result<Record> {
        self.seek_record(offset, size)?;
        self.read_record(size)
    }

    fn seek_raw(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos).map_err(|err| {
            self.poisoned = true;
            Error::Io(err)
        })
    }
}
