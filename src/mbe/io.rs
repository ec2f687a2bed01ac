//! Little-endian stream helpers for the MBE framing
//!
//! Both wrappers track their position relative to the start of the MBE blob,
//! which is what chunk offsets and alignment are measured against.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Round `offset` up to a multiple of `alignment` (0 and 1 are no-ops)
pub fn align(offset: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        offset
    } else {
        offset.div_ceil(alignment) * alignment
    }
}

/// Reader positioned at the start of an MBE blob
pub struct MbeReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> MbeReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes consumed since the start of the blob
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_i32(&mut self, context: &str) -> Result<i32> {
        let value = self
            .inner
            .read_i32::<LittleEndian>()
            .map_err(|e| Error::from_read(e, context))?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_u8(&mut self, context: &str) -> Result<u8> {
        let value = self
            .inner
            .read_u8()
            .map_err(|e| Error::from_read(e, context))?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_exact(&mut self, buf: &mut [u8], context: &str) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| Error::from_read(e, context))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read a non-negative int32 length prefix
    pub fn read_len(&mut self, context: &str) -> Result<usize> {
        let len = self.read_i32(context)?;
        usize::try_from(len).map_err(|_| Error::InvalidLength {
            context: context.to_string(),
            len,
        })
    }

    /// Discard `count` bytes
    pub fn skip(&mut self, count: u64, context: &str) -> Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(count), &mut io::sink())?;
        self.position += copied;
        if copied < count {
            return Err(Error::TruncatedStream(context.to_string()));
        }
        Ok(())
    }

    /// Skip padding up to the next multiple of `alignment`
    pub fn align_to(&mut self, alignment: usize, context: &str) -> Result<()> {
        let target = align(self.position as usize, alignment) as u64;
        self.skip(target - self.position, context)
    }

    /// Read a length-prefixed string, cut at the first NUL
    pub fn read_string(&mut self, context: &str) -> Result<String> {
        let len = self.read_len(context)?;
        if len == 0 {
            return Ok(String::new());
        }

        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes, context)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Writer producing an MBE blob
pub struct MbeWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> MbeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written since the start of the blob
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.inner.write_i32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write a length as int32
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("length {} does not fit in an int32", len),
            ))
        })?;
        self.write_i32(len)
    }

    /// Pad with zero bytes up to the next multiple of `alignment`
    pub fn align_to(&mut self, alignment: usize) -> Result<()> {
        let target = align(self.position as usize, alignment);
        let padding = target - self.position as usize;
        if padding > 0 {
            self.write_all(&vec![0u8; padding])?;
        }
        Ok(())
    }

    /// Write a length-prefixed string padded with NULs to a 4-byte boundary.
    ///
    /// Two terminating NULs are always appended before padding.
    pub fn write_padded_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        let padded_len = align(bytes.len() + 2, 4);
        self.write_len(padded_len)?;
        self.write_all(bytes)?;
        self.write_all(&vec![0u8; padded_len - bytes.len()])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
