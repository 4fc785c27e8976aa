//! Bounds-checked cursor over encoded bytes.

use super::{CodecError, CodecResult};

/// A cursor for reading encoded variant bytes.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> CodecResult<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_array8(&mut self) -> CodecResult<[u8; 8]> {
        let bytes = self.read_bytes(8)?;
        let mut out = [0_u8; 8];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub(crate) fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.read_array8()?))
    }

    pub(crate) fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.read_array8()?))
    }

    pub(crate) fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_be_bytes(self.read_array8()?))
    }

    /// Reads a u64 length prefix and checks it fits in the remaining input.
    ///
    /// `unit` is the minimum encoded size of one element, so element counts
    /// for lists and maps are rejected early instead of driving a huge
    /// allocation.
    pub(crate) fn read_len(&mut self, unit: usize) -> CodecResult<usize> {
        let offset = self.pos;
        let len = self.read_u64()?;
        let fits = usize::try_from(len)
            .ok()
            .and_then(|value| value.checked_mul(unit.max(1)))
            .is_some_and(|total| total <= self.remaining());
        if !fits {
            return Err(CodecError::LengthOverflow { offset, len });
        }
        // The check above guarantees the conversion succeeds.
        Ok(len as usize)
    }

    /// Reads a u64-length-prefixed byte field.
    pub(crate) fn read_prefixed(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_len(1)?;
        self.read_bytes(len)
    }
}
