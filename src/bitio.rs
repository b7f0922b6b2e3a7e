//! Bit-level I/O over byte buffers
//!
//! **Layout**: MSB-first. The writer appends into an owned `Vec<u8>`; the
//! reader is a bounds-checked cursor over a borrowed image slice, so a
//! truncated or corrupt image surfaces as `FmError::Decode` rather than a
//! panic.
//!
//! Also hosts the biased "integer code" used for small bucket counters:
//! values 0 and 1 are stored literally in `head` bits, 2 and 3 as head `2`
//! plus one bit, anything larger as its bit length in `head` bits followed
//! by the remaining low bits.

use crate::error::{FmError, Result};

/// Number of bits needed to write `u`, never less than one.
#[inline]
pub fn bit_width(u: u64) -> u32 {
    (64 - u.leading_zeros()).max(1)
}

#[inline(always)]
fn low_mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Append-only MSB-first bit writer.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    acc: u64,
    pending: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Write the low `bits` bits of `value` (`bits <= 32`).
    #[inline]
    pub fn write_bits(&mut self, bits: u32, value: u32) {
        debug_assert!(bits <= 32);
        debug_assert!(bits == 32 || u64::from(value) <= low_mask(bits));
        if bits == 0 {
            return;
        }
        self.acc = (self.acc << bits) | (u64::from(value) & low_mask(bits));
        self.pending += bits;
        while self.pending >= 8 {
            self.pending -= 8;
            self.buf.push((self.acc >> self.pending) as u8);
        }
        self.acc &= low_mask(self.pending);
    }

    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(1, bit as u32);
    }

    /// Full 32-bit word, big-endian.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(32, value);
    }

    /// `zeros` zero bits followed by a one.
    pub fn write_unary(&mut self, zeros: u32) {
        let mut left = zeros;
        while left >= 32 {
            self.write_bits(32, 0);
            left -= 32;
        }
        self.write_bits(left + 1, 1);
    }

    /// Biased integer code with a `head_bits` wide header.
    pub fn write_integer(&mut self, value: u32, head_bits: u32) {
        match value {
            0 | 1 => self.write_bits(head_bits, value),
            2 | 3 => {
                self.write_bits(head_bits, 2);
                self.write_bits(1, value - 2);
            }
            _ => {
                let len = bit_width(u64::from(value));
                self.write_bits(head_bits, len);
                self.write_bits(len - 1, value - (1 << (len - 1)));
            }
        }
    }

    /// Pad the current byte with zero bits.
    pub fn flush(&mut self) {
        if self.pending > 0 {
            let pad = 8 - self.pending;
            self.write_bits(pad, 0);
        }
    }

    /// Append whole bytes; the writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.pending, 0);
        self.buf.extend_from_slice(bytes);
    }

    /// Completed bytes written so far.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.pending == 0
    }

    /// Flush and return the buffer.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush();
        self.buf
    }
}

/// Bounds-checked MSB-first bit reader.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    avail: u32,
}

impl<'a> BitReader<'a> {
    /// Start reading at byte `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self> {
        if offset > data.len() {
            return Err(FmError::format(format!(
                "offset {offset} beyond image end {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            pos: offset,
            acc: 0,
            avail: 0,
        })
    }

    /// Start reading at an absolute bit position.
    pub fn at_bit(data: &'a [u8], bit: u64) -> Result<Self> {
        let byte = usize::try_from(bit / 8)
            .map_err(|_| FmError::format("bit offset overflows"))?;
        let mut r = Self::at(data, byte)?;
        r.skip_bits((bit % 8) as u32)?;
        Ok(r)
    }

    /// Read `bits` bits (`bits <= 32`).
    #[inline]
    pub fn read_bits(&mut self, bits: u32) -> Result<u32> {
        debug_assert!(bits <= 32);
        if bits == 0 {
            return Ok(0);
        }
        while self.avail < bits {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| FmError::decode("bit stream exhausted"))?;
            self.pos += 1;
            self.acc = (self.acc << 8) | u64::from(byte);
            self.avail += 8;
        }
        self.avail -= bits;
        let v = (self.acc >> self.avail) & low_mask(bits);
        self.acc &= low_mask(self.avail);
        Ok(v as u32)
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }

    pub fn skip_bits(&mut self, bits: u32) -> Result<()> {
        let mut left = bits;
        while left > 0 {
            let step = left.min(32);
            self.read_bits(step)?;
            left -= step;
        }
        Ok(())
    }

    /// Count zero bits up to the terminating one; fails past `limit` zeros.
    pub fn read_unary(&mut self, limit: u32) -> Result<u32> {
        let mut zeros = 0;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > limit {
                return Err(FmError::decode("unary code too long"));
            }
        }
        Ok(zeros)
    }

    /// Inverse of [`BitWriter::write_integer`].
    pub fn read_integer(&mut self, head_bits: u32) -> Result<u32> {
        let head = self.read_bits(head_bits)?;
        match head {
            0 | 1 => Ok(head),
            2 => Ok(2 + self.read_bits(1)?),
            len if len <= 32 => {
                let low = self.read_bits(len - 1)?;
                (1u32 << (len - 1))
                    .checked_add(low)
                    .ok_or_else(|| FmError::decode("integer code overflows"))
            }
            len => Err(FmError::decode(format!("integer code head {len} too large"))),
        }
    }

    /// Skip to the next byte boundary.
    pub fn align(&mut self) {
        self.acc = 0;
        self.avail = 0;
    }

    /// Byte offset of the next unread byte once aligned.
    pub fn byte_position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_width() {
        assert_eq!(bit_width(0), 1);
        assert_eq!(bit_width(1), 1);
        assert_eq!(bit_width(2), 2);
        assert_eq!(bit_width(3), 2);
        assert_eq!(bit_width(4), 3);
        assert_eq!(bit_width(255), 8);
        assert_eq!(bit_width(256), 9);
    }

    #[test]
    fn test_msb_first_layout() {
        let mut w = BitWriter::new();
        w.write_bits(3, 0b101);
        w.write_bits(5, 0b00011);
        w.write_bits(4, 0xf);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0b1010_0011, 0b1111_0000]);
    }

    #[test]
    fn test_u32_is_big_endian() {
        let mut w = BitWriter::new();
        w.write_u32(0x0102_0304);
        assert_eq!(w.into_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mixed_widths() {
        let fields = [(1, 1), (7, 100), (32, 0xdead_beef), (13, 4097), (24, 0xabcdef), (2, 3)];
        let mut w = BitWriter::new();
        for &(bits, v) in &fields {
            w.write_bits(bits, v);
        }
        let bytes = w.into_bytes();
        let mut r = BitReader::at(&bytes, 0).unwrap();
        for &(bits, v) in &fields {
            assert_eq!(r.read_bits(bits).unwrap(), v);
        }
    }

    #[test]
    fn test_integer_code_layout() {
        // value -> expected bits with a 4-bit head, followed by a marker `1`
        let cases = [
            (0u32, "00001"),
            (1, "00011"),
            (2, "001001"),
            (3, "001011"),
            (4, "0011001"),
            (7, "0011111"),
            (8, "01000001"),
        ];
        for (v, pattern) in cases {
            let mut w = BitWriter::new();
            w.write_integer(v, 4);
            w.write_bit(true);
            let mut expected = BitWriter::new();
            for ch in pattern.chars() {
                expected.write_bit(ch == '1');
            }
            assert_eq!(w.into_bytes(), expected.into_bytes(), "value {v}");
        }
    }

    #[test]
    fn test_integer_code_values() {
        let values: Vec<u32> = (0..600).chain([4095, 4096, 15_000, 65_535]).collect();
        let mut w = BitWriter::new();
        for &v in &values {
            w.write_integer(v, 5);
        }
        let bytes = w.into_bytes();
        let mut r = BitReader::at(&bytes, 0).unwrap();
        for &v in &values {
            assert_eq!(r.read_integer(5).unwrap(), v);
        }
    }

    #[test]
    fn test_unary() {
        let mut w = BitWriter::new();
        w.write_unary(0);
        w.write_unary(5);
        w.write_unary(40);
        let bytes = w.into_bytes();
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert_eq!(r.read_unary(64).unwrap(), 0);
        assert_eq!(r.read_unary(64).unwrap(), 5);
        assert_eq!(r.read_unary(64).unwrap(), 40);
    }

    #[test]
    fn test_unary_limit() {
        let bytes = [0u8; 4];
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert!(r.read_unary(6).is_err());
    }

    #[test]
    fn test_reader_exhaustion_is_error() {
        let bytes = [0xffu8];
        let mut r = BitReader::at(&bytes, 0).unwrap();
        assert_eq!(r.read_bits(8).unwrap(), 0xff);
        assert!(matches!(r.read_bits(1), Err(FmError::Decode(_))));
        assert!(BitReader::at(&bytes, 2).is_err());
    }

    #[test]
    fn test_flush_and_alignment() {
        let mut w = BitWriter::new();
        w.write_bits(3, 0b111);
        assert!(!w.is_aligned());
        w.flush();
        assert!(w.is_aligned());
        assert_eq!(w.byte_len(), 1);
        w.write_bytes(&[9, 8]);
        assert_eq!(w.into_bytes(), vec![0b1110_0000, 9, 8]);
    }

    #[test]
    fn test_at_bit() {
        let bytes = [0b0000_0101, 0b1000_0000];
        let mut r = BitReader::at_bit(&bytes, 5).unwrap();
        assert_eq!(r.read_bits(4).unwrap(), 0b1011);
    }
}
