//! Primitive growable-buffer encoder and cursored decoder: LEB128 integers and
//! length-prefixed bytes/strings, the foundation every column codec is built on.

use crate::error::DecodingError;

/// Anything that knows how to append itself to an `Encoder` and report how
/// many bytes it wrote.
pub trait Encodable {
    fn encode(&self, buf: &mut Encoder) -> usize;
}

impl Encodable for u64 {
    fn encode(&self, buf: &mut Encoder) -> usize {
        buf.append_uint(*self)
    }
}

impl Encodable for i64 {
    fn encode(&self, buf: &mut Encoder) -> usize {
        buf.append_int(*self)
    }
}

impl Encodable for u32 {
    fn encode(&self, buf: &mut Encoder) -> usize {
        buf.append_uint(*self as u64)
    }
}

impl Encodable for String {
    fn encode(&self, buf: &mut Encoder) -> usize {
        buf.append_str(self)
    }
}

impl Encodable for Vec<u8> {
    fn encode(&self, buf: &mut Encoder) -> usize {
        buf.append_bytes(self)
    }
}

/// Anything that can be read back out of a `Decoder`. Pairs with `Encodable`
/// so column codecs can be written generically over the element type.
pub trait Decodable: Sized {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError>;
}

impl Decodable for u64 {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError> {
        d.read_uint()
    }
}

impl Decodable for i64 {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError> {
        d.read_int()
    }
}

impl Decodable for u32 {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError> {
        d.read_uint32()
    }
}

impl Decodable for String {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError> {
        d.read_str().map(|s| s.to_string())
    }
}

impl Decodable for Vec<u8> {
    fn decode(d: &mut Decoder) -> Result<Self, DecodingError> {
        d.read_bytes().map(|b| b.to_vec())
    }
}

/// A growable output buffer. Every `append_*` method returns the number of
/// bytes written, which callers accumulate into column-length headers.
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The primitive bitstream integer: bounded to 32 bits, matching the
    /// wire format's column ids, counts, and header fields. Panics if `val`
    /// does not fit in a `u32` — that is a caller bug, not a recoverable
    /// encoding failure, since every value passed here is expected to
    /// already satisfy this field's range.
    pub fn append_uint(&mut self, val: u64) -> usize {
        u32::try_from(val).unwrap_or_else(|_| {
            panic!("append_uint: {val} does not fit in 32 bits")
        });
        self.append_uint64(val)
    }

    /// See [`Encoder::append_uint`]; the signed counterpart, bounded to
    /// `[-2^31, 2^31)`.
    pub fn append_int(&mut self, val: i64) -> usize {
        i32::try_from(val).unwrap_or_else(|_| {
            panic!("append_int: {val} does not fit in 32 bits")
        });
        self.append_int64(val)
    }

    /// Full-width LEB128, unsigned. Used for fields the wire format spec's
    /// value encoding explicitly widens past the 32-bit primitive: scalar
    /// `uint` payloads and change timestamps.
    pub fn append_uint64(&mut self, val: u64) -> usize {
        let start = self.buf.len();
        leb128::write::unsigned(&mut self.buf, val).expect("writing to a Vec cannot fail");
        self.buf.len() - start
    }

    /// See [`Encoder::append_uint64`]; the signed counterpart.
    pub fn append_int64(&mut self, val: i64) -> usize {
        let start = self.buf.len();
        leb128::write::signed(&mut self.buf, val).expect("writing to a Vec cannot fail");
        self.buf.len() - start
    }

    /// Raw bytes, no length prefix.
    pub fn append_raw(&mut self, bytes: &[u8]) -> usize {
        self.buf.extend_from_slice(bytes);
        bytes.len()
    }

    /// Length-prefixed (LEB128 unsigned) byte string.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut written = self.append_uint(bytes.len() as u64);
        written += self.append_raw(bytes);
        written
    }

    /// Length-prefixed UTF-8 string.
    pub fn append_str(&mut self, s: &str) -> usize {
        self.append_bytes(s.as_bytes())
    }
}

/// Cursored reader over an immutable byte slice.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn done(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }

    /// The primitive bitstream integer: fails with `Overflow` unless `val`
    /// fits in a `u32`, per the wire format's 32-bit-bounded column ids,
    /// counts, and header fields.
    pub fn read_uint(&mut self) -> Result<u64, DecodingError> {
        let val = self.read_uint64()?;
        u32::try_from(val).map_err(|_| DecodingError::Overflow)?;
        Ok(val)
    }

    /// See [`Decoder::read_uint`]; the signed counterpart, bounded to
    /// `[-2^31, 2^31)`.
    pub fn read_int(&mut self) -> Result<i64, DecodingError> {
        let val = self.read_int64()?;
        i32::try_from(val).map_err(|_| DecodingError::Overflow)?;
        Ok(val)
    }

    /// Full-width LEB128, unsigned, no bound check. Used for fields the
    /// wire format spec's value encoding explicitly widens past the
    /// 32-bit primitive: scalar `uint` payloads and change timestamps.
    pub fn read_uint64(&mut self) -> Result<u64, DecodingError> {
        let mut cursor = self.remaining();
        let before = cursor.len();
        let val = leb128::read::unsigned(&mut cursor)?;
        self.offset += before - cursor.len();
        Ok(val)
    }

    /// See [`Decoder::read_uint64`]; the signed counterpart.
    pub fn read_int64(&mut self) -> Result<i64, DecodingError> {
        let mut cursor = self.remaining();
        let before = cursor.len();
        let val = leb128::read::signed(&mut cursor)?;
        self.offset += before - cursor.len();
        Ok(val)
    }

    pub fn read_uint32(&mut self) -> Result<u32, DecodingError> {
        Ok(self.read_uint()? as u32)
    }

    pub fn read_int32(&mut self) -> Result<i32, DecodingError> {
        Ok(self.read_int()? as i32)
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], DecodingError> {
        if self.offset + len > self.bytes.len() {
            return Err(DecodingError::TryingToReadPastEnd);
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodingError> {
        let len = self.read_uint()? as usize;
        self.read_raw(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, DecodingError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodingError::WrongType {
            expected_one_of: vec![],
            found: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64] {
            let mut e = Encoder::new();
            e.append_uint(v);
            let bytes = e.into_bytes();
            let mut d = Decoder::new(&bytes);
            assert_eq!(d.read_uint().unwrap(), v);
            assert!(d.done());
        }
    }

    #[test]
    fn int_roundtrip() {
        for v in [0i64, -1, 1, -128, 127, i32::MIN as i64, i32::MAX as i64] {
            let mut e = Encoder::new();
            e.append_int(v);
            let bytes = e.into_bytes();
            let mut d = Decoder::new(&bytes);
            assert_eq!(d.read_int().unwrap(), v);
        }
    }

    #[test]
    fn uint64_roundtrip_is_unbounded() {
        let mut e = Encoder::new();
        e.append_uint64(u64::MAX);
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.read_uint64().unwrap(), u64::MAX);
        assert!(d.done());
    }

    #[test]
    fn int64_roundtrip_is_unbounded() {
        let mut e = Encoder::new();
        e.append_int64(i64::MIN);
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.read_int64().unwrap(), i64::MIN);
        assert!(d.done());
    }

    #[test]
    #[should_panic]
    fn append_uint_panics_past_32_bits() {
        let mut e = Encoder::new();
        e.append_uint(u64::MAX);
    }

    #[test]
    fn string_roundtrip() {
        let mut e = Encoder::new();
        e.append_str("hello world");
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.read_str().unwrap(), "hello world");
    }

    #[test]
    fn oversized_uint32_fails() {
        let mut e = Encoder::new();
        e.append_uint64(u64::MAX);
        let bytes = e.into_bytes();
        let mut d = Decoder::new(&bytes);
        assert!(matches!(d.read_uint32(), Err(DecodingError::Overflow)));
    }

    #[test]
    fn reading_past_end_fails() {
        let bytes = [0x01u8];
        let mut d = Decoder::new(&bytes);
        assert!(matches!(
            d.read_raw(5),
            Err(DecodingError::TryingToReadPastEnd)
        ));
    }
}
