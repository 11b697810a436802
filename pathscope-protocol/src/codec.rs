//! Binary codec for pathscope wire values.
//!
//! Every multi-byte primitive is little-endian. Strings carry an `i32` byte
//! length prefix followed by UTF-8 bytes. Arrays carry no length; the count is
//! always sent separately by the caller.
//!
//! Decoding never consumes bytes it cannot use: when a buffer runs short the
//! decoder returns [`CodecError::Incomplete`] and the caller may retry once
//! more bytes have arrived.

use crate::error::{CodecError, TransportError};
use crate::message::Opcode;
use bytes::{Buf, BufMut};

/// A value with a fixed wire representation.
pub trait WireValue: Sized {
    /// Appends the encoded value to `buf`.
    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B);

    /// Reads one value from the front of `buf`.
    fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError>;
}

/// Distinguishes "wait for more bytes" from a final decode failure.
pub trait DecodeFailure {
    fn is_incomplete(&self) -> bool;
}

impl DecodeFailure for CodecError {
    fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::Incomplete { .. })
    }
}

impl DecodeFailure for TransportError {
    fn is_incomplete(&self) -> bool {
        matches!(self, TransportError::Codec(e) if e.is_incomplete())
    }
}

/// Fails with `Incomplete` unless `buf` holds at least `len` bytes.
#[inline]
pub fn ensure<B: Buf + ?Sized>(buf: &B, len: usize) -> Result<(), CodecError> {
    let remaining = buf.remaining();
    if remaining < len {
        return Err(CodecError::Incomplete {
            needed: len - remaining,
        });
    }
    Ok(())
}

macro_rules! primitive_wire_value {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl WireValue for $ty {
                #[inline]
                fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
                    buf.$put(*self);
                }

                #[inline]
                fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
                    ensure(buf, std::mem::size_of::<$ty>())?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

primitive_wire_value! {
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16_le, get_u16_le;
    i16 => put_i16_le, get_i16_le;
    u32 => put_u32_le, get_u32_le;
    i32 => put_i32_le, get_i32_le;
    u64 => put_u64_le, get_u64_le;
    i64 => put_i64_le, get_i64_le;
    f32 => put_f32_le, get_f32_le;
    f64 => put_f64_le, get_f64_le;
}

impl WireValue for bool {
    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_u8(u8::from(*self));
    }

    fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        ensure(buf, 1)?;
        Ok(buf.get_u8() != 0)
    }
}

impl WireValue for String {
    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        encode_str(buf, self);
    }

    fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        ensure(buf, 4)?;
        let len = i32::from_le_bytes(peek::<B, 4>(buf));
        if len < 0 {
            buf.advance(4);
            return Err(CodecError::InvalidLength(len));
        }
        let len = len as usize;
        ensure(buf, 4 + len)?;
        buf.advance(4);

        let mut bytes = vec![0u8; len];
        buf.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl WireValue for Opcode {
    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.put_u16_le(self.code());
    }

    fn decode<B: Buf + ?Sized>(buf: &mut B) -> Result<Self, CodecError> {
        let code = u16::decode(buf)?;
        Opcode::try_from(code)
    }
}

/// Longest string the `i32` length prefix can describe.
const MAX_STRING_LEN: usize = i32::MAX as usize;

/// Encodes a string slice with its `i32` length prefix.
///
/// Strings longer than `i32::MAX` bytes are cut at the last char boundary
/// that fits.
pub fn encode_str<B: BufMut + ?Sized>(buf: &mut B, value: &str) {
    let value = truncate_to(value, MAX_STRING_LEN);
    let len = i32::try_from(value.len()).unwrap_or(i32::MAX);
    buf.put_i32_le(len);
    buf.put_slice(value.as_bytes());
}

/// Longest prefix of `value` that is at most `max` bytes and valid UTF-8.
fn truncate_to(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    tracing::warn!("string of {} bytes truncated to {}", value.len(), max);
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Copies the first `N` bytes without advancing.
///
/// The caller has already checked that `N` bytes are available. The length
/// prefix of a string may straddle chunk boundaries, so this walks chunks.
fn peek<B: Buf + ?Sized, const N: usize>(buf: &B) -> [u8; N] {
    let mut out = [0u8; N];
    let chunk = buf.chunk();
    if chunk.len() >= N {
        out.copy_from_slice(&chunk[..N]);
    } else {
        let mut slices = [std::io::IoSlice::new(&[]); 4];
        let filled = buf.chunks_vectored(&mut slices);
        let mut written = 0;
        for slice in &slices[..filled] {
            let take = (N - written).min(slice.len());
            out[written..written + take].copy_from_slice(&slice[..take]);
            written += take;
            if written == N {
                break;
            }
        }
    }
    out
}

/// Encoding helpers available on every [`BufMut`].
pub trait WireWrite: BufMut {
    fn put_wire<T: WireValue>(&mut self, value: &T) {
        value.encode(self);
    }

    fn put_opcode(&mut self, opcode: Opcode) {
        self.put_u16_le(opcode.code());
    }

    fn put_string(&mut self, value: &str) {
        encode_str(self, value);
    }

    /// Writes values back to back, without a count.
    fn put_array<T: WireValue>(&mut self, values: &[T]) {
        for value in values {
            value.encode(self);
        }
    }
}

impl<B: BufMut + ?Sized> WireWrite for B {}

/// Decoding helpers available on every [`Buf`].
pub trait WireRead: Buf {
    fn get_wire<T: WireValue>(&mut self) -> Result<T, CodecError> {
        T::decode(self)
    }

    /// Reads exactly `count` values written with [`WireWrite::put_array`].
    fn get_array<T: WireValue>(&mut self, count: usize) -> Result<Vec<T>, CodecError> {
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            values.push(T::decode(self)?);
        }
        Ok(values)
    }
}

impl<B: Buf + ?Sized> WireRead for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut buf = BytesMut::new();
        buf.put_wire(&0x0102u16);
        buf.put_wire(&-2i32);
        buf.put_wire(&1.0f32);
        assert_eq!(&buf[..2], &[0x02, 0x01]);
        assert_eq!(&buf[2..6], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&buf[6..10], &1.0f32.to_le_bytes());

        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<u16>().unwrap(), 0x0102);
        assert_eq!(rd.get_wire::<i32>().unwrap(), -2);
        assert_eq!(rd.get_wire::<f32>().unwrap(), 1.0);
        assert!(rd.is_empty());
    }

    #[test]
    fn test_bool_is_one_byte() {
        let mut buf = BytesMut::new();
        buf.put_wire(&true);
        buf.put_wire(&false);
        assert_eq!(&buf[..], &[1, 0]);

        let mut rd: &[u8] = &[0x7F];
        assert!(rd.get_wire::<bool>().unwrap());
    }

    #[test]
    fn test_string_length_prefixed() {
        let mut buf = BytesMut::new();
        buf.put_string("cbox");
        assert_eq!(&buf[..4], &4i32.to_le_bytes());
        assert_eq!(&buf[4..], b"cbox");

        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<String>().unwrap(), "cbox");
        assert!(rd.is_empty());
    }

    #[test]
    fn test_empty_string() {
        let mut buf = BytesMut::new();
        buf.put_string("");
        assert_eq!(buf.len(), 4);
        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<String>().unwrap(), "");
    }

    #[test]
    fn test_incomplete_string_consumes_nothing() {
        let mut buf = BytesMut::new();
        buf.put_string("scene.xml");
        let truncated = &buf[..7];

        let mut rd = truncated;
        let err = rd.get_wire::<String>().unwrap_err();
        assert_eq!(err, CodecError::Incomplete { needed: 6 });
        assert!(err.is_incomplete());
        assert_eq!(rd.len(), 7);
    }

    #[test]
    fn test_negative_string_length() {
        let mut rd: &[u8] = &(-5i32).to_le_bytes();
        assert_eq!(
            rd.get_wire::<String>().unwrap_err(),
            CodecError::InvalidLength(-5)
        );
        // The prefix was read, so it is gone.
        assert!(rd.is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(2);
        buf.put_slice(&[0xC3, 0x28]);
        buf.put_u8(0xFF);
        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<String>().unwrap_err(), CodecError::InvalidUtf8);
        assert_eq!(rd, &[0xFF]);
    }

    #[test]
    fn test_truncate_keeps_char_boundary() {
        assert_eq!(truncate_to("short", 16), "short");
        assert_eq!(truncate_to("abcdef", 3), "abc");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_to("aéb", 2), "a");
    }

    #[test]
    fn test_string_prefix_across_chunks() {
        let mut encoded = BytesMut::new();
        encoded.put_string("split");
        let (head, tail) = encoded.split_at(2);
        let mut chained = head.chain(tail);
        assert_eq!(chained.get_wire::<String>().unwrap(), "split");
    }

    #[test]
    fn test_array_has_no_count() {
        let mut buf = BytesMut::new();
        buf.put_array(&[1.5f32, -2.0, 3.25]);
        assert_eq!(buf.len(), 12);

        let mut rd = &buf[..];
        assert_eq!(rd.get_array::<f32>(3).unwrap(), vec![1.5, -2.0, 3.25]);

        let mut short = &buf[..8];
        assert!(short.get_array::<f32>(3).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_opcode_wire_value() {
        let mut buf = BytesMut::new();
        buf.put_opcode(Opcode::Quit);
        assert_eq!(&buf[..], &[0xcd, 0x1b]);

        let mut rd = &buf[..];
        assert_eq!(rd.get_wire::<Opcode>().unwrap(), Opcode::Quit);

        let mut rd: &[u8] = &[0x99, 0x00];
        assert_eq!(
            rd.get_wire::<Opcode>().unwrap_err(),
            CodecError::UnknownOpcode(0x0099)
        );
    }

    proptest! {
        #[test]
        fn prop_string_survives_any_split(value in ".{0,64}", split in 0usize..80) {
            let mut encoded = BytesMut::new();
            encoded.put_string(&value);
            let split = split.min(encoded.len());
            let (head, tail) = encoded.split_at(split);

            let mut partial = head;
            if split < encoded.len() {
                prop_assert!(partial.get_wire::<String>().unwrap_err().is_incomplete());
                prop_assert_eq!(partial.len(), split);
            }

            let mut chained = head.chain(tail);
            prop_assert_eq!(chained.get_wire::<String>().unwrap(), value);
            prop_assert_eq!(chained.remaining(), 0);
        }

        #[test]
        fn prop_primitive_sequence(a in any::<u16>(), b in any::<i32>(), c in any::<u32>(), flag in any::<bool>()) {
            let mut buf = BytesMut::new();
            buf.put_wire(&a);
            buf.put_wire(&b);
            buf.put_wire(&c);
            buf.put_wire(&flag);
            prop_assert_eq!(buf.len(), 11);

            let mut rd = &buf[..];
            prop_assert_eq!(rd.get_wire::<u16>().unwrap(), a);
            prop_assert_eq!(rd.get_wire::<i32>().unwrap(), b);
            prop_assert_eq!(rd.get_wire::<u32>().unwrap(), c);
            prop_assert_eq!(rd.get_wire::<bool>().unwrap(), flag);
        }
    }

    #[test]
    fn test_transport_error_incomplete() {
        let err: TransportError = CodecError::Incomplete { needed: 1 }.into();
        assert!(err.is_incomplete());
        assert!(!TransportError::Closed.is_incomplete());
    }
}
