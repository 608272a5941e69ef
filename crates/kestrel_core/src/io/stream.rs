//! # Byte Stream Codec
//!
//! Little-endian writer/reader pair shared by the binary scene format and
//! the replication protocol. Counts use a variable-length encoding (7 data
//! bits per byte, high bit continues) so small graphs stay small; float
//! groups go through `bytemuck` pod casts.
//!
//! Every read is bounds-checked and surfaces
//! [`SceneError::MalformedStream`] instead of panicking: these streams come
//! from disk and from the network, and are untrusted by default.

use glam::{Quat, Vec3};

use crate::error::{SceneError, SceneResult};
use crate::variant::{Variant, VariantKind};

/// Grow-on-write byte sink.
#[derive(Debug, Default)]
pub struct StreamWriter {
    buffer: Vec<u8>,
}

impl StreamWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Number of bytes written so far.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Borrows the bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes raw bytes verbatim.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i64 in little-endian format.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes an unsigned value in variable-length encoding.
    pub fn write_vle(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_vle(value.len() as u32);
        self.write_bytes(value.as_bytes());
    }

    /// Writes a float group as a pod cast.
    pub fn write_f32_array(&mut self, values: &[f32]) {
        self.write_bytes(bytemuck::cast_slice(values));
    }

    /// Writes a three-component vector.
    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32_array(&value.to_array());
    }

    /// Writes a quaternion.
    pub fn write_quat(&mut self, value: Quat) {
        self.write_f32_array(&value.to_array());
    }

    /// Writes a variant as discriminant byte plus payload.
    pub fn write_variant(&mut self, value: &Variant) {
        self.write_u8(value.kind() as u8);
        match value {
            Variant::Empty => {}
            Variant::Bool(v) => self.write_bool(*v),
            Variant::Int(v) => self.write_i64(*v),
            Variant::Float(v) => self.write_f32(*v),
            Variant::Vec3(v) => self.write_vec3(*v),
            Variant::Quat(v) => self.write_quat(*v),
            Variant::String(v) => self.write_string(v),
            Variant::Buffer(v) => {
                self.write_vle(v.len() as u32);
                self.write_bytes(v);
            }
            Variant::NodeRef(v) | Variant::ComponentRef(v) => self.write_u32(*v),
        }
    }
}

/// Bounds-checked reader over a borrowed byte slice.
#[derive(Debug)]
pub struct StreamReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> StreamReader<'a> {
    /// Creates a reader starting at the beginning of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Creates a reader resuming at byte `position`.
    #[must_use]
    pub const fn at(buffer: &'a [u8], position: usize) -> Self {
        Self { buffer, position }
    }

    /// Current byte offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// True once the whole buffer has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> SceneResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(SceneError::MalformedStream(format!(
                "unexpected end of stream: wanted {len} bytes at offset {}, {} remain",
                self.position,
                self.remaining()
            )));
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// [`SceneError::MalformedStream`] at end of stream. The same applies
    /// to every other read method.
    pub fn read_u8(&mut self) -> SceneResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> SceneResult<&'a [u8]> {
        self.take(len)
    }

    /// Reads a little-endian u16.
    pub fn read_u16(&mut self) -> SceneResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian u32.
    pub fn read_u32(&mut self) -> SceneResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian i64.
    pub fn read_i64(&mut self) -> SceneResult<i64> {
        let bytes = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(array))
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self) -> SceneResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a bool byte; any nonzero value is true.
    pub fn read_bool(&mut self) -> SceneResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a variable-length-encoded unsigned value.
    pub fn read_vle(&mut self) -> SceneResult<u32> {
        let mut value: u32 = 0;
        for shift in 0..5u32 {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(SceneError::MalformedStream(
            "variable-length value longer than 5 bytes".into(),
        ))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> SceneResult<String> {
        let len = self.read_vle()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SceneError::MalformedStream("string is not valid UTF-8".into()))
    }

    /// Reads a fixed-size float group through a pod cast.
    pub fn read_f32_array<const N: usize>(&mut self) -> SceneResult<[f32; N]> {
        let bytes = self.take(N * 4)?;
        let mut out = [0.0f32; N];
        for (i, slot) in out.iter_mut().enumerate() {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            *slot = f32::from_ne_bytes(buf);
        }
        Ok(out)
    }

    /// Reads a three-component vector.
    pub fn read_vec3(&mut self) -> SceneResult<Vec3> {
        Ok(Vec3::from_array(self.read_f32_array::<3>()?))
    }

    /// Reads a quaternion.
    pub fn read_quat(&mut self) -> SceneResult<Quat> {
        Ok(Quat::from_array(self.read_f32_array::<4>()?))
    }

    /// Reads a variant: discriminant byte plus payload.
    pub fn read_variant(&mut self) -> SceneResult<Variant> {
        let byte = self.read_u8()?;
        let kind = VariantKind::from_u8(byte).ok_or_else(|| {
            SceneError::MalformedStream(format!("unknown variant discriminant {byte}"))
        })?;
        Ok(match kind {
            VariantKind::Empty => Variant::Empty,
            VariantKind::Bool => Variant::Bool(self.read_bool()?),
            VariantKind::Int => Variant::Int(self.read_i64()?),
            VariantKind::Float => Variant::Float(self.read_f32()?),
            VariantKind::Vec3 => Variant::Vec3(self.read_vec3()?),
            VariantKind::Quat => Variant::Quat(self.read_quat()?),
            VariantKind::String => Variant::String(self.read_string()?),
            VariantKind::Buffer => {
                let len = self.read_vle()? as usize;
                Variant::Buffer(self.take(len)?.to_vec())
            }
            VariantKind::NodeRef => Variant::NodeRef(self.read_u32()?),
            VariantKind::ComponentRef => Variant::ComponentRef(self.read_u32()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut w = StreamWriter::new();
        w.write_u8(0xAB);
        w.write_u16(0x1234);
        w.write_u32(0xDEAD_BEEF);
        w.write_i64(-42);
        w.write_f32(1.25);
        w.write_bool(true);
        w.write_string("kestrel");

        let bytes = w.into_bytes();
        let mut r = StreamReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.read_f32().unwrap(), 1.25);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_string().unwrap(), "kestrel");
        assert!(r.is_eof());
    }

    #[test]
    fn test_vle_boundaries() {
        for value in [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX] {
            let mut w = StreamWriter::new();
            w.write_vle(value);
            let bytes = w.into_bytes();
            let mut r = StreamReader::new(&bytes);
            assert_eq!(r.read_vle().unwrap(), value, "value {value}");
        }
        // Small counts stay single-byte.
        let mut w = StreamWriter::new();
        w.write_vle(100);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_variant_roundtrip() {
        let values = [
            Variant::Empty,
            Variant::Bool(false),
            Variant::Int(i64::MIN),
            Variant::Float(-0.5),
            Variant::Vec3(Vec3::new(1.0, 2.0, 3.0)),
            Variant::Quat(Quat::from_rotation_y(0.7)),
            Variant::String("scene".into()),
            Variant::Buffer(vec![9, 8, 7]),
            Variant::NodeRef(0x0100_0001),
            Variant::ComponentRef(17),
        ];
        let mut w = StreamWriter::new();
        for v in &values {
            w.write_variant(v);
        }
        let bytes = w.into_bytes();
        let mut r = StreamReader::new(&bytes);
        for v in &values {
            assert_eq!(&r.read_variant().unwrap(), v);
        }
    }

    #[test]
    fn test_truncated_stream_errors() {
        let mut w = StreamWriter::new();
        w.write_u32(5);
        let bytes = w.into_bytes();

        let mut r = StreamReader::new(&bytes[..2]);
        assert!(matches!(
            r.read_u32(),
            Err(SceneError::MalformedStream(_))
        ));
    }

    #[test]
    fn test_invalid_discriminant_errors() {
        let bytes = [0xFFu8];
        let mut r = StreamReader::new(&bytes);
        assert!(r.read_variant().is_err());
    }

    #[test]
    fn test_reader_resume_at_offset() {
        let mut w = StreamWriter::new();
        w.write_u32(1);
        w.write_u32(2);
        let bytes = w.into_bytes();

        let mut r = StreamReader::at(&bytes, 4);
        assert_eq!(r.read_u32().unwrap(), 2);
        assert_eq!(r.position(), 8);
    }
}
