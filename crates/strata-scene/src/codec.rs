//! Little-endian byte codec used by the binary scene format.

use crate::SceneError;

// ---------------------------------------------------------------------------
// DataSerializer
// ---------------------------------------------------------------------------

/// Append-only byte writer.
#[derive(Debug, Default, Clone)]
pub struct DataSerializer {
    buf: Vec<u8>,
}

impl DataSerializer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn add_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn add_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn add_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn add_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn add_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// UTF-8 string with a `u8` length prefix. Used for ids and names.
    pub fn add_short_string(&mut self, s: &str) -> Result<(), SceneError> {
        let len = u8::try_from(s.len()).map_err(|_| SceneError::StringTooLong {
            len: s.len(),
            max: u8::MAX as usize,
        })?;
        self.add_u8(len);
        self.add_bytes(s.as_bytes());
        Ok(())
    }

    /// UTF-8 string with a `u16` length prefix. Used for attribute values.
    pub fn add_string(&mut self, s: &str) -> Result<(), SceneError> {
        let len = u16::try_from(s.len()).map_err(|_| SceneError::StringTooLong {
            len: s.len(),
            max: u16::MAX as usize,
        })?;
        self.add_u16(len);
        self.add_bytes(s.as_bytes());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// DataDeserializer
// ---------------------------------------------------------------------------

/// Cursor over a byte slice. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct DataDeserializer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataDeserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SceneError> {
        if self.remaining() < n {
            return Err(SceneError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SceneError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, SceneError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, SceneError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, SceneError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, SceneError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, SceneError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_short_string(&mut self) -> Result<String, SceneError> {
        let len = self.read_u8()? as usize;
        self.read_utf8(len)
    }

    pub fn read_string(&mut self) -> Result<String, SceneError> {
        let len = self.read_u16()? as usize;
        self.read_utf8(len)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String, SceneError> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| SceneError::InvalidUtf8 {
            details: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut ser = DataSerializer::new();
        ser.add_u32(0x0102_0304);
        ser.add_u16(0x0506);
        assert_eq!(ser.as_bytes(), &[4, 3, 2, 1, 6, 5]);
    }

    #[test]
    fn strings_carry_length_prefix() {
        let mut ser = DataSerializer::new();
        ser.add_short_string("ab").unwrap();
        ser.add_string("xyz").unwrap();
        let bytes = ser.into_bytes();
        assert_eq!(&bytes[..3], &[2, b'a', b'b']);

        let mut de = DataDeserializer::new(&bytes);
        assert_eq!(de.read_short_string().unwrap(), "ab");
        assert_eq!(de.read_string().unwrap(), "xyz");
        assert_eq!(de.remaining(), 0);
    }

    #[test]
    fn short_string_rejects_overlong_input() {
        let mut ser = DataSerializer::new();
        let long = "x".repeat(256);
        assert!(matches!(
            ser.add_short_string(&long),
            Err(SceneError::StringTooLong { len: 256, max: 255 })
        ));
        assert!(ser.is_empty());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut de = DataDeserializer::new(&[1, 2]);
        assert!(matches!(
            de.read_u32(),
            Err(SceneError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut de = DataDeserializer::new(&[2, 0xff, 0xfe]);
        assert!(matches!(
            de.read_short_string(),
            Err(SceneError::InvalidUtf8 { .. })
        ));
    }
}
