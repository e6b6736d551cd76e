use crate::error::WorldError;

/// Little-endian cursor over a saved property blob.
#[derive(Debug, Clone)]
pub struct PropStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PropStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WorldError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WorldError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WorldError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, WorldError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, WorldError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, WorldError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    /// u16 length followed by the bytes. Invalid UTF-8 is replaced.
    pub fn read_string(&mut self) -> Result<String, WorldError> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WorldError> {
        if self.remaining() < len {
            return Err(WorldError::PropStream(format!(
                "wanted {} bytes at offset {}, {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), WorldError> {
        self.read_bytes(len).map(|_| ())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PropWriteStream {
    data: Vec<u8>,
}

impl PropWriteStream {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Strings longer than a u16 length can describe are cut.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(usize::from(u16::MAX));
        self.write_u16(len as u16);
        self.data.extend_from_slice(&bytes[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_little_endian() {
        let mut writer = PropWriteStream::new();
        writer.write_u16(0x1234);
        writer.write_u32(0xdead_beef);
        assert_eq!(writer.as_slice(), &[0x34, 0x12, 0xef, 0xbe, 0xad, 0xde]);

        let mut reader = PropStream::new(writer.as_slice());
        assert_eq!(reader.read_u16().expect("u16"), 0x1234);
        assert_eq!(reader.read_u32().expect("u32"), 0xdead_beef);
        assert!(reader.is_empty());
    }

    #[test]
    fn strings_carry_a_u16_length() {
        let mut writer = PropWriteStream::new();
        writer.write_string("Ana\nBruno");
        writer.write_u8(7);
        assert_eq!(&writer.as_slice()[..2], &[9, 0]);

        let mut reader = PropStream::new(writer.as_slice());
        assert_eq!(reader.read_string().expect("string"), "Ana\nBruno");
        assert_eq!(reader.read_u8().expect("u8"), 7);
    }

    #[test]
    fn short_reads_fail_without_moving() {
        let data = [1u8, 2, 3];
        let mut reader = PropStream::new(&data);
        assert!(matches!(reader.read_u32(), Err(WorldError::PropStream(_))));
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.read_u16().expect("u16"), 0x0201);
        assert!(reader.read_string().is_err());
    }
}
