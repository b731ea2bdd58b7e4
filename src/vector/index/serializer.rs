//! On-disk representation of persistent vector indexes.
//!
//! Layout (all integers little-endian):
//!
//! | Offset | Size | Field                     |
//! |--------|------|---------------------------|
//! | 0      | 4    | magic `b"QLSH"`           |
//! | 4      | 4    | format version: u32       |
//! | 8      | 4    | crc32 of payload: u32     |
//! | 12     | 8    | payload length: u64       |
//! | 20     | n    | JSON [`LshIndexState`]    |

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{QuarryError, Result};
use crate::storage::Storage;
use crate::vector::index::lsh::{LshIndex, LshIndexState};

/// File magic for serialized LSH indexes.
pub const MAGIC: &[u8; 4] = b"QLSH";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header preceding the payload.
pub const HEADER_LEN: usize = 20;

/// Reads and writes [`LshIndex`] state in the envelope format above.
pub struct IndexSerializer;

impl IndexSerializer {
    /// Encode an index into a byte buffer.
    pub fn to_bytes(index: &LshIndex) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Self::write_to(index, &mut buf)?;
        Ok(buf)
    }

    /// Decode an index from a byte buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<LshIndex> {
        let mut reader = bytes;
        let index = Self::read_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(QuarryError::storage(format!(
                "{} trailing bytes after index payload",
                reader.len()
            )));
        }
        Ok(index)
    }

    pub fn write_to<W: Write>(index: &LshIndex, writer: &mut W) -> Result<()> {
        let payload = serde_json::to_vec(&index.to_state())?;
        let crc = crc32fast::hash(&payload);

        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(crc)?;
        writer.write_u64::<LittleEndian>(payload.len() as u64)?;
        writer.write_all(&payload)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<LshIndex> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| QuarryError::storage(format!("truncated index header: {e}")))?;
        if &magic != MAGIC {
            return Err(QuarryError::storage(format!(
                "bad index file magic: {magic:?}"
            )));
        }

        let version = read_header_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(QuarryError::storage(format!(
                "unsupported index format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let expected_crc = read_header_u32(reader)?;
        let len = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| QuarryError::storage(format!("truncated index header: {e}")))?;
        let len = usize::try_from(len)
            .map_err(|_| QuarryError::storage(format!("index payload too large: {len} bytes")))?;

        let mut payload = Vec::new();
        reader.take(len as u64).read_to_end(&mut payload)?;
        if payload.len() != len {
            return Err(QuarryError::storage(format!(
                "truncated index payload: expected {len} bytes, found {}",
                payload.len()
            )));
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(QuarryError::storage(format!(
                "index checksum mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
            )));
        }

        let state: LshIndexState = serde_json::from_slice(&payload)
            .map_err(|e| QuarryError::storage(format!("malformed index payload: {e}")))?;
        LshIndex::from_state(state)
    }

    /// Write an index to `name` in `storage`, replacing any previous file.
    pub fn save(storage: &dyn Storage, name: &str, index: &LshIndex) -> Result<()> {
        let bytes = Self::to_bytes(index)?;
        storage.write_all(name, &bytes)
    }

    /// Read an index from `name` in `storage`. Returns `None` if the file is absent.
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Option<LshIndex>> {
        if !storage.file_exists(name) {
            return Ok(None);
        }
        let bytes = storage.read_all(name)?;
        Self::from_bytes(&bytes).map(Some)
    }
}

fn read_header_u32<R: Read>(reader: &mut R) -> Result<u32> {
    reader
        .read_u32::<LittleEndian>()
        .map_err(|e| QuarryError::storage(format!("truncated index header: {e}")))
}
