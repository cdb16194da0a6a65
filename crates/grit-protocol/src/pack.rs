//! Pack file decoding.
//!
//! Pack files carry many objects back to back, optionally
//! delta-compressed against other objects in the same pack.
//! See: https://git-scm.com/docs/pack-format

use crate::delta::{self, DeltaBase, DeltaRecord};
use crate::{ProtocolError, Result};
use bytes::Bytes;
use grit_storage::{decompress_from, ObjectId, ObjectStore, ObjectType};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack file version we support.
const PACK_VERSION: u32 = 2;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

/// In-memory state built up while ingesting one pack.
///
/// Holds every materialized object (undeltified or resolved) keyed by
/// name, plus the name of the object whose record started at each pack
/// offset so ofs-deltas can find their base.
#[derive(Debug, Default)]
pub struct PackStore {
    objects: HashMap<ObjectId, (ObjectType, Bytes)>,
    by_offset: HashMap<u64, ObjectId>,
}

impl PackStore {
    /// Checks whether an object has been materialized.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Looks up a materialized object.
    pub fn get(&self, id: &ObjectId) -> Option<&(ObjectType, Bytes)> {
        self.objects.get(id)
    }

    /// Returns the name of the object whose record began at `offset`.
    pub fn id_at_offset(&self, offset: u64) -> Option<ObjectId> {
        self.by_offset.get(&offset).copied()
    }

    /// Returns the number of materialized objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing has been materialized yet.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn insert(
        &mut self,
        offset: u64,
        id: ObjectId,
        object_type: ObjectType,
        payload: Bytes,
    ) {
        self.objects.insert(id, (object_type, payload));
        self.by_offset.insert(offset, id);
    }
}

enum Record {
    Object(ObjectId),
    Delta(DeltaRecord),
}

/// Parses a pack file, writing its objects through an object store.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser over a raw pack body.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Parses the pack and materializes every object, resolving deltas.
    ///
    /// Undeltified objects are written through the store as they are
    /// decoded; delta records are queued and resolved afterwards. Returns
    /// the names of all materialized objects in materialization order.
    pub fn ingest(mut self, store: &ObjectStore) -> Result<Vec<ObjectId>> {
        let object_count = self.parse_header()?;
        tracing::debug!(objects = object_count, "parsing pack");

        let mut pack = PackStore::default();
        let mut ids = Vec::with_capacity(object_count as usize);
        let mut deltas = Vec::new();
        for _ in 0..object_count {
            match self.parse_record(store, &mut pack)? {
                Record::Object(id) => ids.push(id),
                Record::Delta(record) => deltas.push(record),
            }
        }
        self.verify_trailer()?;

        let resolved = delta::resolve(store, &mut pack, deltas)?;
        ids.extend(resolved);
        Ok(ids)
    }

    fn parse_header(&mut self) -> Result<u32> {
        // Magic, version, count, plus the 20-byte trailer.
        if self.data.len() < 12 + ObjectId::LEN {
            return Err(ProtocolError::MalformedPack("pack too small".to_string()));
        }
        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(ProtocolError::MalformedPack(
                "invalid signature".to_string(),
            ));
        }
        let version =
            u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != PACK_VERSION {
            return Err(ProtocolError::MalformedPack(format!(
                "unsupported version: {}",
                version
            )));
        }
        let count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]);
        self.pos = 12;
        Ok(count)
    }

    fn byte(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| {
            ProtocolError::MalformedPack("unexpected end of pack".to_string())
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a record header: 3-bit type tag and inflated size.
    ///
    /// The first byte carries the tag in bits 6..4 and the low 4 size
    /// bits; continuation bytes contribute 7 bits each, little-endian, so
    /// the shift starts at 4.
    fn read_type_and_size(&mut self) -> Result<(u8, u64)> {
        let first = self.byte()?;
        let tag = (first >> 4) & 0x07;
        let mut size = (first & 0x0F) as u64;
        let mut shift = 4;
        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.byte()?;
            size |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
            more = byte & 0x80 != 0;
        }
        Ok((tag, size))
    }

    /// Reads an ofs-delta base distance.
    ///
    /// Unlike the size encoding this is most-significant-first, and each
    /// continuation adds 1 so no value has two encodings.
    fn read_base_distance(&mut self) -> Result<u64> {
        let mut value = 0u64;
        loop {
            let byte = self.byte()?;
            value = (value << 7) | (byte & 0x7F) as u64;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            value += 1;
        }
    }

    fn read_base_id(&mut self) -> Result<ObjectId> {
        let bytes = self
            .data
            .get(self.pos..self.pos + ObjectId::LEN)
            .ok_or_else(|| {
                ProtocolError::MalformedPack("truncated ref-delta base hash".to_string())
            })?;
        self.pos += ObjectId::LEN;
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Ok(ObjectId::from_bytes(id))
    }

    fn read_compressed(&mut self, expected: u64) -> Result<Vec<u8>> {
        let (bytes, consumed) = decompress_from(self.data, self.pos)?;
        self.pos += consumed;
        if bytes.len() as u64 != expected {
            return Err(ProtocolError::MalformedPack(format!(
                "record inflated to {} bytes, header says {}",
                bytes.len(),
                expected
            )));
        }
        Ok(bytes)
    }

    fn parse_record(&mut self, store: &ObjectStore, pack: &mut PackStore) -> Result<Record> {
        let offset = self.pos as u64;
        let (tag, size) = self.read_type_and_size()?;
        match tag {
            OFS_DELTA => {
                let distance = self.read_base_distance()?;
                let base_offset = offset.checked_sub(distance).ok_or_else(|| {
                    ProtocolError::MalformedPack(format!(
                        "ofs-delta distance {} reaches before the pack start",
                        distance
                    ))
                })?;
                let data = self.read_compressed(size)?;
                let record = delta::parse_delta(DeltaBase::Offset(base_offset), &data, offset)?;
                Ok(Record::Delta(record))
            }
            REF_DELTA => {
                let base = self.read_base_id()?;
                let data = self.read_compressed(size)?;
                let record = delta::parse_delta(DeltaBase::Id(base), &data, offset)?;
                Ok(Record::Delta(record))
            }
            _ => {
                // Rejects tag 0 and the reserved tag 5 with the raw value.
                let object_type = ObjectType::from_pack_type(tag)?;
                let payload = self.read_compressed(size)?;
                let id = store.write(object_type, &payload)?;
                pack.insert(offset, id, object_type, Bytes::from(payload));
                Ok(Record::Object(id))
            }
        }
    }

    /// Checks the trailing SHA-1 over everything before it.
    fn verify_trailer(&mut self) -> Result<()> {
        let trailer = self
            .data
            .get(self.pos..self.pos + ObjectId::LEN)
            .ok_or_else(|| ProtocolError::MalformedPack("missing pack trailer".to_string()))?;
        let mut hasher = Sha1::new();
        hasher.update(&self.data[..self.pos]);
        let computed = hasher.finalize();
        if computed.as_slice() != trailer {
            return Err(ProtocolError::MalformedPack(
                "trailer checksum mismatch".to_string(),
            ));
        }
        self.pos += ObjectId::LEN;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_and_size_single_byte() {
        let mut parser = PackParser::new(&[0x3A]);
        let (tag, size) = parser.read_type_and_size().unwrap();
        assert_eq!(tag, 3);
        assert_eq!(size, 0x0A);
    }

    #[test]
    fn test_type_and_size_continuation_shift_starts_at_four() {
        // 0x90 = continuation, type 1, low bits 0; 0x0a lands at shift 4.
        let mut parser = PackParser::new(&[0x90, 0x0A]);
        let (tag, size) = parser.read_type_and_size().unwrap();
        assert_eq!(tag, 1);
        assert_eq!(size, 0xA0);
    }

    #[test]
    fn test_type_and_size_two_continuations() {
        // low 4 = 0xF, then 0x7F at shift 4, then 0x01 at shift 11.
        let mut parser = PackParser::new(&[0x9F, 0xFF, 0x01]);
        let (tag, size) = parser.read_type_and_size().unwrap();
        assert_eq!(tag, 1);
        assert_eq!(size, 0xF | (0x7F << 4) | (0x01 << 11));
    }

    #[test]
    fn test_base_distance_plain() {
        let mut parser = PackParser::new(&[0x05]);
        assert_eq!(parser.read_base_distance().unwrap(), 5);
    }

    #[test]
    fn test_base_distance_continuation_adds_one() {
        // 0x80 0x00: ((0 + 1) << 7) | 0 = 128, the smallest two-byte value.
        let mut parser = PackParser::new(&[0x80, 0x00]);
        assert_eq!(parser.read_base_distance().unwrap(), 128);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut data = b"JUNK".to_vec();
        data.extend_from_slice(&[0u8; 28]);
        let mut parser = PackParser::new(&data);
        let result = parser.parse_header();
        assert!(matches!(result, Err(ProtocolError::MalformedPack(_))));
    }

    #[test]
    fn test_header_rejects_bad_version() {
        let mut data = b"PACK".to_vec();
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 20]);
        let mut parser = PackParser::new(&data);
        let result = parser.parse_header();
        assert!(matches!(result, Err(ProtocolError::MalformedPack(_))));
    }
}
