//! Location codec: a packed (file id, byte offset) source position.
//!
//! A `Location` compares and hashes as one `u64` word. Its on-disk "key"
//! form is the big-endian bytes of that word, which sorts file-major then
//! offset-minor — exactly the ordering the `Symbol` store needs for
//! contiguous per-file prefix scans (spec.md §3, §4.1, §8 invariant 10).

use crate::types::FileId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location(u64);

impl Location {
    /// The null location: file id 0, offset 0.
    pub const NULL: Location = Location(0);

    pub fn pack(file_id: u32, offset: u32) -> Self {
        Location(((file_id as u64) << 32) | offset as u64)
    }

    pub fn from_file(file_id: FileId, offset: u32) -> Self {
        Self::pack(file_id.value(), offset)
    }

    pub fn unpack(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }

    pub fn file_id_raw(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn file_id(self) -> Option<FileId> {
        FileId::new(self.file_id_raw())
    }

    pub fn offset(self) -> u32 {
        self.0 as u32
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// 8-byte big-endian key form used by the `Symbol` store.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Location(u64::from_be_bytes(bytes)))
    }

    /// Smallest key for a given file id — start of that file's prefix scan.
    pub fn key_floor(file_id: u32) -> [u8; 8] {
        Location::pack(file_id, 0).to_key()
    }

    /// One past the largest key for a given file id — exclusive scan end.
    pub fn key_ceiling(file_id: u32) -> [u8; 8] {
        Location::pack(file_id.wrapping_add(1), 0).to_key()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (file, offset) = self.unpack();
        write!(f, "{file}:{offset}")
    }
}
