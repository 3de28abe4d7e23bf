//! The six named stores a project opens (spec.md §2, §4.1): `SymbolName`,
//! `Symbol`, `Dependency`, `FileInformation`, `PCH`, `General`.
//!
//! `General` carries a schema version stamp under key `b"version"`; a
//! mismatch against [`SCHEMA_VERSION`] forces a full re-index rather than
//! attempting to read stale records (spec.md §6).

use super::handle::{StoreHandle, StoreHandleMut};
use super::store::Store;
use crate::error::IndexResult;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

const VERSION_KEY: &[u8] = b"version";

pub struct Stores {
    symbol_name: Store,
    symbol: Store,
    dependency: Store,
    file_information: Store,
    pch: Store,
    general: Store,
    batch_flush_bytes: usize,
}

/// Outcome of opening the store set, telling the caller whether the
/// on-disk schema matched.
pub enum OpenOutcome {
    UpToDate(Stores),
    /// Stores were wiped and reinitialized; callers must re-index everything.
    Reinitialized(Stores),
}

impl Stores {
    pub fn open(root: &Path, batch_flush_bytes: usize) -> IndexResult<OpenOutcome> {
        let symbol_name = Store::open(root, "SymbolName")?;
        let symbol = Store::open(root, "Symbol")?;
        let dependency = Store::open(root, "Dependency")?;
        let file_information = Store::open(root, "FileInformation")?;
        let pch = Store::open(root, "PCH")?;
        let general = Store::open(root, "General")?;

        let on_disk_version = general
            .get(VERSION_KEY)
            .map(|bytes| u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4])));

        match on_disk_version {
            None => {
                general.put(VERSION_KEY.to_vec(), SCHEMA_VERSION.to_le_bytes().to_vec());
                let stores = Self {
                    symbol_name,
                    symbol,
                    dependency,
                    file_information,
                    pch,
                    general,
                    batch_flush_bytes,
                };
                stores.persist_all()?;
                Ok(OpenOutcome::UpToDate(stores))
            }
            Some(v) if v == SCHEMA_VERSION => Ok(OpenOutcome::UpToDate(Self {
                symbol_name,
                symbol,
                dependency,
                file_information,
                pch,
                general,
                batch_flush_bytes,
            })),
            Some(v) => {
                tracing::warn!(
                    "schema mismatch (on-disk {}, expected {}); reinitializing stores",
                    v,
                    SCHEMA_VERSION
                );
                for store in [&symbol_name, &symbol, &dependency, &file_information, &pch] {
                    for (key, _) in store.prefix(&[]) {
                        store.delete(&key);
                    }
                }
                general.put(VERSION_KEY.to_vec(), SCHEMA_VERSION.to_le_bytes().to_vec());
                let stores = Self {
                    symbol_name,
                    symbol,
                    dependency,
                    file_information,
                    pch,
                    general,
                    batch_flush_bytes,
                };
                stores.persist_all()?;
                Ok(OpenOutcome::Reinitialized(stores))
            }
        }
    }

    pub fn symbol_name(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.symbol_name)
    }
    pub fn symbol_name_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.symbol_name, self.batch_flush_bytes)
    }

    pub fn symbol(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.symbol)
    }
    pub fn symbol_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.symbol, self.batch_flush_bytes)
    }

    pub fn dependency(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.dependency)
    }
    pub fn dependency_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.dependency, self.batch_flush_bytes)
    }

    pub fn file_information(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.file_information)
    }
    pub fn file_information_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.file_information, self.batch_flush_bytes)
    }

    pub fn pch(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.pch)
    }
    pub fn pch_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.pch, self.batch_flush_bytes)
    }

    pub fn general(&self) -> StoreHandle<'_> {
        StoreHandle::new(&self.general)
    }
    pub fn general_mut(&self) -> StoreHandleMut<'_> {
        StoreHandleMut::new(&self.general, self.batch_flush_bytes)
    }

    pub fn persist_all(&self) -> IndexResult<()> {
        self.symbol_name.persist()?;
        self.symbol.persist()?;
        self.dependency.persist()?;
        self.file_information.persist()?;
        self.pch.persist()?;
        self.general.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_open_stamps_current_version() {
        let dir = TempDir::new().unwrap();
        match Stores::open(dir.path(), 1024).unwrap() {
            OpenOutcome::UpToDate(stores) => {
                let raw = stores.general().get(VERSION_KEY).unwrap();
                assert_eq!(u32::from_le_bytes(raw.try_into().unwrap()), SCHEMA_VERSION);
            }
            OpenOutcome::Reinitialized(_) => panic!("fresh store should not reinitialize"),
        }
    }

    #[test]
    fn reopen_with_matching_version_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        {
            Stores::open(dir.path(), 1024).unwrap();
        }
        match Stores::open(dir.path(), 1024).unwrap() {
            OpenOutcome::UpToDate(_) => {}
            OpenOutcome::Reinitialized(_) => panic!("matching version should not reinitialize"),
        }
    }

    #[test]
    fn stale_version_triggers_reinitialization() {
        let dir = TempDir::new().unwrap();
        {
            let general = Store::open(dir.path(), "General").unwrap();
            general.put(VERSION_KEY.to_vec(), 0u32.to_le_bytes().to_vec());
            general.persist().unwrap();
        }
        match Stores::open(dir.path(), 1024).unwrap() {
            OpenOutcome::Reinitialized(stores) => {
                let raw = stores.general().get(VERSION_KEY).unwrap();
                assert_eq!(u32::from_le_bytes(raw.try_into().unwrap()), SCHEMA_VERSION);
            }
            OpenOutcome::UpToDate(_) => panic!("stale version should reinitialize"),
        }
    }
}
