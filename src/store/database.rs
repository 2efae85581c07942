//! Durable tile metadata store on top of an embedded transactional database
//!
//! One database file holds any number of namespaces. Each namespace is a
//! separate table named after the library and tile size, so metadata computed
//! under different configurations never mixes. Keys are absolute tile paths and
//! values are encoded [`TileRecord`]s.

use crate::io::error::{Result, store_error};
use crate::store::record::TileRecord;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

type TileTable<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

/// Cache partition key: library name and tile edge length
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    library: String,
    pixel_size: u32,
}

impl Namespace {
    /// Namespace for `library` indexed at `pixel_size`
    pub fn new(library: impl Into<String>, pixel_size: u32) -> Self {
        Self {
            library: library.into(),
            pixel_size,
        }
    }

    /// Library name
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Tile edge length
    pub const fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    /// Table holding this namespace's records
    pub fn table_name(&self) -> String {
        format!("tiles/{}/{}", self.library, self.pixel_size)
    }
}

/// Persistent map from absolute tile path to [`TileRecord`] for one namespace
pub struct TileStore {
    db: Database,
    path: PathBuf,
    table_name: String,
}

impl TileStore {
    /// Open or create the database at `path` and the table for `namespace`
    ///
    /// A write transaction is only committed when the table does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the table created
    pub fn open(path: &Path, namespace: &Namespace) -> Result<Self> {
        let db = Database::create(path).map_err(store_error("open database"))?;
        let store = Self {
            db,
            path: path.to_path_buf(),
            table_name: namespace.table_name(),
        };

        if !store.has_table()? {
            store.create_table()?;
        }
        Ok(store)
    }

    // Read transaction only, so reopening a namespace leaves the file untouched
    fn has_table(&self) -> Result<bool> {
        let txn = self.db.begin_read().map_err(store_error("begin read"))?;
        let opened = txn.open_table(self.table());
        match opened {
            Ok(_table) => Ok(true),
            Err(TableError::TableDoesNotExist(_)) => Ok(false),
            Err(e) => Err(store_error("open namespace")(e)),
        }
    }

    fn create_table(&self) -> Result<()> {
        let txn = self.db.begin_write().map_err(store_error("begin write"))?;
        let table = txn
            .open_table(self.table())
            .map_err(store_error("create namespace"))?;
        drop(table);
        txn.commit().map_err(store_error("commit namespace"))
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the namespace table
    pub fn namespace(&self) -> &str {
        &self.table_name
    }

    fn table(&self) -> TileTable<'_> {
        TableDefinition::new(&self.table_name)
    }

    /// Number of records in the namespace
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails
    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read().map_err(store_error("begin read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(store_error("open namespace"))?;
        table.len().map_err(store_error("count records"))
    }

    /// Whether the namespace holds no records
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up the record for an absolute tile path
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored value is corrupt
    pub fn get(&self, path: &str) -> Result<Option<TileRecord>> {
        let txn = self.db.begin_read().map_err(store_error("begin read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(store_error("open namespace"))?;
        let value = table.get(path).map_err(store_error("get record"))?;
        value
            .map(|guard| TileRecord::decode(path, guard.value()))
            .transpose()
    }

    /// Whether a record exists for an absolute tile path
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    pub fn contains(&self, path: &str) -> Result<bool> {
        let txn = self.db.begin_read().map_err(store_error("begin read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(store_error("open namespace"))?;
        let value = table.get(path).map_err(store_error("get record"))?;
        Ok(value.is_some())
    }

    /// All keys in the namespace, from one consistent snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails
    pub fn keys(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        self.for_each_raw(|key, _| {
            keys.insert(key.to_string());
            Ok(())
        })?;
        Ok(keys)
    }

    /// Insert or overwrite records in a single transaction
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write transaction fails
    pub fn put_batch(&self, records: &[TileRecord]) -> Result<()> {
        let txn = self.db.begin_write().map_err(store_error("begin write"))?;
        {
            let mut table = txn
                .open_table(self.table())
                .map_err(store_error("open namespace"))?;
            for record in records {
                let value = record.encode()?;
                table
                    .insert(record.path.as_str(), value.as_slice())
                    .map_err(store_error("put record"))?;
            }
        }
        txn.commit().map_err(store_error("commit records"))
    }

    /// Remove records in a single transaction, returning how many existed
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails
    pub fn delete_batch(&self, keys: &[String]) -> Result<usize> {
        let txn = self.db.begin_write().map_err(store_error("begin write"))?;
        let mut removed = 0;
        {
            let mut table = txn
                .open_table(self.table())
                .map_err(store_error("open namespace"))?;
            for key in keys {
                if table
                    .remove(key.as_str())
                    .map_err(store_error("delete record"))?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        txn.commit().map_err(store_error("commit deletions"))?;
        Ok(removed)
    }

    /// Visit every raw key and value inside one read transaction
    ///
    /// Values are not decoded, so callers can decide how to treat corrupt
    /// records. Iteration stops at the first error returned by `visit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or `visit` fails
    pub fn for_each_raw<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) -> Result<()>,
    {
        let txn = self.db.begin_read().map_err(store_error("begin read"))?;
        let table = txn
            .open_table(self.table())
            .map_err(store_error("open namespace"))?;

        for entry in table.iter().map_err(store_error("iterate records"))? {
            let (key, value) = entry.map_err(store_error("read record"))?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    /// Visit every decoded record inside one read transaction
    ///
    /// # Errors
    ///
    /// Returns [`crate::MosaicError::CorruptRecord`] on the first record that
    /// does not decode, or any error from the read
    pub fn for_each_record<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(TileRecord),
    {
        self.for_each_raw(|key, value| {
            visit(TileRecord::decode(key, value)?);
            Ok(())
        })
    }

    /// Every decoded record, in key order
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or any record is corrupt
    pub fn records(&self) -> Result<Vec<TileRecord>> {
        let mut records = Vec::new();
        self.for_each_record(|record| records.push(record))?;
        Ok(records)
    }
}
