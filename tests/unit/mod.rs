//! Unit tests mirroring the `src/` tree, one file per source file


/// Image files for tests that need real tiles on disk
pub mod fixtures {
    use image::{Rgba, RgbaImage};
    use redb::{Database, TableDefinition};
    use std::path::{Path, PathBuf};

    /// Write a `width` x `height` PNG of a single color into `dir`
    pub fn solid_png(dir: &Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        let image = RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        assert!(image.save(&path).is_ok(), "fixture image should be written");
        path
    }

    /// Write a square single-color tile into `dir`
    pub fn solid_tile(dir: &Path, name: &str, side: u32, rgb: [u8; 3]) -> PathBuf {
        solid_png(dir, name, side, side, rgb)
    }

    /// Store a raw value in a namespace table, bypassing record encoding
    pub fn insert_raw(database: &Path, table: &str, key: &str, value: &[u8]) {
        let definition: TableDefinition<'_, &'static str, &'static [u8]> =
            TableDefinition::new(table);
        let written = Database::create(database)
            .map_err(redb::Error::from)
            .and_then(|db| {
                let txn = db.begin_write()?;
                {
                    let mut entries = txn.open_table(definition)?;
                    let _ = entries.insert(key, value)?;
                }
                txn.commit()?;
                Ok(())
            });
        assert!(written.is_ok(), "raw value should be written");
    }
}
