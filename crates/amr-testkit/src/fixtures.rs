use std::path::{Path, PathBuf};

use amr_state::Item;

/// Temporary download directory with helpers for planting local copies.
pub struct CacheDir {
    dir: tempfile::TempDir,
}

impl CacheDir {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Destination the driver would use for `item`.
    pub fn dest(&self, item: &Item) -> PathBuf {
        item.local_path(self.dir.path())
    }

    /// Write `bytes` at the item's destination, returning the path.
    pub fn plant(&self, item: &Item, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let p = self.dest(item);
        std::fs::write(&p, bytes)?;
        Ok(p)
    }

    pub fn read(&self, item: &Item) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.dest(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_writes_at_destination() {
        let cache = CacheDir::new().unwrap();
        let item = Item::new("h", "remote/file.fits");
        let p = cache.plant(&item, b"xyz").unwrap();
        assert_eq!(p, cache.path().join("h_file.fits"));
        assert_eq!(cache.read(&item).unwrap(), b"xyz");
    }
}
