use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Map from job display name to completion flag, saved to a JSON file on every change.
#[derive(Debug)]
pub struct JobShelf {
    filename: PathBuf,
    entries: BTreeMap<String, bool>,
}

impl JobShelf {
    pub fn open<T: Into<PathBuf>>(filename: T) -> Result<Self> {
        let filename = filename.into();
        let entries = if filename.exists() {
            let reader = BufReader::new(File::open(&filename)?);
            serde_json::from_reader(reader)
                .with_context(|| format!("reading job shelf {filename:?}"))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { filename, entries })
    }

    /// true if `name` was recorded as complete.
    pub fn get(&self, name: &str) -> bool {
        self.entries.get(name).copied().unwrap_or(false)
    }

    /// true if `name` is on the shelf but was marked incomplete, which forces it to rerun.
    pub fn is_invalidated(&self, name: &str) -> bool {
        self.entries.get(name) == Some(&false)
    }

    pub fn set(&mut self, name: &str, complete: bool) -> Result<()> {
        self.entries.insert(name.to_owned(), complete);
        self.save()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<()> {
        util::fs::make_parent_dirs(&self.filename)?;
        let writer = BufWriter::new(File::create(&self.filename)?);
        serde_json::to_writer_pretty(writer, &self.entries)
            .with_context(|| format!("writing job shelf {:?}", self.filename))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_persists() -> Result<()> {
        let dir = tempdir()?;
        let filename = dir.path().join("shelf/jobs.json");
        let mut shelf = JobShelf::open(&filename)?;
        assert!(shelf.is_empty());
        assert!(!shelf.get("/align"));

        shelf.set("/align", true)?;
        shelf.set("/sample:s1/count", false)?;

        let shelf = JobShelf::open(&filename)?;
        assert!(shelf.get("/align"));
        assert!(!shelf.get("/sample:s1/count"));
        assert!(shelf.is_invalidated("/sample:s1/count"));
        assert!(!shelf.is_invalidated("/align"));
        assert!(!shelf.is_invalidated("/missing"));
        assert_eq!(shelf.len(), 2);

        let names: Vec<&str> = shelf.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["/align", "/sample:s1/count"]);
        Ok(())
    }
}
