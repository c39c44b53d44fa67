use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Creates handles for files a job reads or writes.
pub trait Storage {
    fn create_store(&self, filename: &Path) -> Arc<dyn Store>;
}

/// One staged file. `allocate` prepares it for writing, `pull` makes it
/// available for reading, and `push` publishes what was written.
pub trait Store: Send + Sync + Debug {
    fn filename(&self) -> &Path;
    fn allocate(&self) -> Result<()>;
    fn pull(&self) -> Result<()>;
    fn push(&self) -> Result<()>;
}

/// Storage on the local filesystem, where files are already where jobs use them.
#[derive(Debug, Default)]
pub struct FileStorage;

impl Storage for FileStorage {
    fn create_store(&self, filename: &Path) -> Arc<dyn Store> {
        Arc::new(FileStore {
            filename: filename.to_owned(),
        })
    }
}

#[derive(Debug)]
pub struct FileStore {
    filename: PathBuf,
}

impl Store for FileStore {
    fn filename(&self) -> &Path {
        &self.filename
    }

    fn allocate(&self) -> Result<()> {
        util::fs::make_parent_dirs(&self.filename)?;
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        if !self.filename.exists() {
            return Err(anyhow!("missing input {:?}", self.filename));
        }
        Ok(())
    }

    fn push(&self) -> Result<()> {
        Ok(())
    }
}
