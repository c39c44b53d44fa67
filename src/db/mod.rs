use std::path::{Path, PathBuf};

use anyhow::Result;

/// Naming and disposal of temporary resources.
mod resmgr;
pub use resmgr::{ResourceManager, TempsResourceManager};

/// Axis expansion and chunk-list persistence.
mod nodemgr;
pub use nodemgr::{chunks_manager, ChunkNodeManager, NodeManager};

/// Persistent completion ledger.
mod shelf;
pub use shelf::JobShelf;

/// Handles used to stage job logs and argument files.
mod storage;
pub use storage::{FileStorage, FileStore, Storage, Store};

pub(crate) const SHELF_FILE: &str = "job_shelf.json";
const LOGS_DIR: &str = "log";
const TMP_DIR: &str = "tmp";

/// Everything the job lifecycle needs to persist between passes and runs.
///
/// Not internally synchronized: the runner is the only writer, and it
/// touches the database from one thread.
pub struct Database {
    pub job_shelf: JobShelf,
    pub resmgr: Box<dyn ResourceManager>,
    pub nodemgr: Box<dyn NodeManager>,
    pub storage: Box<dyn Storage>,
    pub logs_dir: PathBuf,
}

impl Database {
    pub fn new(
        job_shelf: JobShelf,
        resmgr: Box<dyn ResourceManager>,
        nodemgr: Box<dyn NodeManager>,
        storage: Box<dyn Storage>,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            job_shelf,
            resmgr,
            nodemgr,
            storage,
            logs_dir,
        }
    }

    /// Open the default filesystem-backed database rooted at `temps_dir`.
    pub fn open(temps_dir: &Path) -> Result<Self> {
        let job_shelf = JobShelf::open(temps_dir.join(SHELF_FILE))?;
        let resmgr = TempsResourceManager::new(temps_dir.join(TMP_DIR));
        log::debug!("opened database in {:?}", temps_dir);
        Ok(Self::new(
            job_shelf,
            Box::new(resmgr),
            Box::new(ChunkNodeManager),
            Box::new(FileStorage),
            temps_dir.join(LOGS_DIR),
        ))
    }
}
