use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::db::{Database, Store};
use crate::resources::Resource;

use super::path_value;

const WRITE_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct InputFileArg {
    pub resource: Resource,
    store: Arc<dyn Store>,
}

impl InputFileArg {
    pub fn new(resource: Resource, db: &Database) -> Self {
        let filename = resource.get_filename(db.resmgr.as_ref());
        let store = db.storage.create_store(&filename);
        Self { resource, store }
    }

    pub fn resolve(&self) -> Result<Value> {
        path_value(self.store.filename())
    }

    pub fn pull(&self) -> Result<()> {
        self.store.pull()
    }
}

/// A file output. The job writes to a staging path next to the final file,
/// which is only moved into place once the job succeeds.
///
/// With `direct_write` the job is handed the final path instead, and
/// committing only checks that the file was written.
#[derive(Debug, Clone)]
pub struct OutputFileArg {
    pub resource: Resource,
    store: Arc<dyn Store>,
}

impl OutputFileArg {
    pub fn new(resource: Resource, db: &Database, direct_write: bool) -> Self {
        let filename = resource.get_filename(db.resmgr.as_ref());
        let write_filename = if direct_write {
            filename
        } else {
            util::fs::with_suffix(filename, WRITE_SUFFIX)
        };
        let store = db.storage.create_store(&write_filename);
        Self { resource, store }
    }

    pub fn resolve(&self) -> Result<Value> {
        path_value(self.store.filename())
    }

    pub fn allocate(&self) -> Result<()> {
        self.store.allocate()
    }

    pub fn push(&self) -> Result<()> {
        self.store.push()
    }

    pub fn updatedb(&self, db: &mut Database) -> Result<()> {
        self.resource
            .finalize(self.store.filename(), db.resmgr.as_ref())
    }
}
