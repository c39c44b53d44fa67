use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::db::{Database, Store};
use crate::node::{check_chunk, Node};
use crate::resources::{Error, Resource, TempObjManager};

use super::{chunk_values, chunks_output, path_value, FileKind};

const STAGING_SUFFIX: &str = "._split";

/// A file output split over a new axis.
///
/// The job is handed a staging directory and writes one file per chunk,
/// named after the chunk. On success each file is moved to the resource of
/// its chunk and the chunk list is stored.
#[derive(Debug, Clone)]
pub struct SplitFileArg {
    pub name: String,
    pub axis: String,
    pub node: Node,
    kind: FileKind,
    chunks: Vec<Resource>,
    store: Arc<dyn Store>,
}

impl SplitFileArg {
    pub(crate) fn new(
        name: &str,
        axis: &str,
        node: &Node,
        kind: FileKind,
        db: &mut Database,
    ) -> Result<Self> {
        let existing = db.nodemgr.retrieve_chunks(axis, node, db.resmgr.as_ref())?;
        let mut chunks = Vec::with_capacity(existing.len());
        for chunk in &existing {
            chunks.push(kind.resource(name, &node.child(axis, chunk), db)?);
        }
        let staging = db
            .resmgr
            .get_filename(&format!("{name}{STAGING_SUFFIX}"), node);
        let store = db.storage.create_store(&staging);
        Ok(Self {
            name: name.to_owned(),
            axis: axis.to_owned(),
            node: node.clone(),
            kind,
            chunks,
            store,
        })
    }

    pub fn outputs(&self) -> Vec<Resource> {
        let mut outputs = self.chunks.clone();
        outputs.push(chunks_output(&self.axis, &self.node));
        outputs
    }

    pub fn resolve(&self) -> Result<Value> {
        path_value(self.store.filename())
    }

    /// Start from an empty staging directory.
    pub fn allocate(&self) -> Result<()> {
        self.store.allocate()?;
        let staging = self.store.filename();
        if staging.exists() {
            std::fs::remove_dir_all(staging)?;
        }
        util::fs::makedirs(staging)?;
        Ok(())
    }

    pub fn push(&self) -> Result<()> {
        self.store.push()
    }

    pub fn updatedb(&mut self, db: &mut Database) -> Result<bool> {
        let staging = self.store.filename().to_owned();
        if !staging.is_dir() {
            return Err(Error::OutputMissing(staging.display().to_string()).into());
        }

        let mut chunks = Vec::new();
        let mut resources = Vec::new();
        for entry in std::fs::read_dir(&staging)? {
            let entry = entry?;
            let chunk = entry
                .file_name()
                .into_string()
                .map_err(|_| util::PathEncodingError)?;
            let resource = self
                .kind
                .resource(&self.name, &self.node.child(&self.axis, &chunk), db)?;
            resource
                .finalize(&entry.path(), db.resmgr.as_ref())
                .with_context(|| format!("finalizing chunk {chunk} of {}", self.name))?;
            chunks.push(chunk);
            resources.push(resource);
        }
        std::fs::remove_dir_all(&staging)?;
        self.chunks = resources;

        db.nodemgr
            .store_chunks(&self.axis, &self.node, &chunks, db.resmgr.as_ref())
    }
}

/// An object output split over a new axis. The job returns a map from chunk to
/// value (or a list, indexed by position).
#[derive(Debug, Clone)]
pub struct SplitObjArg {
    pub name: String,
    pub axis: String,
    pub node: Node,
    pub value: Option<Value>,
    chunks: Vec<TempObjManager>,
}

impl SplitObjArg {
    pub fn new(name: &str, axis: &str, node: &Node, db: &Database) -> Result<Self> {
        let chunks = db
            .nodemgr
            .retrieve_chunks(axis, node, db.resmgr.as_ref())?
            .iter()
            .map(|chunk| TempObjManager::new(name, &node.child(axis, chunk)))
            .collect();
        Ok(Self {
            name: name.to_owned(),
            axis: axis.to_owned(),
            node: node.clone(),
            value: None,
            chunks,
        })
    }

    pub fn outputs(&self) -> Vec<Resource> {
        let mut outputs: Vec<Resource> = self
            .chunks
            .iter()
            .map(|mgr| Resource::TempObj(mgr.output()))
            .collect();
        outputs.push(chunks_output(&self.axis, &self.node));
        outputs
    }

    pub fn updatedb(&mut self, db: &mut Database) -> Result<bool> {
        let value = self.value.as_ref().ok_or_else(|| {
            let output = TempObjManager::new(&self.name, &self.node).output();
            Error::OutputMissing(Resource::TempObj(output).build_displayname())
        })?;
        let values = chunk_values(value)?;
        for (chunk, _) in &values {
            check_chunk(&self.axis, chunk)?;
        }
        let mut chunks = Vec::new();
        let mut managers = Vec::new();
        for (chunk, value) in values {
            let mgr = TempObjManager::new(&self.name, &self.node.child(&self.axis, &chunk));
            mgr.finalize(&value, db.resmgr.as_ref())?;
            chunks.push(chunk);
            managers.push(mgr);
        }
        self.chunks = managers;
        db.nodemgr
            .store_chunks(&self.axis, &self.node, &chunks, db.resmgr.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceId;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_split_files_discovers_chunks() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let node = Node::root().child("sample", "s1");
        let mut arg = SplitFileArg::new("reads", "part", &node, FileKind::Temp, &mut db)?;
        // no chunks yet: only the chunk list is an output.
        assert_eq!(arg.outputs().len(), 1);

        arg.allocate()?;
        let staging = arg.resolve()?;
        let staging = std::path::Path::new(staging.as_str().unwrap_or_default()).to_owned();
        std::fs::write(staging.join("a"), "1")?;
        std::fs::write(staging.join("b"), "2")?;
        assert!(arg.updatedb(&mut db)?);
        assert!(!staging.exists());

        let chunks = db.nodemgr.retrieve_chunks("part", &node, db.resmgr.as_ref())?;
        assert_eq!(chunks, ["a", "b"]);
        let ids: Vec<ResourceId> = arg.outputs().iter().map(Resource::id).collect();
        assert!(ids.contains(&ResourceId {
            name: "reads".to_owned(),
            node: node.child("part", "a"),
        }));
        for output in arg.outputs() {
            assert!(output.get_exists(db.resmgr.as_ref()));
        }

        // rebinding sees the stored chunks.
        let rebound = SplitFileArg::new("reads", "part", &node, FileKind::Temp, &mut db)?;
        assert_eq!(rebound.outputs().len(), 3);
        Ok(())
    }

    #[test]
    fn test_split_files_requires_staging() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let mut arg = SplitFileArg::new("reads", "part", &Node::root(), FileKind::Temp, &mut db)?;
        assert!(arg.updatedb(&mut db).is_err());
        Ok(())
    }

    #[test]
    fn test_split_obj() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let root = Node::root();
        let mut arg = SplitObjArg::new("params", "k", &root, &db)?;
        arg.value = Some(json!({"x": 1, "y": [2]}));
        assert!(arg.updatedb(&mut db)?);

        let y = TempObjManager::new("params", &root.child("k", "y"));
        assert_eq!(y.get_obj(db.resmgr.as_ref())?, json!([2]));

        // same values, same chunks.
        assert!(!arg.updatedb(&mut db)?);
        Ok(())
    }

    #[test]
    fn test_split_obj_rejects_escaping_chunk() -> Result<()> {
        let dir = tempdir()?;
        let temps = dir.path().join("temps");
        let mut db = Database::open(&temps)?;
        let root = Node::root();
        let mut arg = SplitObjArg::new("params", "k", &root, &db)?;
        arg.value = Some(json!({"fine": 1, "../../outside": 2}));
        let err = arg.updatedb(&mut db).expect_err("chunk escapes the temps dir");
        assert!(matches!(
            err.downcast_ref::<crate::node::Error>(),
            Some(crate::node::Error::InvalidChunk { .. })
        ));
        // nothing was written for either chunk.
        let fine = TempObjManager::new("params", &root.child("k", "fine"));
        assert!(!fine.output().get_exists(db.resmgr.as_ref()));
        assert!(!dir.path().join("outside").exists());
        Ok(())
    }
}
