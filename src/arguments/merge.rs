use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::db::{Database, Store};
use crate::node::Node;
use crate::resources::{Resource, TempObjManager};

use super::{chunks_input, path_value, FileKind};

/// Every chunk's file of a split axis, passed as a map from chunk to path.
#[derive(Debug, Clone)]
pub struct MergeFileArg {
    pub axis: String,
    pub node: Node,
    chunks: Vec<(String, Resource, Arc<dyn Store>)>,
}

impl MergeFileArg {
    pub(crate) fn new(
        name: &str,
        axis: &str,
        node: &Node,
        kind: &FileKind,
        db: &mut Database,
    ) -> Result<Self> {
        let values = db.nodemgr.retrieve_chunks(axis, node, db.resmgr.as_ref())?;
        let mut chunks = Vec::with_capacity(values.len());
        for chunk in values {
            let resource = kind.resource(name, &node.child(axis, &chunk), db)?;
            let store = db
                .storage
                .create_store(&resource.get_filename(db.resmgr.as_ref()));
            chunks.push((chunk, resource, store));
        }
        Ok(Self {
            axis: axis.to_owned(),
            node: node.clone(),
            chunks,
        })
    }

    pub fn inputs(&self) -> Vec<Resource> {
        let mut inputs: Vec<Resource> = self.chunks.iter().map(|(_, r, _)| r.clone()).collect();
        inputs.push(chunks_input(&self.axis, &self.node));
        inputs
    }

    pub fn resolve(&self) -> Result<Value> {
        let mut paths = Map::with_capacity(self.chunks.len());
        for (chunk, _, store) in &self.chunks {
            paths.insert(chunk.clone(), path_value(store.filename())?);
        }
        Ok(Value::Object(paths))
    }

    pub fn pull(&self) -> Result<()> {
        for (_, _, store) in &self.chunks {
            store.pull()?;
        }
        Ok(())
    }
}

/// Every chunk's object of a split axis, passed as a map from chunk to value.
#[derive(Debug, Clone)]
pub struct MergeObjArg {
    pub axis: String,
    pub node: Node,
    chunks: Vec<(String, TempObjManager)>,
}

impl MergeObjArg {
    pub fn new(name: &str, axis: &str, node: &Node, db: &Database) -> Result<Self> {
        let chunks = db
            .nodemgr
            .retrieve_chunks(axis, node, db.resmgr.as_ref())?
            .into_iter()
            .map(|chunk| {
                let mgr = TempObjManager::new(name, &node.child(axis, &chunk));
                (chunk, mgr)
            })
            .collect();
        Ok(Self {
            axis: axis.to_owned(),
            node: node.clone(),
            chunks,
        })
    }

    pub fn inputs(&self) -> Vec<Resource> {
        let mut inputs: Vec<Resource> = self
            .chunks
            .iter()
            .map(|(_, mgr)| Resource::TempObj(mgr.input()))
            .collect();
        inputs.push(chunks_input(&self.axis, &self.node));
        inputs
    }

    pub fn resolve(&self, db: &Database) -> Result<Value> {
        let mut values = Map::with_capacity(self.chunks.len());
        for (chunk, mgr) in &self.chunks {
            values.insert(chunk.clone(), mgr.get_obj(db.resmgr.as_ref())?);
        }
        Ok(Value::Object(values))
    }
}
