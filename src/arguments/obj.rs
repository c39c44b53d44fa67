use anyhow::Result;
use serde_json::Value;

use crate::db::{chunks_manager, Database};
use crate::node::Node;
use crate::resources::{Error, Resource, TempObjManager};

#[derive(Debug, Clone)]
pub struct InputObjArg {
    pub manager: TempObjManager,
}

impl InputObjArg {
    pub fn new(manager: TempObjManager) -> Self {
        Self { manager }
    }

    pub fn resolve(&self, db: &Database) -> Result<Value> {
        self.manager.get_obj(db.resmgr.as_ref())
    }
}

/// Receives the job function's return value.
#[derive(Debug, Clone)]
pub struct OutputObjArg {
    pub manager: TempObjManager,
    pub value: Option<Value>,
}

impl OutputObjArg {
    pub fn new(manager: TempObjManager) -> Self {
        Self {
            manager,
            value: None,
        }
    }

    pub fn updatedb(&self, db: &mut Database) -> Result<bool> {
        let value = self.value.as_ref().ok_or_else(|| {
            Error::OutputMissing(Resource::TempObj(self.manager.output()).build_displayname())
        })?;
        self.manager.finalize(value, db.resmgr.as_ref())
    }
}

/// The values of an axis, as stored by the node manager.
#[derive(Debug, Clone)]
pub struct InputChunksArg {
    pub axis: String,
    pub node: Node,
}

impl InputChunksArg {
    pub fn new(axis: &str, node: &Node) -> Self {
        Self {
            axis: axis.to_owned(),
            node: node.clone(),
        }
    }

    pub fn manager(&self) -> TempObjManager {
        chunks_manager(&self.axis, &self.node)
    }

    pub fn resolve(&self, db: &Database) -> Result<Value> {
        let chunks = db
            .nodemgr
            .retrieve_chunks(&self.axis, &self.node, db.resmgr.as_ref())?;
        Ok(Value::from(chunks))
    }
}

/// Sets the values of an axis from the job function's returned list.
#[derive(Debug, Clone)]
pub struct OutputChunksArg {
    pub axis: String,
    pub node: Node,
    pub value: Option<Value>,
}

impl OutputChunksArg {
    pub fn new(axis: &str, node: &Node) -> Self {
        Self {
            axis: axis.to_owned(),
            node: node.clone(),
            value: None,
        }
    }

    pub fn manager(&self) -> TempObjManager {
        chunks_manager(&self.axis, &self.node)
    }

    pub fn updatedb(&self, db: &mut Database) -> Result<bool> {
        let chunks = match &self.value {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>(),
            Some(other) => {
                return Err(crate::jobs::Error::InvalidArgument(format!(
                    "chunks of axis {} must be a list, got {other}",
                    self.axis
                ))
                .into())
            }
            None => {
                let output = Resource::TempObj(self.manager().output());
                return Err(Error::OutputMissing(output.build_displayname()).into());
            }
        };
        let changed = db
            .nodemgr
            .store_chunks(&self.axis, &self.node, &chunks, db.resmgr.as_ref())?;
        if changed {
            log::info!("axis {} at /{} now has {} values", self.axis, self.node, chunks.len());
        }
        Ok(changed)
    }
}
