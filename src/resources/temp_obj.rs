use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::db::ResourceManager;
use crate::node::Node;

use super::{rename_staged, CreateTime};

/// Which of an object's two serialized copies a resource refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Read by consumers; only rewritten when the value changes.
    Input,
    /// Rewritten by the producer on every run.
    Output,
}

impl Slot {
    fn suffix(self) -> &'static str {
        match self {
            Self::Input => "._i",
            Self::Output => "._o",
        }
    }
}

/// An in-memory value serialized into one of its slots.
/// Existence is the only creation-time notion it has, so `touch` does nothing.
#[derive(Debug, Clone)]
pub struct TempObjResource {
    pub name: String,
    pub node: Node,
    pub slot: Slot,
}

impl TempObjResource {
    pub fn new(name: &str, node: &Node, slot: Slot) -> Self {
        Self {
            name: name.to_owned(),
            node: node.clone(),
            slot,
        }
    }

    pub fn get_filename(&self, resmgr: &dyn ResourceManager) -> PathBuf {
        util::fs::with_suffix(resmgr.get_filename(&self.name, &self.node), self.slot.suffix())
    }

    pub fn get_exists(&self, resmgr: &dyn ResourceManager) -> bool {
        self.get_filename(resmgr).exists()
    }

    pub fn get_createtime(&self, resmgr: &dyn ResourceManager) -> Option<CreateTime> {
        util::fs::mtime(self.get_filename(resmgr))
    }

    pub fn finalize(&self, write_filename: &Path, resmgr: &dyn ResourceManager) -> Result<()> {
        rename_staged(write_filename, &self.get_filename(resmgr))
    }
}

/// Pairs the input and output slots of one object and decides whether a newly
/// produced value should replace the input slot.
#[derive(Debug, Clone)]
pub struct TempObjManager {
    pub name: String,
    pub node: Node,
}

impl TempObjManager {
    pub fn new(name: &str, node: &Node) -> Self {
        Self {
            name: name.to_owned(),
            node: node.clone(),
        }
    }

    pub fn input(&self) -> TempObjResource {
        TempObjResource::new(&self.name, &self.node, Slot::Input)
    }

    pub fn output(&self) -> TempObjResource {
        TempObjResource::new(&self.name, &self.node, Slot::Output)
    }

    /// Read the input slot. An absent slot reads as `Value::Null`,
    /// the same as a slot holding a stored null.
    pub fn get_obj(&self, resmgr: &dyn ResourceManager) -> Result<Value> {
        read_obj(&self.input().get_filename(resmgr))
    }

    /// Store `obj` in the output slot, and in the input slot only if it differs
    /// from what is there. Returns true if the input slot was rewritten.
    ///
    /// Values are compared in serialized form, so a float that reads back as a
    /// neighbouring value still counts as unchanged.
    pub fn finalize(&self, obj: &Value, resmgr: &dyn ResourceManager) -> Result<bool> {
        let bytes = serde_json::to_vec(obj)?;
        write_bytes(&self.output().get_filename(resmgr), &bytes)?;

        let input = self.input().get_filename(resmgr);
        let unchanged = match std::fs::read(&input) {
            Ok(existing) => existing == bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => obj.is_null(),
            Err(e) => return Err(e).with_context(|| format!("reading object from {input:?}")),
        };
        if unchanged {
            log::trace!("object {} unchanged; keeping input slot", self.name);
            return Ok(false);
        }
        write_bytes(&input, &bytes)?;
        Ok(true)
    }
}

/// Deserialize an object file, treating a missing file as null.
fn read_obj(filename: &Path) -> Result<Value> {
    match std::fs::read(filename) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("deserializing object from {filename:?}")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Null),
        Err(e) => Err(e).with_context(|| format!("reading object from {filename:?}")),
    }
}

fn write_bytes(filename: &Path, bytes: &[u8]) -> Result<()> {
    util::fs::make_parent_dirs(filename)?;
    std::fs::write(filename, bytes).with_context(|| format!("writing object to {filename:?}"))?;
    Ok(())
}
