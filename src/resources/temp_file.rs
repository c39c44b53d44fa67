use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::db::ResourceManager;
use crate::node::Node;

use super::{rename_staged, CreateTime};

const PLACEHOLDER_SUFFIX: &str = "._placeholder";

/// A file in the temps dir. Its path comes from the resource manager, and it is
/// registered as disposable so cleanup can remove it.
///
/// Cleanup deletes the file but not the sidecar placeholder, which keeps a copy
/// of the file's mtime so staleness decisions still see when it was created.
#[derive(Debug, Clone)]
pub struct TempFileResource {
    pub name: String,
    pub node: Node,
}

impl TempFileResource {
    pub fn new(name: &str, node: &Node, resmgr: &mut dyn ResourceManager) -> Self {
        let res = Self {
            name: name.to_owned(),
            node: node.clone(),
        };
        let filename = res.get_filename(resmgr);
        resmgr.register_disposable(name, node, &filename);
        res
    }

    pub fn get_filename(&self, resmgr: &dyn ResourceManager) -> PathBuf {
        resmgr.get_filename(&self.name, &self.node)
    }

    fn placeholder_filename(&self, resmgr: &dyn ResourceManager) -> PathBuf {
        util::fs::with_suffix(self.get_filename(resmgr), PLACEHOLDER_SUFFIX)
    }

    fn save_createtime(&self, resmgr: &dyn ResourceManager) -> Result<()> {
        util::fs::copy_mtime(self.get_filename(resmgr), self.placeholder_filename(resmgr))?;
        Ok(())
    }

    pub fn get_exists(&self, resmgr: &dyn ResourceManager) -> bool {
        self.get_filename(resmgr).exists()
    }

    pub fn get_createtime(&self, resmgr: &dyn ResourceManager) -> Option<CreateTime> {
        util::fs::mtime(self.get_filename(resmgr))
            .or_else(|| util::fs::mtime(self.placeholder_filename(resmgr)))
    }

    pub fn touch(&self, resmgr: &dyn ResourceManager) -> Result<()> {
        util::fs::touch(self.get_filename(resmgr))?;
        self.save_createtime(resmgr)
    }

    pub fn finalize(&self, write_filename: &Path, resmgr: &dyn ResourceManager) -> Result<()> {
        rename_staged(write_filename, &self.get_filename(resmgr))?;
        self.save_createtime(resmgr)
    }
}
