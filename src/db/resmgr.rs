use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::node::Node;
use crate::resources::ResourceId;

/// Decides where temporary resources live, and tracks which of them
/// may be deleted once a run no longer needs them.
pub trait ResourceManager {
    fn get_filename(&self, name: &str, node: &Node) -> PathBuf;

    fn register_disposable(&mut self, name: &str, node: &Node, filename: &Path);

    /// Delete registered disposable files, returning how many were removed.
    fn cleanup(&mut self) -> Result<usize>;
}

/// Keeps temporary resources under `<temps_dir>/<node subdir>/<name>`.
#[derive(Debug)]
pub struct TempsResourceManager {
    temps_dir: PathBuf,
    disposables: util::HashMap<ResourceId, PathBuf>,
}

impl TempsResourceManager {
    pub fn new<T: Into<PathBuf>>(temps_dir: T) -> Self {
        Self {
            temps_dir: temps_dir.into(),
            disposables: Default::default(),
        }
    }
}

impl ResourceManager for TempsResourceManager {
    fn get_filename(&self, name: &str, node: &Node) -> PathBuf {
        let mut filename = self.temps_dir.join(node.subdir());
        filename.push(name);
        filename
    }

    fn register_disposable(&mut self, name: &str, node: &Node, filename: &Path) {
        let id = ResourceId {
            name: name.to_owned(),
            node: node.clone(),
        };
        self.disposables.insert(id, filename.to_owned());
    }

    fn cleanup(&mut self) -> Result<usize> {
        let mut removed = 0;
        for filename in self.disposables.values() {
            match std::fs::remove_file(filename) {
                Ok(()) => {
                    log::debug!("removed temp file {:?}", filename);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
