use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;

use crate::db::ResourceManager;
use crate::node::Node;

/// Files named by the user, tracked by their mtime.
mod user;
pub use user::{resolve_user_filename, FilenameTable, UserResource};

/// Files kept in the temps dir, with a placeholder that outlives cleanup.
mod temp_file;
pub use temp_file::TempFileResource;

/// Serialized objects, and the input/output slot pair that manages them.
mod temp_obj;
pub use temp_obj::{Slot, TempObjManager, TempObjResource};

/// Logical timestamp used to decide whether outputs are older than inputs.
pub type CreateTime = SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected output {0} missing")]
    OutputMissing(String),
}

/// Identity of a resource: its name and the node it belongs to.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceId {
    pub name: String,
    pub node: Node,
}

/// A tracked artifact with existence and creation-time semantics.
#[derive(Debug, Clone)]
pub enum Resource {
    User(UserResource),
    TempFile(TempFileResource),
    TempObj(TempObjResource),
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        ResourceId {
            name: self.name().to_owned(),
            node: self.node().clone(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(r) => &r.name,
            Self::TempFile(r) => &r.name,
            Self::TempObj(r) => &r.name,
        }
    }

    pub fn node(&self) -> &Node {
        match self {
            Self::User(r) => &r.node,
            Self::TempFile(r) => &r.node,
            Self::TempObj(r) => &r.node,
        }
    }

    pub fn get_filename(&self, resmgr: &dyn ResourceManager) -> PathBuf {
        match self {
            Self::User(r) => r.get_filename().to_path_buf(),
            Self::TempFile(r) => r.get_filename(resmgr),
            Self::TempObj(r) => r.get_filename(resmgr),
        }
    }

    pub fn get_exists(&self, resmgr: &dyn ResourceManager) -> bool {
        match self {
            Self::User(r) => r.get_exists(),
            Self::TempFile(r) => r.get_exists(resmgr),
            Self::TempObj(r) => r.get_exists(resmgr),
        }
    }

    pub fn get_createtime(&self, resmgr: &dyn ResourceManager) -> Option<CreateTime> {
        match self {
            Self::User(r) => r.get_createtime(),
            Self::TempFile(r) => r.get_createtime(resmgr),
            Self::TempObj(r) => r.get_createtime(resmgr),
        }
    }

    /// Mark the resource as freshly produced without rewriting its contents.
    pub fn touch(&self, resmgr: &dyn ResourceManager) -> Result<()> {
        match self {
            Self::User(r) => r.touch(),
            Self::TempFile(r) => r.touch(resmgr),
            Self::TempObj(_) => Ok(()),
        }
    }

    /// Move a staged output at `write_filename` into its final location.
    pub fn finalize(&self, write_filename: &Path, resmgr: &dyn ResourceManager) -> Result<()> {
        match self {
            Self::User(r) => r.finalize(write_filename),
            Self::TempFile(r) => r.finalize(write_filename, resmgr),
            Self::TempObj(r) => r.finalize(write_filename, resmgr),
        }
    }

    /// e.g. `/sample:s1/aligned.bam`; user files display as their filename.
    pub fn build_displayname(&self) -> String {
        if let Self::User(r) = self {
            return r.get_filename().display().to_string();
        }
        self.node().join_name(self.name())
    }

    /// Display name, followed by the filename when the two differ.
    pub fn build_displayname_filename(&self, resmgr: &dyn ResourceManager) -> String {
        let displayname = self.build_displayname();
        let filename = self.get_filename(resmgr).display().to_string();
        if displayname != filename {
            format!("{displayname} {filename}")
        } else {
            displayname
        }
    }
}

/// Rename a staged file into place, failing with `OutputMissing` if it was never written.
/// A file written directly at its final path is left where it is.
fn rename_staged(write_filename: &Path, filename: &Path) -> Result<()> {
    use anyhow::Context;
    if !write_filename.exists() && !write_filename.is_symlink() {
        return Err(Error::OutputMissing(write_filename.display().to_string()).into());
    }
    if write_filename == filename {
        return Ok(());
    }
    util::fs::make_parent_dirs(filename)
        .with_context(|| format!("creating parent dir for {filename:?}"))?;
    std::fs::rename(write_filename, filename)
        .map_err(|_| Error::OutputMissing(write_filename.display().to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TempsResourceManager;
    use tempfile::tempdir;

    #[test]
    fn test_displaynames() -> Result<()> {
        let dir = tempdir()?;
        let mut resmgr = TempsResourceManager::new(dir.path());
        let node = Node::root().child("sample", "s1");

        let temp = Resource::TempFile(TempFileResource::new("aligned", &node, &mut resmgr));
        assert_eq!(temp.build_displayname(), "/sample:s1/aligned");
        assert!(temp
            .build_displayname_filename(&resmgr)
            .starts_with("/sample:s1/aligned "));

        let user_file = dir.path().join("s1.txt");
        let template = format!("{}/{{sample}}.txt", dir.path().display());
        let user = Resource::User(UserResource::new("reads", &node, None, Some(&template))?);
        assert_eq!(user.build_displayname(), user_file.display().to_string());
        assert_eq!(
            user.build_displayname_filename(&resmgr),
            user_file.display().to_string()
        );
        Ok(())
    }

    #[test]
    fn test_ids_ignore_variant() -> Result<()> {
        let dir = tempdir()?;
        let resmgr = TempsResourceManager::new(dir.path());
        let node = Node::root();
        let output = Resource::TempObj(TempObjResource::new("obj", &node, Slot::Output));
        let input = Resource::TempObj(TempObjResource::new("obj", &node, Slot::Input));
        assert_eq!(output.id(), input.id());
        assert_ne!(output.get_filename(&resmgr), input.get_filename(&resmgr));
        Ok(())
    }
}
