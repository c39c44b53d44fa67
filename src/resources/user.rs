use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::node::Node;

use super::{rename_staged, CreateTime};

/// Explicit filenames keyed by the node's axis values, in axis order.
pub type FilenameTable = BTreeMap<Vec<String>, String>;

/// Resolve a user-visible filename for resource `name` at `node`.
///
/// An explicit filename table wins (falling back to `name` for nodes it doesn't
/// list), then a template, then `name` itself treated as a template.
pub fn resolve_user_filename(
    name: &str,
    node: &Node,
    fnames: Option<&FilenameTable>,
    template: Option<&str>,
) -> Result<PathBuf, syntax::Error> {
    if let Some(fnames) = fnames {
        let key: Vec<String> = node.values().map(str::to_owned).collect();
        let filename = fnames.get(&key).map(String::as_str).unwrap_or(name);
        return Ok(PathBuf::from(filename));
    }
    let template = template.unwrap_or(name);
    let filename = syntax::format_template(template, |key| node.get(key))?;
    Ok(PathBuf::from(filename))
}

/// A file with a user-visible path; existence and createtime come from the filesystem.
#[derive(Debug, Clone)]
pub struct UserResource {
    pub name: String,
    pub node: Node,
    filename: PathBuf,
}

impl UserResource {
    pub fn new(
        name: &str,
        node: &Node,
        fnames: Option<&FilenameTable>,
        template: Option<&str>,
    ) -> Result<Self, syntax::Error> {
        let filename = resolve_user_filename(name, node, fnames, template)?;
        Ok(Self {
            name: name.to_owned(),
            node: node.clone(),
            filename,
        })
    }

    pub fn get_filename(&self) -> &Path {
        &self.filename
    }

    pub fn get_exists(&self) -> bool {
        self.filename.exists()
    }

    pub fn get_createtime(&self) -> Option<CreateTime> {
        util::fs::mtime(&self.filename)
    }

    pub fn touch(&self) -> Result<()> {
        util::fs::touch(&self.filename)?;
        Ok(())
    }

    pub fn finalize(&self, write_filename: &Path) -> Result<()> {
        rename_staged(write_filename, &self.filename)
    }
}
