use std::fmt;
use std::path::PathBuf;

// used to separate an axis from its value e.g. "sample:s1"
pub const AXIS_CHUNK_DELIM: char = ':';
// used to separate multiple axis/value pairs e.g. "sample:s1/chunk:3"
pub const NODE_DELIM: char = '/';

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value {chunk:?} for axis {axis}: values name a directory and cannot be empty, '.', '..' or contain '/'")]
    InvalidChunk { axis: String, chunk: String },
}

/// Check that `chunk` is usable as a value of `axis`. Each value becomes a
/// directory under the temps dir, so it must be a single path component.
pub fn check_chunk(axis: &str, chunk: &str) -> Result<(), Error> {
    if chunk.is_empty() || chunk == "." || chunk == ".." || chunk.contains([NODE_DELIM, '\\', '\0']) {
        return Err(Error::InvalidChunk {
            axis: axis.to_owned(),
            chunk: chunk.to_owned(),
        });
    }
    Ok(())
}

/// One point in axis space: an ordered list of (axis, value) pairs.
/// The empty node is the root. A child node strictly extends its parent's list.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Node {
    bindings: Vec<(String, String)>,
}

impl Node {
    /// The root node, with no axes bound.
    pub fn root() -> Self {
        Self::default()
    }

    /// Create a node from (axis, value) pairs, in order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            bindings: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A new node extending this one with `axis` bound to `chunk`.
    pub fn child(&self, axis: &str, chunk: &str) -> Self {
        let mut bindings = Vec::with_capacity(self.bindings.len() + 1);
        bindings.extend(self.bindings.iter().cloned());
        bindings.push((axis.to_owned(), chunk.to_owned()));
        Self { bindings }
    }

    /// This node extended by all of `other`'s bindings.
    pub fn concat(&self, other: &Node) -> Self {
        let mut bindings = Vec::with_capacity(self.bindings.len() + other.bindings.len());
        bindings.extend(self.bindings.iter().cloned());
        bindings.extend(other.bindings.iter().cloned());
        Self { bindings }
    }

    /// The first `len` bindings of this node.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            bindings: self.bindings[..len.min(self.bindings.len())].to_vec(),
        }
    }

    /// The bindings after the first `len`, i.e. this node relative to an ancestor of length `len`.
    pub fn suffix(&self, len: usize) -> Self {
        Self {
            bindings: self.bindings[len.min(self.bindings.len())..].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Axis names, in order.
    pub fn axes(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(k, _)| k.as_str())
    }

    /// Axis values, in order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(_, v)| v.as_str())
    }

    /// Value bound to `axis`, if any.
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(k, _)| k == axis)
            .map(|(_, v)| v.as_str())
    }

    /// Stable display string, e.g. `sample:s1/chunk:3`; empty for the root.
    pub fn displayname(&self) -> String {
        let mut name = String::with_capacity(self.bindings.len() * 16);
        for (i, (axis, chunk)) in self.bindings.iter().enumerate() {
            if i > 0 {
                name.push(NODE_DELIM);
            }
            name.push_str(axis);
            name.push(AXIS_CHUNK_DELIM);
            name.push_str(chunk);
        }
        name
    }

    /// Display name of something called `name` at this node, e.g. `/sample:s1/align`.
    pub fn join_name(&self, name: &str) -> String {
        let mut joined = String::with_capacity(self.bindings.len() * 16 + name.len() + 2);
        if !self.is_empty() {
            joined.push(NODE_DELIM);
            joined.push_str(&self.displayname());
        }
        joined.push(NODE_DELIM);
        joined.push_str(name);
        joined
    }

    /// Relative directory for per-node files, e.g. `sample/s1/chunk/3`.
    pub fn subdir(&self) -> PathBuf {
        let mut dir = PathBuf::with_capacity(self.bindings.len() * 2);
        for (axis, chunk) in &self.bindings {
            dir.push(axis);
            dir.push(chunk);
        }
        dir
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.displayname())
    }
}
