use anyhow::{Context, Result};
use serde_json::Value;

use crate::node::{check_chunk, Node};
use crate::resources::{Resource, TempObjManager};

use super::ResourceManager;

/// Expands axes into concrete nodes.
pub trait NodeManager {
    /// Every node below `base` binding each of `axes`, in order.
    fn retrieve_nodes(
        &self,
        axes: &[String],
        base: &Node,
        resmgr: &dyn ResourceManager,
    ) -> Result<Vec<Node>> {
        let mut nodes = vec![base.clone()];
        for axis in axes {
            let mut next = Vec::with_capacity(nodes.len());
            for node in &nodes {
                for chunk in self.retrieve_chunks(axis, node, resmgr)? {
                    next.push(node.child(axis, &chunk));
                }
            }
            nodes = next;
        }
        Ok(nodes)
    }

    /// Values of `axis` below `node`. Empty if none have been stored yet.
    fn retrieve_chunks(
        &self,
        axis: &str,
        node: &Node,
        resmgr: &dyn ResourceManager,
    ) -> Result<Vec<String>>;

    /// Record the values of `axis` below `node`. Returns true if they changed.
    fn store_chunks(
        &self,
        axis: &str,
        node: &Node,
        chunks: &[String],
        resmgr: &dyn ResourceManager,
    ) -> Result<bool>;

    /// Resources every job at `node` implicitly depends on.
    fn get_node_inputs(&self, node: &Node) -> Vec<Resource>;
}

/// The object pair holding the values of `axis` below `node`.
pub fn chunks_manager(axis: &str, node: &Node) -> TempObjManager {
    TempObjManager::new(&format!("{axis}._chunks"), node)
}

/// Stores each axis's chunk list as a temp object at the parent node.
/// A job depends on the chunk list of every axis in its node, so
/// re-splitting an axis invalidates everything below it.
#[derive(Debug, Default)]
pub struct ChunkNodeManager;

impl NodeManager for ChunkNodeManager {
    fn retrieve_chunks(
        &self,
        axis: &str,
        node: &Node,
        resmgr: &dyn ResourceManager,
    ) -> Result<Vec<String>> {
        match chunks_manager(axis, node).get_obj(resmgr)? {
            Value::Null => Ok(Vec::new()),
            value => serde_json::from_value(value)
                .with_context(|| format!("reading chunks of axis {axis} at {node}")),
        }
    }

    fn store_chunks(
        &self,
        axis: &str,
        node: &Node,
        chunks: &[String],
        resmgr: &dyn ResourceManager,
    ) -> Result<bool> {
        for chunk in chunks {
            check_chunk(axis, chunk)?;
        }
        let mut sorted = chunks.to_vec();
        sorted.sort();
        sorted.dedup();
        log::trace!("storing {} chunks of axis {axis} at {node}", sorted.len());
        chunks_manager(axis, node).finalize(&serde_json::to_value(sorted)?, resmgr)
    }

    fn get_node_inputs(&self, node: &Node) -> Vec<Resource> {
        node.axes()
            .enumerate()
            .map(|(i, axis)| Resource::TempObj(chunks_manager(axis, &node.prefix(i)).input()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TempsResourceManager;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_retrieve_nested_axes() -> Result<()> {
        let dir = tempdir()?;
        let resmgr = TempsResourceManager::new(dir.path());
        let nodemgr = ChunkNodeManager;
        let root = Node::root();

        nodemgr.store_chunks("sample", &root, &strings(&["s2", "s1"]), &resmgr)?;
        nodemgr.store_chunks("lane", &root.child("sample", "s1"), &strings(&["1", "2"]), &resmgr)?;
        nodemgr.store_chunks("lane", &root.child("sample", "s2"), &strings(&["1"]), &resmgr)?;

        let axes = strings(&["sample", "lane"]);
        let nodes = nodemgr.retrieve_nodes(&axes, &root, &resmgr)?;
        let names: Vec<String> = nodes.iter().map(Node::displayname).collect();
        assert_eq!(
            names,
            ["sample:s1/lane:1", "sample:s1/lane:2", "sample:s2/lane:1"]
        );
        Ok(())
    }

    #[test]
    fn test_unsplit_axis_has_no_nodes() -> Result<()> {
        let dir = tempdir()?;
        let resmgr = TempsResourceManager::new(dir.path());
        let nodes = ChunkNodeManager.retrieve_nodes(&strings(&["sample"]), &Node::root(), &resmgr)?;
        assert!(nodes.is_empty());

        let root = ChunkNodeManager.retrieve_nodes(&[], &Node::root(), &resmgr)?;
        assert_eq!(root, vec![Node::root()]);
        Ok(())
    }

    #[test]
    fn test_store_reports_change() -> Result<()> {
        let dir = tempdir()?;
        let resmgr = TempsResourceManager::new(dir.path());
        let root = Node::root();
        assert!(ChunkNodeManager.store_chunks("x", &root, &strings(&["a", "b"]), &resmgr)?);
        assert!(!ChunkNodeManager.store_chunks("x", &root, &strings(&["b", "a"]), &resmgr)?);
        assert!(ChunkNodeManager.store_chunks("x", &root, &strings(&["a"]), &resmgr)?);
        Ok(())
    }

    #[test]
    fn test_rejects_path_like_chunks() -> Result<()> {
        let dir = tempdir()?;
        let resmgr = TempsResourceManager::new(dir.path());
        let root = Node::root();
        for bad in ["", ".", "..", "../escape", "a/b"] {
            let err = ChunkNodeManager
                .store_chunks("x", &root, &strings(&["ok", bad]), &resmgr)
                .expect_err("path-like chunk");
            assert!(matches!(
                err.downcast_ref::<crate::node::Error>(),
                Some(crate::node::Error::InvalidChunk { .. })
            ));
        }
        assert!(ChunkNodeManager.retrieve_chunks("x", &root, &resmgr)?.is_empty());
        assert!(ChunkNodeManager.store_chunks("x", &root, &strings(&["a.b", "lane-1"]), &resmgr)?);
        Ok(())
    }

    #[test]
    fn test_node_inputs() {
        let node = Node::from_pairs([("sample", "s1"), ("lane", "2")]);
        let inputs = ChunkNodeManager.get_node_inputs(&node);
        let names: Vec<String> = inputs.iter().map(Resource::build_displayname).collect();
        assert_eq!(names, ["/sample._chunks", "/sample:s1/lane._chunks"]);
    }
}
