use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::db::{chunks_manager, Database};
use crate::jobs::Error;
use crate::managed::{Managed, ManagedKind};
use crate::node::Node;
use crate::resources::{Resource, TempFileResource, TempObjManager, UserResource};

/// User and temp files read or written by a job.
mod file;
pub use file::{InputFileArg, OutputFileArg};

/// Temp objects and chunk lists.
mod obj;
pub use obj::{InputChunksArg, InputObjArg, OutputChunksArg, OutputObjArg};

/// Outputs producing one resource per value of a new axis.
mod split;
pub use split::{SplitFileArg, SplitObjArg};

/// Inputs gathering every value of a split axis.
mod merge;
pub use merge::{MergeFileArg, MergeObjArg};

/// Where a job is being instantiated, for binding its placeholders.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    /// Display name of the job, for error messages.
    pub job: &'a str,
    /// The job's own axes, relative to `wf_node`.
    pub job_axes: &'a [String],
    /// Absolute node of the job instance.
    pub node: &'a Node,
    /// Node of the workflow the job belongs to.
    pub wf_node: &'a Node,
    /// Outputs are written at their final paths rather than staged.
    /// Set for sub-workflows, whose own jobs produce the files.
    pub direct_write: bool,
}

/// Where a placeholder lands relative to the job's node.
enum Scope {
    /// Bound at an ancestor of (or at) the job's node.
    Regular(Node),
    /// One extra axis below the job's node.
    Extra { axis: String, node: Node },
}

impl Binding<'_> {
    fn error(&self, managed: &Managed) -> anyhow::Error {
        Error::ArgumentResolution {
            job: self.job.to_owned(),
            arg: managed.name.clone(),
            axes: managed.axes.clone(),
            job_axes: self.job_axes.to_vec(),
        }
        .into()
    }

    fn scope(&self, managed: &Managed) -> Result<Scope> {
        let axes = &managed.axes;
        let job_axes = self.job_axes;
        if axes.len() <= job_axes.len() && axes[..] == job_axes[..axes.len()] {
            let relative = self.node.suffix(self.wf_node.len());
            Ok(Scope::Regular(self.wf_node.concat(&relative.prefix(axes.len()))))
        } else if axes.len() == job_axes.len() + 1 && axes[..job_axes.len()] == job_axes[..] {
            Ok(Scope::Extra {
                axis: axes[job_axes.len()].clone(),
                node: self.node.clone(),
            })
        } else {
            Err(self.error(managed))
        }
    }
}

/// How to name the file behind a file placeholder at a given node.
#[derive(Debug, Clone)]
pub(crate) enum FileKind {
    User {
        fnames: Option<crate::resources::FilenameTable>,
        template: Option<String>,
    },
    Temp,
}

impl FileKind {
    fn of(managed: &Managed) -> Option<Self> {
        match &managed.kind {
            ManagedKind::InputFile { fnames, template }
            | ManagedKind::OutputFile { fnames, template } => Some(Self::User {
                fnames: fnames.clone(),
                template: template.clone(),
            }),
            ManagedKind::TempInputFile | ManagedKind::TempOutputFile => Some(Self::Temp),
            _ => None,
        }
    }

    pub(crate) fn resource(&self, name: &str, node: &Node, db: &mut Database) -> Result<Resource> {
        Ok(match self {
            Self::User { fnames, template } => Resource::User(UserResource::new(
                name,
                node,
                fnames.as_ref(),
                template.as_deref(),
            )?),
            Self::Temp => Resource::TempFile(TempFileResource::new(name, node, db.resmgr.as_mut())),
        })
    }
}

/// A placeholder bound to concrete resources at one node.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A value known at binding time: an axis value or a formatted template.
    Value(Value),
    InputFile(InputFileArg),
    OutputFile(OutputFileArg),
    InputObj(InputObjArg),
    OutputObj(OutputObjArg),
    InputChunks(InputChunksArg),
    OutputChunks(OutputChunksArg),
    SplitFile(SplitFileArg),
    SplitObj(SplitObjArg),
    MergeFile(MergeFileArg),
    MergeObj(MergeObjArg),
}

impl Arg {
    /// Bind `managed` for the job described by `binding`.
    pub fn bind(managed: &Managed, binding: &Binding, db: &mut Database) -> Result<Self> {
        log::trace!("binding {} ({:?}) for {}", managed.name, managed.kind, binding.job);
        let name = managed.name.as_str();

        if let ManagedKind::InputInstance = managed.kind {
            let value = binding.node.get(name).ok_or_else(|| binding.error(managed))?;
            return Ok(Self::Value(Value::String(value.to_owned())));
        }

        match (binding.scope(managed)?, &managed.kind) {
            (Scope::Regular(node), ManagedKind::Template { template }) => {
                let text = syntax::format_template(template, |key| node.get(key))?;
                Ok(Self::Value(Value::String(text)))
            }
            (Scope::Regular(node), ManagedKind::InputFile { .. } | ManagedKind::TempInputFile) => {
                let kind = FileKind::of(managed).ok_or_else(|| binding.error(managed))?;
                let resource = kind.resource(name, &node, db)?;
                Ok(Self::InputFile(InputFileArg::new(resource, db)))
            }
            (Scope::Regular(node), ManagedKind::OutputFile { .. } | ManagedKind::TempOutputFile) => {
                let kind = FileKind::of(managed).ok_or_else(|| binding.error(managed))?;
                let resource = kind.resource(name, &node, db)?;
                Ok(Self::OutputFile(OutputFileArg::new(resource, db, binding.direct_write)))
            }
            (Scope::Regular(node), ManagedKind::TempInputObj) => {
                Ok(Self::InputObj(InputObjArg::new(TempObjManager::new(name, &node))))
            }
            (Scope::Regular(node), ManagedKind::TempOutputObj) => {
                Ok(Self::OutputObj(OutputObjArg::new(TempObjManager::new(name, &node))))
            }
            (Scope::Regular(node), ManagedKind::InputChunks) => {
                Ok(Self::InputChunks(InputChunksArg::new(name, &node)))
            }
            (Scope::Regular(node), ManagedKind::OutputChunks) => {
                Ok(Self::OutputChunks(OutputChunksArg::new(name, &node)))
            }
            (Scope::Extra { axis, node }, ManagedKind::InputFile { .. } | ManagedKind::TempInputFile) => {
                let kind = FileKind::of(managed).ok_or_else(|| binding.error(managed))?;
                Ok(Self::MergeFile(MergeFileArg::new(name, &axis, &node, &kind, db)?))
            }
            (Scope::Extra { axis, node }, ManagedKind::TempInputObj) => {
                Ok(Self::MergeObj(MergeObjArg::new(name, &axis, &node, db)?))
            }
            (Scope::Extra { axis, node }, ManagedKind::OutputFile { .. } | ManagedKind::TempOutputFile) => {
                let kind = FileKind::of(managed).ok_or_else(|| binding.error(managed))?;
                Ok(Self::SplitFile(SplitFileArg::new(name, &axis, &node, kind, db)?))
            }
            (Scope::Extra { axis, node }, ManagedKind::TempOutputObj) => {
                Ok(Self::SplitObj(SplitObjArg::new(name, &axis, &node, db)?))
            }
            _ => Err(binding.error(managed)),
        }
    }

    /// Resources the job reads.
    pub fn inputs(&self) -> Vec<Resource> {
        match self {
            Self::InputFile(arg) => vec![arg.resource.clone()],
            Self::InputObj(arg) => vec![Resource::TempObj(arg.manager.input())],
            Self::InputChunks(arg) => vec![Resource::TempObj(arg.manager().input())],
            _ => Vec::new(),
        }
    }

    /// Resources the job writes.
    pub fn outputs(&self) -> Vec<Resource> {
        match self {
            Self::OutputFile(arg) => vec![arg.resource.clone()],
            Self::OutputObj(arg) => vec![Resource::TempObj(arg.manager.output())],
            Self::OutputChunks(arg) => vec![Resource::TempObj(arg.manager().output())],
            _ => Vec::new(),
        }
    }

    /// Per-chunk resources read by a merge, plus the chunk list itself.
    pub fn merge_inputs(&self) -> Vec<Resource> {
        match self {
            Self::MergeFile(arg) => arg.inputs(),
            Self::MergeObj(arg) => arg.inputs(),
            _ => Vec::new(),
        }
    }

    /// Per-chunk resources written by a split, plus the chunk list itself.
    pub fn split_outputs(&self) -> Vec<Resource> {
        match self {
            Self::SplitFile(arg) => arg.outputs(),
            Self::SplitObj(arg) => arg.outputs(),
            _ => Vec::new(),
        }
    }

    /// true if completing the job may change the values of an axis.
    pub fn is_split(&self) -> bool {
        matches!(self, Self::SplitFile(_) | Self::SplitObj(_) | Self::OutputChunks(_))
    }

    /// The value passed to the job function.
    pub fn resolve(&self, db: &Database) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::InputFile(arg) => arg.resolve(),
            Self::OutputFile(arg) => arg.resolve(),
            Self::InputObj(arg) => arg.resolve(db),
            Self::InputChunks(arg) => arg.resolve(db),
            Self::SplitFile(arg) => arg.resolve(),
            Self::MergeFile(arg) => arg.resolve(),
            Self::MergeObj(arg) => arg.resolve(db),
            Self::OutputObj(_) | Self::OutputChunks(_) | Self::SplitObj(_) => Ok(Value::Null),
        }
    }

    /// Prepare outputs for writing.
    pub fn allocate(&self) -> Result<()> {
        match self {
            Self::OutputFile(arg) => arg.allocate(),
            Self::SplitFile(arg) => arg.allocate(),
            _ => Ok(()),
        }
    }

    /// Make inputs available for reading.
    pub fn pull(&self) -> Result<()> {
        match self {
            Self::InputFile(arg) => arg.pull(),
            Self::MergeFile(arg) => arg.pull(),
            _ => Ok(()),
        }
    }

    /// Publish written outputs.
    pub fn push(&self) -> Result<()> {
        match self {
            Self::OutputFile(arg) => arg.push(),
            Self::SplitFile(arg) => arg.push(),
            _ => Ok(()),
        }
    }

    /// Bind the job function's return value.
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        match self {
            Self::OutputObj(arg) => arg.value = Some(value),
            Self::OutputChunks(arg) => arg.value = Some(value),
            Self::SplitObj(arg) => arg.value = Some(value),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "cannot bind a return value to {other:?}"
                ))
                .into())
            }
        }
        Ok(())
    }

    /// Commit outputs after a successful run.
    /// Returns true if the values of an axis changed.
    pub fn updatedb(&mut self, db: &mut Database) -> Result<bool> {
        match self {
            Self::OutputFile(arg) => arg.updatedb(db).map(|_| false),
            Self::OutputObj(arg) => arg.updatedb(db).map(|_| false),
            Self::OutputChunks(arg) => arg.updatedb(db),
            Self::SplitFile(arg) => arg.updatedb(db),
            Self::SplitObj(arg) => arg.updatedb(db),
            _ => Ok(false),
        }
    }
}

/// A path as a string argument.
pub(crate) fn path_value(path: &Path) -> Result<Value> {
    let path = path.to_str().ok_or(util::PathEncodingError)?;
    Ok(Value::String(path.to_owned()))
}

/// Read chunk names from a split's return value. Maps use their keys and
/// lists use their indexes.
pub(crate) fn chunk_values(value: &Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect()),
        other => Err(Error::InvalidArgument(format!(
            "split value must be a map or a list, got {other}"
        ))
        .into()),
    }
}

/// The chunk-list resource of `axis` below `node`, as read by a merge.
pub(crate) fn chunks_input(axis: &str, node: &Node) -> Resource {
    Resource::TempObj(chunks_manager(axis, node).input())
}

/// The chunk-list resource of `axis` below `node`, as written by a split.
pub(crate) fn chunks_output(axis: &str, node: &Node) -> Resource {
    Resource::TempObj(chunks_manager(axis, node).output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn axes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scope_rules() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let wf_node = Node::root().child("project", "p1");
        let node = wf_node.child("sample", "s1").child("lane", "2");
        let job_axes = axes(&["sample", "lane"]);
        let binding = Binding {
            job: "/project:p1/sample:s1/lane:2/align",
            job_axes: &job_axes,
            node: &node,
            wf_node: &wf_node,
            direct_write: false,
        };

        let arg = Arg::bind(&Managed::template("{project}-{sample}", &["sample"]), &binding, &mut db)?;
        assert_eq!(arg.resolve(&db)?, json!("p1-s1"));

        let arg = Arg::bind(&Managed::temp_input_obj("ref", &[]), &binding, &mut db)?;
        assert_eq!(arg.inputs()[0].node(), &wf_node);

        let arg = Arg::bind(&Managed::input_instance("lane"), &binding, &mut db)?;
        assert_eq!(arg.resolve(&db)?, json!("2"));

        let arg = Arg::bind(&Managed::temp_output_obj("parts", &["sample", "lane", "part"]), &binding, &mut db)?;
        assert!(arg.is_split());

        let err = Arg::bind(&Managed::temp_input_obj("x", &["lane"]), &binding, &mut db)
            .expect_err("lane alone is not a prefix of the job axes");
        match err.downcast_ref::<Error>() {
            Some(Error::ArgumentResolution { job, .. }) => {
                assert_eq!(job, "/project:p1/sample:s1/lane:2/align")
            }
            other => panic!("unexpected error {other:?}"),
        }

        let too_deep = Managed::temp_input_obj("x", &["sample", "lane", "a", "b"]);
        assert!(Arg::bind(&too_deep, &binding, &mut db).is_err());
        assert!(Arg::bind(&Managed::input_instance("nope"), &binding, &mut db).is_err());
        Ok(())
    }

    #[test]
    fn test_set_value_only_on_return_bindings() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let node = Node::root();
        let binding = Binding {
            job: "/job",
            job_axes: &[],
            node: &node,
            wf_node: &node,
            direct_write: false,
        };
        let mut arg = Arg::bind(&Managed::temp_output_obj("obj", &[]), &binding, &mut db)?;
        arg.set_value(json!({"a": 1}))?;
        assert!(!arg.updatedb(&mut db)?);

        let mut input = Arg::bind(&Managed::temp_input_obj("obj", &[]), &binding, &mut db)?;
        assert_eq!(input.resolve(&db)?, json!({"a": 1}));
        assert!(input.set_value(json!(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_chunk_values() -> Result<()> {
        assert_eq!(
            chunk_values(&json!(["a", "b"]))?,
            vec![("0".to_owned(), json!("a")), ("1".to_owned(), json!("b"))]
        );
        assert_eq!(chunk_values(&json!({"x": 1}))?, vec![("x".to_owned(), json!(1))]);
        assert!(chunk_values(&json!(3)).is_err());
        Ok(())
    }
}
