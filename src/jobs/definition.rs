use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::db::Database;
use crate::exec::JobIo;
use crate::managed::Managed;
use crate::workflow::{Workflow, WorkflowScope};

use super::{CallArgs, CallSet, Error, JobCtx, JobInstance};

/// A job function: called with resolved arguments and the job's log streams.
pub type JobFn = Arc<dyn Fn(&CallArgs, &mut JobIo) -> Result<Value> + Send + Sync>;

/// A function that builds a workflow to run in place of a job.
pub type WorkflowFn = Arc<dyn Fn(&CallArgs) -> Result<Workflow> + Send + Sync>;

/// What running a job does.
#[derive(Clone)]
pub enum JobKind {
    Function(JobFn),
    /// Store the single positional argument into the return binding.
    SetObj,
    /// Build a workflow and run it at the job's node.
    SubWorkflow(WorkflowFn),
}

impl JobKind {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&CallArgs, &mut JobIo) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }

    pub fn subworkflow<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Workflow> + Send + Sync + 'static,
    {
        Self::SubWorkflow(Arc::new(f))
    }
}

impl fmt::Debug for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::SetObj => f.write_str("SetObj"),
            Self::SubWorkflow(_) => f.write_str("SubWorkflow"),
        }
    }
}

/// A job over some axes, instantiated once per node of those axes.
#[derive(Debug)]
pub struct JobDefinition {
    pub name: String,
    pub axes: Vec<String>,
    pub ctx: JobCtx,
    pub kind: JobKind,
    pub argset: CallSet<Managed>,
}

impl JobDefinition {
    pub fn new(
        name: &str,
        axes: &[&str],
        ctx: JobCtx,
        kind: JobKind,
        argset: CallSet<Managed>,
    ) -> Result<Self> {
        if name.is_empty() || name.contains(crate::node::NODE_DELIM) {
            return Err(Error::InvalidArgument(format!("invalid job name \"{name}\"")).into());
        }
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].contains(axis) {
                return Err(Error::InvalidArgument(format!(
                    "job {name} lists axis {axis} twice"
                ))
                .into());
            }
        }
        if let JobKind::SetObj = kind {
            if argset.ret.is_none() || argset.args.len() != 1 || !argset.kwargs.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "set-object job {name} needs exactly one value and a return binding"
                ))
                .into());
            }
        }
        Ok(Self {
            name: name.to_owned(),
            axes: axes.iter().map(|s| s.to_string()).collect(),
            ctx,
            kind,
            argset,
        })
    }

    /// One instance per node the node manager knows for this job's axes below `scope`.
    pub fn create_job_instances(
        self: &Arc<Self>,
        scope: &WorkflowScope,
        db: &mut Database,
    ) -> Result<Vec<JobInstance>> {
        let nodes = db
            .nodemgr
            .retrieve_nodes(&self.axes, &scope.node, db.resmgr.as_ref())?;
        log::trace!("{} expands to {} nodes", self.name, nodes.len());
        nodes
            .into_iter()
            .map(|node| JobInstance::new(self.clone(), scope, node, db))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use tempfile::tempdir;

    fn noop() -> JobKind {
        JobKind::function(|_, _| Ok(Value::Null))
    }

    #[test]
    fn test_validation() {
        let err = JobDefinition::new("a/b", &[], JobCtx::new(), noop(), CallSet::default())
            .expect_err("slash in name");
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidArgument(_))));

        assert!(JobDefinition::new("a", &["x", "x"], JobCtx::new(), noop(), CallSet::default()).is_err());

        // set-obj needs a value and a destination.
        assert!(JobDefinition::new("a", &[], JobCtx::new(), JobKind::SetObj, CallSet::default()).is_err());
    }

    #[test]
    fn test_instances_per_node() -> Result<()> {
        let dir = tempdir()?;
        let mut db = Database::open(dir.path())?;
        let root = Node::root();
        db.nodemgr.store_chunks(
            "sample",
            &root,
            &["s1".to_owned(), "s2".to_owned()],
            db.resmgr.as_ref(),
        )?;

        let argset = CallSet::args([Managed::input_instance("sample").into()])
            .returns(Managed::temp_output_obj("name", &["sample"]))?;
        let def = Arc::new(JobDefinition::new(
            "echo",
            &["sample"],
            JobCtx::new(),
            noop(),
            argset,
        )?);
        let instances = def.create_job_instances(&WorkflowScope::root(), &mut db)?;
        let names: Vec<&str> = instances.iter().map(JobInstance::displayname).collect();
        assert_eq!(names, ["/sample:s1/echo", "/sample:s2/echo"]);

        Ok(())
    }
}
