use std::sync::Arc;

use anyhow::Result;

use crate::deep::ArgTree;
use crate::jobs::{CallSet, Error, JobCtx, JobDefinition, JobKind};
use crate::managed::Managed;
use crate::node::Node;

/// An ordered collection of job definitions.
#[derive(Debug, Default, Clone)]
pub struct Workflow {
    defs: Vec<Arc<JobDefinition>>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defs(&self) -> &[Arc<JobDefinition>] {
        &self.defs
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Add a definition. Job names are unique within a workflow.
    pub fn add(&mut self, def: JobDefinition) -> Result<()> {
        if self.defs.iter().any(|d| d.name == def.name) {
            return Err(Error::InvalidArgument(format!("duplicate job name {}", def.name)).into());
        }
        self.defs.push(Arc::new(def));
        Ok(())
    }

    /// Add a job calling `kind`'s function over `axes`.
    pub fn transform(
        &mut self,
        name: &str,
        axes: &[&str],
        ctx: JobCtx,
        kind: JobKind,
        argset: CallSet<Managed>,
    ) -> Result<()> {
        self.add(JobDefinition::new(name, axes, ctx, kind, argset)?)
    }

    /// Add a job storing `value` into the object `obj`.
    pub fn setobj<T: Into<ArgTree<Managed>>>(
        &mut self,
        name: &str,
        obj: Managed,
        value: T,
    ) -> Result<()> {
        let axes: Vec<String> = obj.axes.clone();
        let axes: Vec<&str> = axes.iter().map(String::as_str).collect();
        let argset = CallSet::args([value.into()]).returns(obj)?;
        self.add(JobDefinition::new(name, &axes, JobCtx::new(), JobKind::SetObj, argset)?)
    }

    /// Add a job that builds a workflow and runs it at each of its nodes.
    pub fn subworkflow(
        &mut self,
        name: &str,
        axes: &[&str],
        kind: JobKind,
        argset: CallSet<Managed>,
    ) -> Result<()> {
        if !matches!(kind, JobKind::SubWorkflow(_)) {
            return Err(Error::InvalidArgument(format!(
                "sub-workflow job {name} must build a workflow"
            ))
            .into());
        }
        self.add(JobDefinition::new(name, axes, JobCtx::new(), kind, argset)?)
    }
}

/// Where a workflow's jobs are instantiated: the node their axes extend,
/// and a name prefix identifying the sub-workflow they came from.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowScope {
    pub node: Node,
    pub prefix: String,
}

impl WorkflowScope {
    pub fn root() -> Self {
        Self::default()
    }

    /// Scope of a sub-workflow built by job `name` at `node`.
    pub fn child(&self, name: &str, node: &Node) -> Self {
        Self {
            node: node.clone(),
            prefix: format!("{}{}{}", self.prefix, name, crate::node::NODE_DELIM),
        }
    }

    /// Full name of a job defined in this scope.
    pub fn job_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}
