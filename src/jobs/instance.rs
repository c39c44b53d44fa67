use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::Value;
use util::IdVec;

use crate::arguments::{Arg, Binding};
use crate::db::Database;
use crate::exec::{JobCallable, JobLogs, JobTimeout};
use crate::node::Node;
use crate::resources::{Resource, ResourceId};
use crate::workflow::WorkflowScope;

use super::{CallSet, JobCtx, JobDefinition, JobKind, Retry};

const STDOUT_FILE: &str = "job.out";
const STDERR_FILE: &str = "job.err";

/// Index of a bound argument in a job instance's argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgId(usize);

impl From<usize> for ArgId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl From<ArgId> for usize {
    fn from(id: ArgId) -> usize {
        id.0
    }
}

/// What a successful job asks of the runner once its outputs are committed.
#[derive(Debug, Default)]
pub struct Completion {
    /// The values of an axis changed, so job instances must be re-expanded.
    pub graph_dirty: bool,
}

/// A job definition bound to one node.
#[derive(Debug)]
pub struct JobInstance {
    pub def: Arc<JobDefinition>,
    pub scope: WorkflowScope,
    pub node: Node,
    pub logs_dir: PathBuf,
    pub retry_idx: u64,
    pub ctx: JobCtx,
    /// A downstream job needs this job's outputs recreated.
    pub is_required_downstream: bool,
    name: String,
    displayname: String,
    arglist: IdVec<ArgId, Arg>,
    argset: CallSet<ArgId>,
    inputs: Vec<Resource>,
    outputs: Vec<Resource>,
}

impl JobInstance {
    pub fn new(def: Arc<JobDefinition>, scope: &WorkflowScope, node: Node, db: &mut Database) -> Result<Self> {
        let name = scope.job_name(&def.name);
        let displayname = node.join_name(&name);
        let binding = Binding {
            job: &displayname,
            job_axes: &def.axes,
            node: &node,
            wf_node: &scope.node,
            direct_write: matches!(def.kind, JobKind::SubWorkflow(_)),
        };

        let mut arglist: IdVec<ArgId, Arg> = IdVec::with_capacity(8);
        let argset = def
            .argset
            .transform(&mut |managed| Ok(arglist.push(Arg::bind(managed, &binding, db)?)))?;

        let (inputs, outputs) = collect_resources(&arglist, &node, db);
        let logs_dir = db.logs_dir.join(node.subdir()).join(&name);

        Ok(Self {
            ctx: def.ctx.clone(),
            def,
            scope: scope.clone(),
            node,
            logs_dir,
            retry_idx: 0,
            is_required_downstream: false,
            name,
            displayname,
            arglist,
            argset,
            inputs,
            outputs,
        })
    }

    /// e.g. `/sample:s1/align`; unique within a run.
    pub fn displayname(&self) -> &str {
        &self.displayname
    }

    /// Name including the prefix of the sub-workflow it came from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Resource] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Resource] {
        &self.outputs
    }

    pub fn is_subworkflow(&self) -> bool {
        matches!(self.def.kind, JobKind::SubWorkflow(_))
    }

    /// true if a previous run recorded this job as complete.
    pub fn already_run(&self, db: &Database) -> bool {
        db.job_shelf.get(&self.displayname)
    }

    pub fn out_of_date(&self, db: &Database) -> bool {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return true;
        }
        let resmgr = db.resmgr.as_ref();
        let mut oldest_output: Option<SystemTime> = None;
        for output in &self.outputs {
            match output.get_createtime(resmgr) {
                None => return true,
                Some(t) => oldest_output = Some(oldest_output.map_or(t, |o| o.min(t))),
            }
        }
        let newest_input = self
            .inputs
            .iter()
            .filter_map(|input| input.get_createtime(resmgr))
            .max();
        if let (Some(newest), Some(oldest)) = (newest_input, oldest_output) {
            if newest > oldest {
                return true;
            }
        }
        self.is_required_downstream
    }

    /// The comparison behind `out_of_date`, one line per resource.
    pub fn explain_out_of_date(&self, db: &Database) -> String {
        let resmgr = db.resmgr.as_ref();
        let mut text = String::with_capacity(256);
        text.push_str(&format!("{}:\n", self.displayname));
        if self.inputs.is_empty() {
            text.push_str("  no inputs\n");
        }
        if self.outputs.is_empty() {
            text.push_str("  no outputs\n");
        }

        let times: Vec<_> = self.inputs.iter().map(|i| i.get_createtime(resmgr)).collect();
        let newest = times.iter().flatten().max().copied();
        for (input, time) in self.inputs.iter().zip(&times) {
            let marker = if time.is_some() && *time == newest { " (newest)" } else { "" };
            text.push_str(&format!(
                "  input  {} {}{}\n",
                input.build_displayname_filename(resmgr),
                format_time(*time),
                marker
            ));
        }
        for output in &self.outputs {
            let time = output.get_createtime(resmgr);
            let status = match (time, newest) {
                (None, _) => "missing".to_owned(),
                (Some(t), Some(n)) if n > t => format!("{} (older than newest input)", format_time(time)),
                (Some(_), _) => format_time(time),
            };
            text.push_str(&format!(
                "  output {} {}\n",
                output.build_displayname_filename(resmgr),
                status
            ));
        }
        if self.is_required_downstream {
            text.push_str("  required by a downstream job\n");
        }
        text
    }

    /// true if any output does not exist.
    pub fn output_missing(&self, db: &Database) -> bool {
        let resmgr = db.resmgr.as_ref();
        self.outputs.iter().any(|o| !o.get_exists(resmgr))
    }

    /// Mark every output as freshly created.
    pub fn touch_outputs(&self, db: &Database) -> Result<()> {
        for output in &self.outputs {
            output.touch(db.resmgr.as_ref())?;
        }
        Ok(())
    }

    /// true if completing this job can change the values of an axis.
    pub fn check_require_regenerate(&self) -> bool {
        self.arglist.iter().any(Arg::is_split)
    }

    pub fn create_callable(&self, db: &Database) -> Result<JobCallable> {
        let values = self
            .arglist
            .iter()
            .map(|arg| arg.resolve(db))
            .collect::<Result<Vec<Value>>>()?;
        let args = self
            .argset
            .resolve(&mut |id| Ok(values[usize::from(*id)].clone()))?;
        log::trace!("{} resolved to {}", self.displayname, args.display_command(&self.name));

        let logs = JobLogs {
            stdout: db.storage.create_store(&self.logs_dir.join(STDOUT_FILE)),
            stderr: db.storage.create_store(&self.logs_dir.join(STDERR_FILE)),
        };
        Ok(JobCallable::new(
            self.displayname.clone(),
            self.def.kind.clone(),
            args,
            self.arglist.clone(),
            self.argset.ret,
            JobTimeout::new(self.ctx.timeout()?),
            logs,
        ))
    }

    /// Directory for the artifacts of the current attempt, e.g. `exc0`.
    pub fn create_exc_dir(&self) -> Result<PathBuf> {
        let dir = self.logs_dir.join(format!("exc{}", self.retry_idx));
        util::fs::makedirs(&dir)?;
        Ok(dir)
    }

    /// Commit the outputs of a successful callable. For a sub-workflow this
    /// must wait until the workflow it returned has run.
    pub fn finalize(&mut self, mut callable: JobCallable, db: &mut Database) -> Result<Completion> {
        let changed = callable.updatedb(db)?;
        Ok(Completion {
            graph_dirty: changed && self.check_require_regenerate(),
        })
    }

    /// Record the job as complete.
    pub fn complete(&mut self, db: &mut Database) -> Result<()> {
        self.is_required_downstream = false;
        db.job_shelf.set(&self.displayname, true)
    }

    /// Prepare another attempt, escalating context options.
    pub fn retry(&mut self) -> Result<Retry> {
        if self.retry_idx >= self.ctx.num_retry() {
            return Ok(Retry::Exhausted);
        }
        self.retry_idx += 1;
        if self.ctx.escalate()? {
            Ok(Retry::Escalated)
        } else {
            Ok(Retry::Unchanged)
        }
    }
}

/// Inputs and outputs of a bound argument list, deduplicated.
/// Merge inputs that are also split outputs of the same job count only as outputs.
fn collect_resources(arglist: &IdVec<ArgId, Arg>, node: &Node, db: &Database) -> (Vec<Resource>, Vec<Resource>) {
    let mut outputs = Dedup::default();
    for arg in arglist.iter() {
        outputs.extend(arg.outputs());
        outputs.extend(arg.split_outputs());
    }

    let mut inputs = Dedup::default();
    for arg in arglist.iter() {
        inputs.extend(arg.inputs());
        inputs.extend(
            arg.merge_inputs()
                .into_iter()
                .filter(|r| !outputs.ids.contains(&r.id())),
        );
    }
    inputs.extend(db.nodemgr.get_node_inputs(node));
    (inputs.resources, outputs.resources)
}

#[derive(Default)]
struct Dedup {
    ids: util::HashSet<ResourceId>,
    resources: Vec<Resource>,
}

impl Dedup {
    fn extend<I: IntoIterator<Item = Resource>>(&mut self, resources: I) {
        for resource in resources {
            if self.ids.insert(resource.id()) {
                self.resources.push(resource);
            }
        }
    }
}

fn format_time(time: Option<SystemTime>) -> String {
    match time.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        Some(d) => format!("{}.{:03}", d.as_secs(), d.subsec_millis()),
        None => "missing".to_owned(),
    }
}
