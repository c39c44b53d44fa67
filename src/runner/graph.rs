use anyhow::Result;

use crate::jobs::JobInstance;
use crate::resources::ResourceId;

use super::Error;

/// Where a job instance is in the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Running,
    /// Succeeded, and its sub-workflow has yet to run.
    AwaitingWorkflow,
    /// Succeeded or skipped as up to date.
    Done,
    Failed,
}

/// The job instances of one expansion pass, in dependency order.
#[derive(Debug)]
pub struct JobGraph {
    pub jobs: Vec<JobInstance>,
    pub states: Vec<State>,
    /// Indices of the jobs producing each job's inputs; always earlier in `jobs`.
    deps: Vec<Vec<usize>>,
    produced: util::HashSet<ResourceId>,
    index: util::HashMap<String, usize>,
}

impl JobGraph {
    /// Order `jobs` so every job comes after the producers of its inputs,
    /// otherwise keeping definition order. Fails on a cycle.
    pub fn new(jobs: Vec<JobInstance>) -> Result<Self> {
        let deps = dependencies(&jobs);
        let order = sort(&deps).map_err(|stuck| {
            let names: Vec<&str> = stuck.iter().map(|&i| jobs[i].displayname()).collect();
            Error::Cycle(names.join(", "))
        })?;

        let mut slots: Vec<Option<JobInstance>> = jobs.into_iter().map(Some).collect();
        let jobs: Vec<JobInstance> = order.iter().filter_map(|&i| slots[i].take()).collect();
        let deps = dependencies(&jobs);

        let produced = jobs
            .iter()
            .flat_map(|job| job.outputs().iter().map(|r| r.id()))
            .collect();
        let index = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.displayname().to_owned(), i))
            .collect();
        Ok(Self {
            states: vec![State::Pending; jobs.len()],
            jobs,
            deps,
            produced,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn deps(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }

    /// true if some other job in the graph writes `id`.
    pub fn is_produced(&self, id: &ResourceId) -> bool {
        self.produced.contains(id)
    }

    pub fn upstream_failed(&self, i: usize) -> bool {
        self.deps[i].iter().any(|&d| self.states[d] == State::Failed)
    }

    pub fn upstream_done(&self, i: usize) -> bool {
        self.deps[i].iter().all(|&d| self.states[d] == State::Done)
    }

    /// A sub-workflow job has not finished, so resources it may create are unknown.
    pub fn subworkflows_outstanding(&self) -> bool {
        self.jobs.iter().zip(&self.states).any(|(job, state)| {
            job.is_subworkflow()
                && matches!(state, State::Pending | State::Running | State::AwaitingWorkflow)
        })
    }
}

fn dependencies(jobs: &[JobInstance]) -> Vec<Vec<usize>> {
    let mut producers: util::HashMap<ResourceId, usize> = Default::default();
    for (i, job) in jobs.iter().enumerate() {
        for output in job.outputs() {
            let id = output.id();
            if let Some(&other) = producers.get(&id) {
                log::warn!(
                    "{} and {} both produce {}",
                    jobs[other].displayname(),
                    job.displayname(),
                    output.build_displayname()
                );
            } else {
                producers.insert(id, i);
            }
        }
    }
    jobs.iter()
        .enumerate()
        .map(|(i, job)| {
            let mut deps: Vec<usize> = job
                .inputs()
                .iter()
                .filter_map(|input| producers.get(&input.id()).copied())
                .filter(|&p| p != i)
                .collect();
            deps.sort_unstable();
            deps.dedup();
            deps
        })
        .collect()
}

/// Kahn's algorithm, preferring lower indices. On a cycle, returns the jobs left over.
fn sort(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    let mut ready: std::collections::BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in &dependents[i] {
            remaining[j] -= 1;
            if remaining[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| remaining[i] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_keeps_definition_order() {
        // 0 depends on 2, 1 is free.
        let deps = vec![vec![2], vec![], vec![]];
        assert_eq!(sort(&deps), Ok(vec![1, 2, 0]));
    }

    #[test]
    fn test_sort_detects_cycle() {
        let deps = vec![vec![1], vec![0], vec![]];
        assert_eq!(sort(&deps), Err(vec![0, 1]));
    }
}
