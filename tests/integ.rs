use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use sweep::exec::{ExecutionQueue, JobStats, LocalJobQueue, ThreadJobQueue};
use sweep::{AggregatedErrors, CallSet, JobCtx, JobKind, Managed, Node, RunSettings, Ui, Workflow, WorkflowRunner};
use tempfile::tempdir;

fn runner_with(temps: &Path, queue: Box<dyn ExecutionQueue>, max_jobs: usize) -> Result<WorkflowRunner> {
    let settings = RunSettings {
        temps_dir: temps.to_owned(),
        max_jobs,
        ..Default::default()
    };
    WorkflowRunner::open(settings, queue, Ui::quiet())
}

fn local_runner(temps: &Path) -> Result<WorkflowRunner> {
    runner_with(temps, Box::new(LocalJobQueue::new()), 1)
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Push a file's mtime into the future so it reads as newer than anything written since.
fn make_newer(path: &Path) -> Result<()> {
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now() + Duration::from_secs(10))?;
    Ok(())
}

fn copy_workflow(input: &Path, output: &Path, calls: Arc<AtomicUsize>) -> Result<Workflow> {
    let mut wf = Workflow::new();
    wf.transform(
        "copy",
        &[],
        JobCtx::new(),
        JobKind::function(move |args, _| {
            calls.fetch_add(1, SeqCst);
            std::fs::copy(args.arg_str(0)?, args.arg_str(1)?)?;
            Ok(Value::Null)
        }),
        CallSet::args([
            Managed::input_file(path_str(input), &[]).into(),
            Managed::output_file(path_str(output), &[]).into(),
        ]),
    )?;
    Ok(wf)
}

#[test]
fn test_copy_then_up_to_date() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, "hello")?;
    let calls = counter();
    let wf = copy_workflow(&input, &output, calls.clone())?;

    let mut runner = local_runner(&temps)?;
    runner.run(&wf)?;
    assert_eq!(std::fs::read_to_string(&output)?, "hello");
    assert_eq!(calls.load(SeqCst), 1);
    assert!(runner.db().job_shelf.get("/copy"));
    // staged output was renamed into place.
    assert!(!PathBuf::from(format!("{}.tmp", output.display())).exists());

    // nothing changed, nothing runs.
    local_runner(&temps)?.run(&wf)?;
    assert_eq!(calls.load(SeqCst), 1);

    std::fs::write(&input, "again")?;
    make_newer(&input)?;
    local_runner(&temps)?.run(&wf)?;
    assert_eq!(calls.load(SeqCst), 2);
    assert_eq!(std::fs::read_to_string(&output)?, "again");

    // an invalidated job reruns even though it's up to date.
    let mut runner = local_runner(&temps)?;
    runner.db_mut().job_shelf.set("/copy", false)?;
    runner.run(&wf)?;
    assert_eq!(calls.load(SeqCst), 3);
    assert!(!runner.db().job_shelf.is_invalidated("/copy"));
    Ok(())
}

#[test]
fn test_stats_written_per_attempt() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let input = dir.path().join("in.txt");
    std::fs::write(&input, "x")?;
    let wf = copy_workflow(&input, &dir.path().join("out.txt"), counter())?;
    local_runner(&temps)?.run(&wf)?;

    let stats = JobStats::read(&temps.join("log/copy/exc0"))?;
    assert_eq!(stats.name, "/copy");
    assert!(stats.finished);
    assert!(stats.duration.is_some());
    Ok(())
}

fn split_merge_workflow(total: &Path, doubled: Arc<AtomicUsize>) -> Result<Workflow> {
    let mut wf = Workflow::new();
    wf.transform(
        "split",
        &[],
        JobCtx::new(),
        JobKind::function(|_, _| Ok(json!({"a": 1, "b": 2, "c": 3}))),
        CallSet::args([]).returns(Managed::temp_output_obj("parts", &["part"]))?,
    )?;
    wf.transform(
        "double",
        &["part"],
        JobCtx::new(),
        JobKind::function(move |args, _| {
            doubled.fetch_add(1, SeqCst);
            let n = args.arg(0)?.as_i64().context("part should be a number")?;
            Ok(json!(n * 2))
        }),
        CallSet::args([Managed::temp_input_obj("parts", &["part"]).into()])
            .returns(Managed::temp_output_obj("doubled", &["part"]))?,
    )?;
    wf.transform(
        "sum",
        &[],
        JobCtx::new(),
        JobKind::function(|args, _| {
            let parts = args.arg(0)?.as_object().context("merge should be a map")?;
            let keys: Vec<&str> = parts.keys().map(String::as_str).collect();
            let total: i64 = parts.values().filter_map(Value::as_i64).sum();
            std::fs::write(args.arg_str(1)?, format!("{} {total}", keys.join(",")))?;
            Ok(Value::Null)
        }),
        CallSet::args([
            Managed::temp_input_obj("doubled", &["part"]).into(),
            Managed::output_file(path_str(total), &[]).into(),
        ]),
    )?;
    Ok(wf)
}

#[test]
fn test_split_merge_regenerates() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let total = dir.path().join("total.txt");
    let doubled = counter();
    let wf = split_merge_workflow(&total, doubled.clone())?;

    let mut runner = runner_with(&temps, Box::new(ThreadJobQueue::new()), 4)?;
    runner.run(&wf)?;
    assert_eq!(std::fs::read_to_string(&total)?, "a,b,c 12");
    assert_eq!(doubled.load(SeqCst), 3);

    let db = runner.db();
    let chunks = db.nodemgr.retrieve_chunks("part", &Node::root(), db.resmgr.as_ref())?;
    assert_eq!(chunks, ["a", "b", "c"]);
    assert!(db.job_shelf.get("/part:b/double"));

    // the split reruns but produces the same chunks, so nothing downstream does.
    runner_with(&temps, Box::new(ThreadJobQueue::new()), 4)?.run(&wf)?;
    assert_eq!(doubled.load(SeqCst), 3);
    Ok(())
}

#[test]
fn test_retry_until_success() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let output = dir.path().join("out.txt");
    let attempts = counter();
    let job_attempts = attempts.clone();

    let mut wf = Workflow::new();
    wf.transform(
        "flaky",
        &[],
        JobCtx::new().with("num_retry", 2).with("mem", 1).with("mem_retry_factor", 2),
        JobKind::function(move |args, io| {
            use std::io::Write;
            let n = job_attempts.fetch_add(1, SeqCst);
            writeln!(io.stdout, "attempt {n}")?;
            if n < 2 {
                bail!("not yet");
            }
            std::fs::write(args.arg_str(0)?, "done")?;
            Ok(Value::Null)
        }),
        CallSet::args([Managed::output_file(path_str(&output), &[]).into()]),
    )?;

    local_runner(&temps)?.run(&wf)?;
    assert_eq!(attempts.load(SeqCst), 3);
    assert_eq!(std::fs::read_to_string(&output)?, "done");

    let logs = temps.join("log/flaky");
    assert!(!JobStats::read(&logs.join("exc0"))?.finished);
    assert!(!JobStats::read(&logs.join("exc1"))?.finished);
    assert!(JobStats::read(&logs.join("exc2"))?.finished);
    Ok(())
}

#[test]
fn test_exhausted_retries_block_downstream() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let downstream = counter();
    let downstream_calls = downstream.clone();

    let mut wf = Workflow::new();
    wf.transform(
        "broken",
        &[],
        JobCtx::new().with("num_retry", 1),
        JobKind::function(|_, _| bail!("always fails")),
        CallSet::args([]).returns(Managed::temp_output_obj("value", &[]))?,
    )?;
    wf.transform(
        "after",
        &[],
        JobCtx::new(),
        JobKind::function(move |_, _| {
            downstream_calls.fetch_add(1, SeqCst);
            Ok(Value::Null)
        }),
        CallSet::args([Managed::temp_input_obj("value", &[]).into()]),
    )?;

    let err = local_runner(&temps)?.run(&wf).expect_err("broken job");
    let agg = err.downcast_ref::<AggregatedErrors>();
    assert!(matches!(agg, Some(AggregatedErrors(_, 1))));
    assert_eq!(downstream.load(SeqCst), 0);

    let stderr = std::fs::read_to_string(temps.join("log/broken/job.err"))?;
    assert!(stderr.contains("always fails"));
    Ok(())
}

#[test]
fn test_timeout_fails_job() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");

    let mut wf = Workflow::new();
    wf.transform(
        "slow",
        &[],
        JobCtx::new().with("timeout", 1),
        JobKind::function(|_, _| {
            std::thread::sleep(Duration::from_secs(3));
            Ok(Value::Null)
        }),
        CallSet::default(),
    )?;

    let err = local_runner(&temps)?.run(&wf).expect_err("timed out");
    assert!(err.downcast_ref::<AggregatedErrors>().is_some());
    let stderr = std::fs::read_to_string(temps.join("log/slow/job.err"))?;
    assert!(stderr.contains("time limit"));
    Ok(())
}

#[test]
fn test_subworkflow_per_sample() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let out_dir = dir.path().to_str().unwrap().to_owned();
    let summary = dir.path().join("summary.txt");

    let mut wf = Workflow::new();
    wf.setobj("samples", Managed::output_chunks("sample", &[]), json!(["s1", "s2"]))?;

    let inner_dir = out_dir.clone();
    wf.subworkflow(
        "per_sample",
        &["sample"],
        JobKind::subworkflow(move |args| {
            let sample = args.arg_str(0)?.to_owned();
            let mut inner = Workflow::new();
            inner.transform(
                "write",
                &[],
                JobCtx::new(),
                JobKind::function(move |args, _| {
                    std::fs::write(args.arg_str(0)?, format!("reads for {sample}"))?;
                    Ok(Value::Null)
                }),
                CallSet::args([Managed::output_file(&format!("{inner_dir}/{{sample}}.txt"), &[]).into()]),
            )?;
            Ok(inner)
        }),
        CallSet::args([Managed::input_instance("sample").into()]),
    )?;

    wf.transform(
        "gather",
        &[],
        JobCtx::new(),
        JobKind::function(|args, _| {
            let files = args.arg(0)?.as_object().context("merge should be a map")?;
            let mut lines = Vec::new();
            for (sample, path) in files {
                let path = path.as_str().context("path should be a string")?;
                lines.push(format!("{sample}: {}", std::fs::read_to_string(path)?));
            }
            std::fs::write(args.arg_str(1)?, lines.join("\n"))?;
            Ok(Value::Null)
        }),
        CallSet::args([
            Managed::input_file(&format!("{out_dir}/{{sample}}.txt"), &["sample"]).into(),
            Managed::output_file(path_str(&summary), &[]).into(),
        ]),
    )?;

    let runner = {
        let mut runner = local_runner(&temps)?;
        runner.run(&wf)?;
        runner
    };
    assert_eq!(
        std::fs::read_to_string(&summary)?,
        "s1: reads for s1\ns2: reads for s2"
    );
    assert!(runner.db().job_shelf.get("/sample:s1/per_sample/write"));
    assert!(runner.db().job_shelf.get("/sample:s2/per_sample"));
    Ok(())
}

#[test]
fn test_subworkflow_output_feeds_parent() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let report = dir.path().join("report.txt");
    let summary = dir.path().join("summary.txt");

    let mut wf = Workflow::new();
    wf.subworkflow(
        "build",
        &[],
        JobKind::subworkflow(|args| {
            // the declared output is handed over at its final path.
            let report = args.arg_str(0)?.to_owned();
            let mut inner = Workflow::new();
            inner.transform(
                "write",
                &[],
                JobCtx::new(),
                JobKind::function(|args, _| {
                    std::fs::write(args.arg_str(0)?, "3 samples")?;
                    Ok(Value::Null)
                }),
                CallSet::args([Managed::output_file(&report, &[]).into()]),
            )?;
            Ok(inner)
        }),
        CallSet::args([Managed::output_file(path_str(&report), &[]).into()]),
    )?;
    wf.transform(
        "consume",
        &[],
        JobCtx::new(),
        JobKind::function(|args, _| {
            let text = std::fs::read_to_string(args.arg_str(0)?)?;
            std::fs::write(args.arg_str(1)?, format!("report: {text}"))?;
            Ok(Value::Null)
        }),
        CallSet::args([
            Managed::input_file(path_str(&report), &[]).into(),
            Managed::output_file(path_str(&summary), &[]).into(),
        ]),
    )?;

    let mut runner = local_runner(&temps)?;
    runner.run(&wf)?;
    assert_eq!(std::fs::read_to_string(&report)?, "3 samples");
    assert_eq!(std::fs::read_to_string(&summary)?, "report: 3 samples");
    assert!(!PathBuf::from(format!("{}.tmp", report.display())).exists());
    assert!(runner.db().job_shelf.get("/build"));
    assert!(runner.db().job_shelf.get("/consume"));
    Ok(())
}

#[test]
fn test_subworkflow_missing_output_fails() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let report = dir.path().join("report.txt");

    let mut wf = Workflow::new();
    wf.subworkflow(
        "build",
        &[],
        JobKind::subworkflow(|_| Ok(Workflow::new())),
        CallSet::args([Managed::output_file(path_str(&report), &[]).into()]),
    )?;

    let mut runner = local_runner(&temps)?;
    let err = runner.run(&wf).expect_err("nothing wrote the report");
    assert!(matches!(err.downcast_ref::<AggregatedErrors>(), Some(AggregatedErrors(_, 1))));
    assert!(!runner.db().job_shelf.get("/build"));
    Ok(())
}

#[test]
fn test_bad_escalation_fails_only_that_job() -> Result<()> {
    let dir = tempdir()?;
    let temps = dir.path().join("temps");
    let output = dir.path().join("out.txt");
    let attempts = counter();
    let job_attempts = attempts.clone();

    let mut wf = Workflow::new();
    wf.transform(
        "greedy",
        &[],
        JobCtx::new()
            .with("num_retry", 2)
            .with("mem", 1)
            .with("mem_retry_factor", "double"),
        JobKind::function(move |_, _| {
            job_attempts.fetch_add(1, SeqCst);
            bail!("out of memory")
        }),
        CallSet::default(),
    )?;
    wf.transform(
        "modest",
        &[],
        JobCtx::new(),
        JobKind::function(|args, _| {
            std::fs::write(args.arg_str(0)?, "fine")?;
            Ok(Value::Null)
        }),
        CallSet::args([Managed::output_file(path_str(&output), &[]).into()]),
    )?;

    let err = local_runner(&temps)?.run(&wf).expect_err("greedy cannot be retried");
    assert!(matches!(err.downcast_ref::<AggregatedErrors>(), Some(AggregatedErrors(_, 1))));
    assert_eq!(attempts.load(SeqCst), 1);
    assert_eq!(std::fs::read_to_string(&output)?, "fine");
    Ok(())
}
