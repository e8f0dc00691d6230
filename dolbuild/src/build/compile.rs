//! Compile scheduling.
//!
//! Every manifest entry becomes one job; jobs fan out over a bounded worker
//! pool, each worker blocking on one external compiler process. Jobs are
//! independent and complete in any order; the first failure aborts the build
//! after in-flight work finishes.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::error::BuildError;
use crate::runner::{split_options, ProcessRunner};
use crate::sources::{self, SourceDescriptor};
use crate::toolchain::Toolchain;

#[derive(Debug, Clone)]
pub struct CompileJob {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub compiler: PathBuf,
    pub options: String,
}

/// What the compile stage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    Built(usize),
    /// The (possibly filtered) job set was empty. Reported, not an error.
    NoWork,
}

/// Derive the object path for a source: same stem, `.o`, flat output dir.
pub fn object_path(out_dir: &Path, source: &str) -> PathBuf {
    out_dir.join(sources::stem(source)).with_extension("o")
}

/// Manifest entries whose source path contains `filter`, all of them when
/// no filter is given.
pub fn matching<'m>(
    manifest: &'m [SourceDescriptor],
    filter: Option<&str>,
) -> Vec<&'m SourceDescriptor> {
    manifest
        .iter()
        .filter(|desc| filter.map_or(true, |pattern| desc.src.contains(pattern)))
        .collect()
}

/// Build the job queue from the manifest, filtered to sources whose path
/// contains `filter` when one is given.
pub fn build_jobs(
    toolchain: &Toolchain,
    manifest: &[SourceDescriptor],
    out_dir: &Path,
    filter: Option<&str>,
) -> Result<Vec<CompileJob>> {
    let mut jobs = Vec::new();
    for desc in matching(manifest, filter) {
        jobs.push(CompileJob {
            src: PathBuf::from(desc.src),
            dst: object_path(out_dir, desc.src),
            compiler: toolchain.compiler(desc.cc)?,
            options: format!("{} {}", Toolchain::default_options(), desc.opts),
        });
    }
    Ok(jobs)
}

pub struct Scheduler<'a> {
    runner: &'a dyn ProcessRunner,
    /// Held while printing one job's result block, never across jobs.
    console: Mutex<()>,
}

impl<'a> Scheduler<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            console: Mutex::new(()),
        }
    }

    /// Run every job to completion with at most `min(concurrency, jobs)`
    /// workers. The first compiler failure aborts with its command line and
    /// captured output; objects already produced stay on disk.
    pub fn run(&self, jobs: &[CompileJob], concurrency: usize, out_dir: &Path) -> Result<CompileOutcome> {
        if jobs.is_empty() {
            println!("No sources to compile");
            return Ok(CompileOutcome::NoWork);
        }

        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let workers = concurrency.clamp(1, jobs.len());
        println!("=== Compiling ({} sources, {} workers) ===", jobs.len(), workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to start the compile worker pool")?;
        pool.install(|| jobs.par_iter().try_for_each(|job| self.compile_one(job)))?;

        Ok(CompileOutcome::Built(jobs.len()))
    }

    fn compile_one(&self, job: &CompileJob) -> Result<()> {
        let mut args = split_options(&job.options);
        args.push(job.src.display().to_string());
        args.push("-o".to_string());
        args.push(job.dst.display().to_string());

        let result = self.runner.run(&job.compiler, &args)?;

        {
            let _console = self
                .console
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            println!("CC {}", job.src.display());
            for line in result.output.lines() {
                println!("   {}", line.trim_end());
            }
        }

        if !result.success() {
            return Err(BuildError::ToolchainInvocation {
                command: format!("{} {}", job.compiler.display(), args.join(" ")),
                status: result.status,
                output: result.output,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runner that records concurrency and writes the `-o` target on
    /// success, standing in for the real compiler.
    struct FakeCompiler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl FakeCompiler {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl ProcessRunner for FakeCompiler {
        fn run(&self, _exe: &Path, args: &[String]) -> Result<ProcessOutput> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let src = &args[args.len() - 3];
            let dst = &args[args.len() - 1];
            if self.fail_on.is_some_and(|f| src.contains(f)) {
                return Ok(ProcessOutput {
                    status: 1,
                    output: format!("{src}: fatal error"),
                });
            }
            std::fs::write(dst, b"object").unwrap();
            Ok(ProcessOutput {
                status: 0,
                output: String::new(),
            })
        }
    }

    fn jobs_in(dir: &Path, names: &[&str]) -> Vec<CompileJob> {
        names
            .iter()
            .map(|name| CompileJob {
                src: PathBuf::from(format!("source/{name}.cpp")),
                dst: dir.join(name).with_extension("o"),
                compiler: PathBuf::from("mwcceppc.exe"),
                options: "-c".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_bounded_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let compiler = FakeCompiler::new(None);
        let jobs = jobs_in(&out, &["a", "b", "c", "d", "e", "f", "g", "h"]);

        let scheduler = Scheduler::new(&compiler);
        let outcome = scheduler.run(&jobs, 3, &out).unwrap();

        assert_eq!(outcome, CompileOutcome::Built(8));
        assert!(compiler.max_in_flight.load(Ordering::SeqCst) <= 3);
        for job in &jobs {
            assert!(job.dst.is_file());
        }
    }

    #[test]
    fn test_three_jobs_two_workers_complete() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let compiler = FakeCompiler::new(None);
        let jobs = jobs_in(&out, &["a", "b", "c"]);

        let outcome = Scheduler::new(&compiler).run(&jobs, 2, &out).unwrap();

        assert_eq!(outcome, CompileOutcome::Built(3));
        assert!(compiler.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 3);
    }

    #[test]
    fn test_failure_aborts_and_keeps_finished_objects() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let compiler = FakeCompiler::new(Some("b.cpp"));
        let jobs = jobs_in(&out, &["a", "b", "c"]);

        let err = Scheduler::new(&compiler)
            .run(&jobs, 1, &out)
            .unwrap_err();

        match err.downcast_ref::<BuildError>() {
            Some(BuildError::ToolchainInvocation { command, status, output }) => {
                assert!(command.contains("b.cpp"));
                assert_eq!(*status, 1);
                assert!(output.contains("fatal error"));
            }
            other => panic!("expected ToolchainInvocation, got {other:?}"),
        }
        // One worker means `a` finished before `b` failed, and stays.
        assert!(out.join("a.o").is_file());
    }

    #[test]
    fn test_empty_job_set_is_no_work() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let compiler = FakeCompiler::new(None);

        let outcome = Scheduler::new(&compiler).run(&[], 4, &out).unwrap();

        assert_eq!(outcome, CompileOutcome::NoWork);
        // No work, no output directory either.
        assert!(!out.exists());
    }

    #[test]
    fn test_matching_selects_exactly_the_substring_subset() {
        use crate::sources::SOURCES;

        let subset = matching(SOURCES, Some("game"));
        assert!(!subset.is_empty());
        assert!(subset.iter().all(|d| d.src.contains("game")));
        assert_eq!(
            subset.len(),
            SOURCES.iter().filter(|d| d.src.contains("game")).count()
        );

        assert_eq!(matching(SOURCES, None).len(), SOURCES.len());
        assert!(matching(SOURCES, Some("no_such_source")).is_empty());
    }

    #[test]
    fn test_object_path_derivation() {
        assert_eq!(
            object_path(Path::new("out"), "source/game/game_scene.cpp"),
            PathBuf::from("out/game_scene.o")
        );
    }
}
