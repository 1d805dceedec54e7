use std::os::fd::RawFd;

use log::{debug, warn};
use nix::unistd::Pid;

use crate::channel::{self, Adjacency};
use crate::error::ResourceError;
use crate::launcher::{self, ChildHandle, ExitOutcome, Rebind, StdStream, Streams};
use crate::topology::PipelineTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Allocating,
    Spawning,
    ParentCleanup,
    Reaping,
    Done,
}

/// What happened to one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageExit {
    pub index: usize,
    pub pid: Pid,
    pub outcome: ExitOutcome,
}

/// Diagnostics of a finished pipeline. The shell does not surface per-stage
/// statuses; they are kept for logging and tests.
#[derive(Debug, Default)]
pub struct PipelineRun {
    /// Stage indices in the order their processes were created.
    pub spawn_order: Vec<usize>,
    /// One entry per spawned stage, in stage order.
    pub exits: Vec<StageExit>,
}

fn enter(phase: Phase, topology: &PipelineTopology) {
    debug!(
        "{:?} pipeline ({} stages): {:?}",
        topology.direction(),
        topology.stages().len(),
        phase
    );
}

/// Run every stage of `topology` connected by pipes. `io` is what the first
/// stage reads and where the last stage writes.
///
/// All stages are spawned before any is waited on. If a spawn fails, the
/// stages already running are left to finish and are reaped before the
/// error is returned.
pub fn run_pipeline(topology: &PipelineTopology, io: Streams<'_>) -> Result<PipelineRun, ResourceError> {
    let stages = topology.stages();
    if stages.is_empty() {
        return Ok(PipelineRun::default());
    }

    enter(Phase::Allocating, topology);
    let channels = channel::allocate(topology.channel_count())?;

    // Every child closes every pipe end and the outer descriptors once its
    // own ends are dup'ed onto stdin/stdout.
    let (outer_in, outer_out) = io.raw();
    let mut release: Vec<RawFd> = channels.raw_fds();
    release.extend(io.raw_fds());

    enter(Phase::Spawning, topology);
    let last = stages.len() - 1;
    let mut run = PipelineRun::default();
    let mut children: Vec<(usize, ChildHandle)> = Vec::with_capacity(stages.len());
    let mut aborted = None;

    for index in topology.spawn_order() {
        let stage = &stages[index];
        let (upstream, downstream) = channels.endpoints(Adjacency::for_stage(index, stages.len()));
        let stdin = if index == 0 { outer_in } else { upstream };
        let stdout = if index == last { outer_out } else { downstream };

        let rebinds: Vec<Rebind> = [(stdin, StdStream::Stdin), (stdout, StdStream::Stdout)]
            .into_iter()
            .filter_map(|(fd, target)| fd.map(|fd| Rebind::Fd { fd, target }))
            .collect();

        match launcher::spawn(&stage.args, &rebinds, &release) {
            Ok(child) => {
                run.spawn_order.push(index);
                children.push((index, child));
            }
            Err(e) => {
                warn!("pipeline aborted at stage {} ({}): {}", stage.index, stage.args, e);
                aborted = Some(e);
                break;
            }
        }
    }

    enter(Phase::ParentCleanup, topology);
    channels.release();

    enter(Phase::Reaping, topology);
    children.sort_by_key(|(index, _)| *index);
    let mut reap_error = None;
    for (index, child) in children {
        let pid = child.pid();
        let program = child.program().to_string();
        match child.wait() {
            Ok(outcome) => run.exits.push(StageExit { index, pid, outcome }),
            Err(e) => {
                warn!("stage {} ({}): {}", index, program, e);
                reap_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = aborted.or(reap_error) {
        return Err(e);
    }
    enter(Phase::Done, topology);
    Ok(run)
}
