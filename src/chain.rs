//! Sequential (`;`) and conditional (`&&`, `||`) command lists.
//!
//! Both run one unpiped process at a time; they differ only in whether a
//! link is gated on the previous outcome.

use log::debug;

use crate::command::{Builtin, Command};
use crate::error::ResourceError;
use crate::launcher::{self, ExitOutcome, Streams};
use crate::topology::{ConditionalChain, Connector, SequentialList};
use crate::tokenize::ArgList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Ran(ExitOutcome),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub command: String,
    pub result: StepResult,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ChainReport {
    pub steps: Vec<Step>,
    /// Outcome of the last command that actually ran.
    pub last: ExitOutcome,
    /// A built-in reached by the chain. The rest of the chain was abandoned
    /// and the caller must carry it out.
    pub builtin: Option<Builtin>,
}

impl ChainReport {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            last: ExitOutcome::Success,
            builtin: None,
        }
    }

    pub fn ran(&self) -> impl Iterator<Item = (&str, ExitOutcome)> {
        self.steps.iter().filter_map(|step| match step.result {
            StepResult::Ran(outcome) => Some((step.command.as_str(), outcome)),
            StepResult::Skipped => None,
        })
    }
}

/// Whether a link gated by `gate` runs after `last`. A signal death counts
/// as failure.
pub fn should_run(gate: Option<Connector>, last: ExitOutcome) -> bool {
    match gate {
        None => true,
        Some(Connector::And) => last.is_success(),
        Some(Connector::Or) => !last.is_success(),
    }
}

fn run_links<'a>(
    links: impl Iterator<Item = (&'a ArgList, Option<Connector>)>,
    io: Streams<'_>,
) -> Result<ChainReport, ResourceError> {
    let mut report = ChainReport::new();

    for (args, gate) in links {
        if !should_run(gate, report.last) {
            debug!("skipping `{}` after {:?}", args, report.last);
            report.steps.push(Step {
                command: args.to_string(),
                result: StepResult::Skipped,
            });
            continue;
        }

        if let Command::Builtin(builtin) = Command::from_args(args.clone()) {
            debug!("chain stopped by built-in {:?}", builtin);
            report.builtin = Some(builtin);
            break;
        }

        let outcome = launcher::run(args, io, &[])?;
        report.last = outcome;
        report.steps.push(Step {
            command: args.to_string(),
            result: StepResult::Ran(outcome),
        });
    }

    Ok(report)
}

/// Run a `&&`/`||` chain with short-circuiting.
pub fn run_conditional(chain: &ConditionalChain, io: Streams<'_>) -> Result<ChainReport, ResourceError> {
    let links = chain
        .links()
        .iter()
        .enumerate()
        .map(|(i, link)| (&link.args, chain.gate(i)));
    run_links(links, io)
}

/// Run every command of a `;` list regardless of outcomes.
pub fn run_sequential(list: &SequentialList, io: Streams<'_>) -> Result<ChainReport, ResourceError> {
    run_links(list.commands().iter().map(|args| (args, None)), io)
}
