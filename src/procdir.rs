use std::io;
use std::process::Command;

use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Process discovery and signalling, injected so the broadcast built-in does
/// not depend on a particular tool.
pub trait ProcessDirectory {
    /// Pids of every process whose name is exactly `name`.
    fn find(&self, name: &str) -> io::Result<Vec<Pid>>;

    fn signal(&self, pid: Pid, signal: Signal) -> nix::Result<()>;
}

/// Discovery through `pgrep -x`.
#[derive(Debug, Default)]
pub struct Pgrep;

impl ProcessDirectory for Pgrep {
    fn find(&self, name: &str) -> io::Result<Vec<Pid>> {
        let output = Command::new("pgrep").arg("-x").arg(name).output()?;
        // pgrep exits 1 when nothing matched
        if !output.status.success() && output.status.code() != Some(1) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("pgrep failed: {}", output.status),
            ));
        }
        Ok(parse_pids(&String::from_utf8_lossy(&output.stdout)))
    }

    fn signal(&self, pid: Pid, sig: Signal) -> nix::Result<()> {
        signal::kill(pid, sig)
    }
}

fn parse_pids(text: &str) -> Vec<Pid> {
    text.lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .map(Pid::from_raw)
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub terminated: Vec<Pid>,
    pub failed: Vec<Pid>,
}

/// Send SIGTERM to every process named `name` except `own`. Fire and forget:
/// nothing waits for the targets to exit.
pub fn broadcast_terminate(
    directory: &dyn ProcessDirectory,
    name: &str,
    own: Pid,
) -> io::Result<BroadcastReport> {
    let mut report = BroadcastReport::default();
    for pid in directory.find(name)?.into_iter().filter(|&pid| pid != own) {
        match directory.signal(pid, Signal::SIGTERM) {
            Ok(()) => {
                debug!("sent SIGTERM to {}", pid);
                report.terminated.push(pid);
            }
            Err(e) => {
                warn!("cannot signal {}: {}", pid, e);
                report.failed.push(pid);
            }
        }
    }
    Ok(report)
}
