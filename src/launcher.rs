//! Fork, rebind standard streams, exec, reap.
//!
//! Code that runs between `fork` and `exec` only makes raw system calls: the
//! argument vector, file paths and diagnostics are all prepared by the parent.

use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::trace;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::{ParseError, ResourceError};
use crate::signal_handler;
use crate::tokenize::ArgList;

/// Child status when the program image could not be replaced.
pub const EXIT_EXEC_FAILED: i32 = 127;
/// Child status when a stream could not be rebound before exec.
pub const EXIT_REDIRECT_FAILED: i32 = 125;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure(i32),
    Abnormal(Signal),
}

impl ExitOutcome {
    /// `None` for statuses that do not mean the child is gone.
    pub fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, 0) => Some(ExitOutcome::Success),
            WaitStatus::Exited(_, code) => Some(ExitOutcome::Failure(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitOutcome::Abnormal(signal)),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitOutcome::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
}

impl StdStream {
    fn fd(self) -> RawFd {
        match self {
            StdStream::Stdin => libc::STDIN_FILENO,
            StdStream::Stdout => libc::STDOUT_FILENO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Truncate,
    Append,
}

impl OpenMode {
    fn flags(self) -> libc::c_int {
        match self {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::Truncate => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        }
    }
}

/// Caller-owned descriptors standing in for a child's stdin and stdout.
/// `None` inherits the shell's own stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Streams<'a> {
    pub stdin: Option<BorrowedFd<'a>>,
    pub stdout: Option<BorrowedFd<'a>>,
}

impl Streams<'_> {
    pub fn raw(&self) -> (Option<RawFd>, Option<RawFd>) {
        (
            self.stdin.map(|fd| fd.as_raw_fd()),
            self.stdout.map(|fd| fd.as_raw_fd()),
        )
    }

    pub fn raw_fds(&self) -> Vec<RawFd> {
        let (stdin, stdout) = self.raw();
        stdin.into_iter().chain(stdout).collect()
    }

    pub fn rebinds(&self) -> Vec<Rebind> {
        let (stdin, stdout) = self.raw();
        let stdin = stdin.map(|fd| Rebind::Fd {
            fd,
            target: StdStream::Stdin,
        });
        let stdout = stdout.map(|fd| Rebind::Fd {
            fd,
            target: StdStream::Stdout,
        });
        stdin.into_iter().chain(stdout).collect()
    }
}

/// One change to a child's standard streams, applied before exec.
#[derive(Debug, Clone)]
pub enum Rebind {
    /// Duplicate an already-open descriptor (a channel end) onto the stream.
    Fd { fd: RawFd, target: StdStream },
    /// Open a file (mode 0644 when created) onto the stream.
    Open {
        path: CString,
        mode: OpenMode,
        target: StdStream,
        diagnostic: Vec<u8>,
    },
}

impl Rebind {
    pub fn file(path: &Path, mode: OpenMode, target: StdStream) -> Result<Self, ParseError> {
        let c_path =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| ParseError::InteriorNul)?;
        let diagnostic = format!("pipesh: cannot open {}\n", path.display()).into_bytes();
        Ok(Rebind::Open {
            path: c_path,
            mode,
            target,
            diagnostic,
        })
    }

    // Runs in the forked child.
    fn apply(&self) -> Result<(), &[u8]> {
        const DUP_FAILED: &[u8] = b"pipesh: cannot rebind standard stream\n";
        match self {
            Rebind::Fd { fd, target } => dup_onto(*fd, target.fd()).map_err(|_| DUP_FAILED),
            Rebind::Open {
                path,
                mode,
                target,
                diagnostic,
            } => {
                let fd = unsafe { libc::open(path.as_ptr(), mode.flags(), 0o644 as libc::c_uint) };
                if fd < 0 {
                    return Err(diagnostic.as_slice());
                }
                let bound = dup_onto(fd, target.fd());
                if fd != target.fd() {
                    unsafe { libc::close(fd) };
                }
                bound.map_err(|_| DUP_FAILED)
            }
        }
    }
}

fn dup_onto(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd == target {
        // dup2 would be a no-op and leave close-on-exec set
        return Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFD, 0) }).map(drop);
    }
    Errno::result(unsafe { libc::dup2(fd, target) }).map(drop)
}

fn write_stderr(msg: &[u8]) {
    unsafe { libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len()) };
}

/// A spawned child that has not been reaped yet.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    program: String,
}

impl ChildHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Block until the child terminates.
    pub fn wait(self) -> Result<ExitOutcome, ResourceError> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(outcome) = ExitOutcome::from_status(status) {
                        trace!("reaped {} ({}): {:?}", self.pid, self.program, outcome);
                        return Ok(outcome);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(source) => {
                    return Err(ResourceError::ReapFailed {
                        pid: self.pid,
                        source,
                    })
                }
            }
        }
    }
}

/// Fork a child that applies `rebinds`, closes every descriptor in
/// `release`, and execs `args`.
///
/// `release` must list every pipe endpoint the child should not keep,
/// including the originals of the ends named in `rebinds`.
pub fn spawn(args: &ArgList, rebinds: &[Rebind], release: &[RawFd]) -> Result<ChildHandle, ResourceError> {
    let exec_failure =
        format!("pipesh: {}: command not found or not executable\n", args.program()).into_bytes();

    match unsafe { unistd::fork() } {
        Ok(ForkResult::Parent { child }) => {
            trace!("spawned {} as {}", args, child);
            Ok(ChildHandle {
                pid: child,
                program: args.program().to_string(),
            })
        }
        Ok(ForkResult::Child) => exec_child(args, rebinds, release, &exec_failure),
        Err(source) => Err(ResourceError::SpawnFailed {
            program: args.program().to_string(),
            source,
        }),
    }
}

fn exec_child(args: &ArgList, rebinds: &[Rebind], release: &[RawFd], exec_failure: &[u8]) -> ! {
    signal_handler::restore_default_signals();

    for rebind in rebinds {
        if let Err(msg) = rebind.apply() {
            write_stderr(msg);
            unsafe { libc::_exit(EXIT_REDIRECT_FAILED) };
        }
    }

    for &fd in release {
        if fd > libc::STDERR_FILENO {
            unsafe { libc::close(fd) };
        }
    }

    let argv = args.argv();
    let _ = unistd::execvp(&argv[0], argv);
    write_stderr(exec_failure);
    unsafe { libc::_exit(EXIT_EXEC_FAILED) }
}

/// Spawn one unpiped command with `streams`, plus any file `rebinds`
/// applied after them, and wait for it.
pub fn run(args: &ArgList, streams: Streams<'_>, rebinds: &[Rebind]) -> Result<ExitOutcome, ResourceError> {
    let mut all = streams.rebinds();
    all.extend(rebinds.iter().cloned());
    spawn(args, &all, &streams.raw_fds())?.wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::WaitPidFlag;
    use std::os::fd::AsFd;

    fn args(line: &str) -> ArgList {
        ArgList::parse(line, 0).unwrap()
    }

    #[test]
    fn outcome_from_wait_status() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            ExitOutcome::from_status(WaitStatus::Exited(pid, 0)),
            Some(ExitOutcome::Success)
        );
        assert_eq!(
            ExitOutcome::from_status(WaitStatus::Exited(pid, 3)),
            Some(ExitOutcome::Failure(3))
        );
        assert_eq!(
            ExitOutcome::from_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(ExitOutcome::Abnormal(Signal::SIGKILL))
        );
        assert_eq!(ExitOutcome::from_status(WaitStatus::StillAlive), None);
    }

    #[test]
    fn true_and_false() {
        assert_eq!(run(&args("true"), Streams::default(), &[]).unwrap(), ExitOutcome::Success);
        assert_eq!(run(&args("false"), Streams::default(), &[]).unwrap(), ExitOutcome::Failure(1));
    }

    #[test]
    fn missing_program_exits_with_exec_status() {
        let outcome = run(&args("pipesh-no-such-program-xyz"), Streams::default(), &[]).unwrap();
        assert_eq!(outcome, ExitOutcome::Failure(EXIT_EXEC_FAILED));
    }

    #[test]
    fn killed_child_is_abnormal() {
        let child = spawn(&args("sleep 5"), &[], &[]).unwrap();
        nix::sys::signal::kill(child.pid(), Signal::SIGKILL).unwrap();
        assert_eq!(child.wait().unwrap(), ExitOutcome::Abnormal(Signal::SIGKILL));
    }

    #[test]
    fn stdout_can_be_bound_to_a_descriptor() {
        let out = tempfile::NamedTempFile::new().unwrap();
        let streams = Streams {
            stdin: None,
            stdout: Some(out.as_file().as_fd()),
        };
        run(&args("echo bound"), streams, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "bound\n");
    }

    #[test]
    fn unopenable_input_exits_with_redirect_status() {
        let dir = tempfile::tempdir().unwrap();
        let rebind = Rebind::file(&dir.path().join("missing.txt"), OpenMode::Read, StdStream::Stdin).unwrap();
        let outcome = run(&args("cat"), Streams::default(), &[rebind]).unwrap();
        assert_eq!(outcome, ExitOutcome::Failure(EXIT_REDIRECT_FAILED));
    }

    #[test]
    fn reaped_child_leaves_no_zombie() {
        let child = spawn(&args("true"), &[], &[]).unwrap();
        let pid = child.pid();
        child.wait().unwrap();
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }
}
