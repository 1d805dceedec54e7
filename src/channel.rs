use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::{debug, trace};
use nix::fcntl::OFlag;
use nix::unistd;

use crate::error::ResourceError;

/// One pipe between stage `i` and stage `i + 1`.
///
/// Both ends are close-on-exec; a child only keeps an end across `exec` once
/// it has been dup'ed onto stdin or stdout.
#[derive(Debug)]
pub struct Channel {
    read: OwnedFd,
    write: OwnedFd,
}

impl Channel {
    pub fn open() -> Result<Self, ResourceError> {
        let (read, write) =
            unistd::pipe2(OFlag::O_CLOEXEC).map_err(ResourceError::ChannelCreationFailed)?;
        trace!("pipe opened: read={} write={}", read.as_raw_fd(), write.as_raw_fd());
        Ok(Self { read, write })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }
}

/// Where one stage's stdin and stdout come from, as indices into the
/// channel arena. `None` means the pipeline's outer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub upstream: Option<usize>,
    pub downstream: Option<usize>,
}

impl Adjacency {
    pub fn for_stage(index: usize, stage_count: usize) -> Self {
        Self {
            upstream: index.checked_sub(1),
            downstream: (index + 1 < stage_count).then_some(index),
        }
    }
}

/// All channels of one pipeline. Dropping the set closes every endpoint the
/// parent still holds.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

/// Create `n` channels before anything is spawned. On failure the channels
/// already created are closed again and nothing is left behind.
pub fn allocate(n: usize) -> Result<ChannelSet, ResourceError> {
    let channels = (0..n).map(|_| Channel::open()).collect::<Result<Vec<_>, _>>()?;
    debug!("allocated {} channel(s)", channels.len());
    Ok(ChannelSet { channels })
}

impl ChannelSet {
    /// Read end feeding the stage, write end it feeds.
    pub fn endpoints(&self, adjacency: Adjacency) -> (Option<RawFd>, Option<RawFd>) {
        let stdin = adjacency.upstream.map(|i| self.channels[i].read_fd());
        let stdout = adjacency.downstream.map(|i| self.channels[i].write_fd());
        (stdin, stdout)
    }

    /// Every endpoint of every channel.
    pub fn raw_fds(&self) -> Vec<RawFd> {
        self.channels
            .iter()
            .flat_map(|c| [c.read_fd(), c.write_fd()])
            .collect()
    }

    /// Parent cleanup: close every endpoint.
    pub fn release(self) {
        debug!("releasing {} channel(s) in parent", self.channels.len());
        drop(self.channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Write};

    #[test]
    fn allocate_creates_distinct_endpoints() {
        let set = allocate(3).unwrap();
        let mut fds = set.raw_fds();
        assert_eq!(fds.len(), 6);
        fds.sort();
        fds.dedup();
        assert_eq!(fds.len(), 6);
        set.release();
    }

    #[test]
    fn allocate_zero_is_empty() {
        let set = allocate(0).unwrap();
        assert!(set.raw_fds().is_empty());
    }

    #[test]
    fn adjacency_by_position() {
        assert_eq!(
            Adjacency::for_stage(0, 1),
            Adjacency { upstream: None, downstream: None }
        );
        assert_eq!(
            Adjacency::for_stage(0, 3),
            Adjacency { upstream: None, downstream: Some(0) }
        );
        assert_eq!(
            Adjacency::for_stage(1, 3),
            Adjacency { upstream: Some(0), downstream: Some(1) }
        );
        assert_eq!(
            Adjacency::for_stage(2, 3),
            Adjacency { upstream: Some(1), downstream: None }
        );
    }

    #[test]
    fn endpoints_follow_adjacency() {
        let set = allocate(2).unwrap();
        let (stdin, stdout) = set.endpoints(Adjacency::for_stage(1, 3));
        assert_eq!(stdin, Some(set.channels[0].read_fd()));
        assert_eq!(stdout, Some(set.channels[1].write_fd()));
    }

    #[test]
    fn channel_carries_bytes_and_reports_eof() {
        let Channel { read, write } = Channel::open().unwrap();
        let mut writer = File::from(write);
        writer.write_all(b"abc").unwrap();
        drop(writer);

        let mut out = String::new();
        File::from(read).read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn endpoints_are_close_on_exec() {
        let channel = Channel::open().unwrap();
        for fd in [channel.read_fd(), channel.write_fd()] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags >= 0);
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }
}
