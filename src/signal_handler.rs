use log::warn;
use nix::sys::signal::{self, SigHandler, Signal};

/// Keyboard signals the interactive shell ignores.
const INTERACTIVE_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

/// Ignored dispositions survive `exec`, so children reset these. SIGPIPE is
/// ignored by the Rust runtime itself; a pipeline stage whose reader went
/// away must die from it like under any other shell.
const CHILD_DEFAULT_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGPIPE];

pub fn ignore_interactive_signals() {
    for sig in INTERACTIVE_SIGNALS {
        if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigIgn) } {
            warn!("cannot ignore {}: {}", sig, e);
        }
    }
}

/// Called in a forked child; must stay async-signal-safe.
pub fn restore_default_signals() {
    for sig in CHILD_DEFAULT_SIGNALS {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
}
