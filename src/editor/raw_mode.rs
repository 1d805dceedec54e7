use std::io;
use std::sync::Once;

use crossterm::terminal;

static RESTORE_ON_PANIC: Once = Once::new();

/// Keeps the terminal in raw mode while alive. Only the guard that switched
/// raw mode on switches it back off.
pub struct RawModeGuard {
    owned: bool,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        RESTORE_ON_PANIC.call_once(|| {
            let prev = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                let _ = terminal::disable_raw_mode();
                prev(info);
            }));
        });

        if terminal::is_raw_mode_enabled()? {
            return Ok(Self { owned: false });
        }
        terminal::enable_raw_mode()?;
        Ok(Self { owned: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.owned {
            let _ = terminal::disable_raw_mode();
        }
    }
}
