//! Interactive line input.

mod line;
mod raw_mode;

pub use line::{LineEditor, MAX_INPUT};
