use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    style::Print,
    terminal::{self, ClearType},
};

use super::raw_mode::RawModeGuard;
use crate::history::History;

/// Longest line the shell accepts, in bytes.
pub const MAX_INPUT: usize = 1024;

/// What a key did to the line being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Redraw,
    MoveCursor,
    Submit,
    /// Ctrl-C: line thrown away.
    Cancel,
    /// Ctrl-D on an empty line.
    EndOfInput,
    Bell,
    Nothing,
}

/// Editable line state; terminal independent.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: String,
    /// In chars.
    cursor_pos: usize,
}

impl LineBuffer {
    fn clear(&mut self) {
        self.buffer.clear();
        self.cursor_pos = 0;
    }

    fn replace(&mut self, text: &str) {
        self.buffer = text.to_string();
        self.cursor_pos = self.buffer.chars().count();
    }

    fn byte_index_at_char_pos(&self, char_pos: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }

    fn char_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn handle(&mut self, key: KeyEvent, history: &mut History) -> KeyAction {
        match key {
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => KeyAction::Submit,

            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                self.clear();
                history.reset_position();
                KeyAction::Cancel
            }

            KeyEvent {
                code: KeyCode::Char('d'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                if self.buffer.is_empty() {
                    KeyAction::EndOfInput
                } else {
                    KeyAction::Nothing
                }
            }

            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                if self.cursor_pos == 0 {
                    return KeyAction::Nothing;
                }
                self.cursor_pos -= 1;
                let at = self.byte_index_at_char_pos(self.cursor_pos);
                self.buffer.remove(at);
                KeyAction::Redraw
            }

            KeyEvent {
                code: KeyCode::Delete,
                ..
            } => {
                if self.cursor_pos >= self.char_count() {
                    return KeyAction::Nothing;
                }
                let at = self.byte_index_at_char_pos(self.cursor_pos);
                self.buffer.remove(at);
                KeyAction::Redraw
            }

            KeyEvent {
                code: KeyCode::Left,
                ..
            } => {
                if self.cursor_pos == 0 {
                    return KeyAction::Nothing;
                }
                self.cursor_pos -= 1;
                KeyAction::MoveCursor
            }

            KeyEvent {
                code: KeyCode::Right,
                ..
            } => {
                if self.cursor_pos >= self.char_count() {
                    return KeyAction::Nothing;
                }
                self.cursor_pos += 1;
                KeyAction::MoveCursor
            }

            KeyEvent {
                code: KeyCode::Home,
                ..
            }
            | KeyEvent {
                code: KeyCode::Char('a'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                self.cursor_pos = 0;
                KeyAction::MoveCursor
            }

            KeyEvent {
                code: KeyCode::End,
                ..
            }
            | KeyEvent {
                code: KeyCode::Char('e'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                self.cursor_pos = self.char_count();
                KeyAction::MoveCursor
            }

            KeyEvent {
                code: KeyCode::Up,
                ..
            } => match history.previous() {
                Some(entry) => {
                    let entry = entry.to_string();
                    self.replace(&entry);
                    KeyAction::Redraw
                }
                None => KeyAction::Nothing,
            },

            KeyEvent {
                code: KeyCode::Down,
                ..
            } => {
                match history.next() {
                    Some(entry) => {
                        let entry = entry.to_string();
                        self.replace(&entry);
                    }
                    None => self.clear(),
                }
                KeyAction::Redraw
            }

            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => {
                if self.buffer.len() + c.len_utf8() > MAX_INPUT {
                    return KeyAction::Bell;
                }
                let at = self.byte_index_at_char_pos(self.cursor_pos);
                self.buffer.insert(at, c);
                self.cursor_pos += 1;
                KeyAction::Redraw
            }

            _ => KeyAction::Nothing,
        }
    }
}

/// Reads one line per call, from the terminal in raw mode or, when stdin is
/// not a terminal, plainly.
pub struct LineEditor {
    line: LineBuffer,
    interactive: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            line: LineBuffer::default(),
            interactive: io::stdin().is_terminal(),
        }
    }

    /// `Ok(None)` at end of input.
    pub fn read_line(&mut self, prompt: &str, history: &mut History) -> io::Result<Option<String>> {
        if self.interactive {
            self.read_interactive(prompt, history)
        } else {
            read_plain(&mut io::stdin().lock())
        }
    }

    fn read_interactive(&mut self, prompt: &str, history: &mut History) -> io::Result<Option<String>> {
        self.line.clear();
        history.reset_position();

        let mut stdout = io::stdout();
        let _guard = RawModeGuard::enter()?;

        execute!(stdout, Print(prompt))?;
        stdout.flush()?;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match self.line.handle(key, history) {
                KeyAction::Submit | KeyAction::Cancel => {
                    execute!(stdout, Print("\r\n"))?;
                    return Ok(Some(self.line.buffer.clone()));
                }
                KeyAction::EndOfInput => {
                    execute!(stdout, Print("\r\n"))?;
                    return Ok(None);
                }
                KeyAction::Redraw => self.redraw(prompt)?,
                KeyAction::MoveCursor => self.update_cursor_position(prompt)?,
                KeyAction::Bell => execute!(stdout, Print("\x07"))?,
                KeyAction::Nothing => {}
            }
        }
    }

    fn redraw(&self, prompt: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::UntilNewLine),
            Print(prompt),
            Print(&self.line.buffer),
        )?;
        self.update_cursor_position(prompt)
    }

    fn update_cursor_position(&self, prompt: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        let column = visual_length(prompt) + self.line.cursor_pos;
        execute!(stdout, cursor::MoveToColumn(column as u16))?;
        stdout.flush()
    }
}

/// One line from a non-terminal reader, newline stripped.
fn read_plain(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Length as displayed, ignoring ANSI colour sequences.
fn visual_length(s: &str) -> usize {
    let mut in_escape = false;
    let mut length = 0;

    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
            continue;
        }
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
            continue;
        }
        length += 1;
    }
    length
}
