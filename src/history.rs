use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::debug;

pub struct History {
    commands: Vec<String>,
    file_path: PathBuf,
    max_entries: usize,
    position: usize,
}

impl History {
    pub fn new(file_path: PathBuf, max_entries: usize) -> Self {
        let mut commands = Self::load_from_file(&file_path);
        if commands.len() > max_entries {
            commands.drain(..commands.len() - max_entries);
        }
        let position = commands.len();

        Self {
            commands,
            file_path,
            max_entries,
            position,
        }
    }

    fn load_from_file(path: &Path) -> Vec<String> {
        match File::open(path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .map_while(Result::ok)
                .filter(|line| !line.trim().is_empty())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn add(&mut self, command: &str) {
        if command.trim().is_empty() || self.max_entries == 0 {
            return;
        }

        // Don't add duplicate of last command
        if self.commands.last().map(String::as_str) != Some(command) {
            self.commands.push(command.to_string());
            if self.commands.len() > self.max_entries {
                self.commands.drain(..self.commands.len() - self.max_entries);
                self.rewrite_file();
            } else {
                self.append_to_file(command);
            }
        }

        self.position = self.commands.len();
    }

    fn append_to_file(&self, command: &str) {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            let _ = writeln!(file, "{}", command);
        }
    }

    fn rewrite_file(&self) {
        let mut content = self.commands.join("\n");
        content.push('\n');
        if let Err(e) = fs::write(&self.file_path, content) {
            debug!("cannot rewrite history {}: {}", self.file_path.display(), e);
        }
    }

    /// Move to the next-older entry.
    pub fn previous(&mut self) -> Option<&str> {
        if self.position > 0 {
            self.position -= 1;
            self.commands.get(self.position).map(String::as_str)
        } else {
            None
        }
    }

    /// Move to the next-newer entry; `None` once past the newest.
    pub fn next(&mut self) -> Option<&str> {
        if self.position + 1 < self.commands.len() {
            self.position += 1;
            Some(&self.commands[self.position])
        } else {
            self.position = self.commands.len();
            None
        }
    }

    /// Forget any navigation in progress.
    pub fn reset_position(&mut self) {
        self.position = self.commands.len();
    }

    pub fn entry_count(&self) -> usize {
        self.commands.len()
    }
}
