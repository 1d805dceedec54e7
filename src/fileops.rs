//! Whole-file operators. Plain sequential I/O in the shell process; nothing
//! is spawned.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::FileOpError;

/// Most files `+` concatenates.
pub const MAX_CONCAT_FILES: usize = 5;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> FileOpError + '_ {
    move |source| FileOpError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn text_file(name: &str) -> Result<PathBuf, FileOpError> {
    let path = PathBuf::from(name);
    match path.extension() {
        Some(ext) if ext == "txt" => Ok(path),
        _ => Err(FileOpError::NotText(name.to_string())),
    }
}

/// `a.txt ~ b.txt`: append each file's original content to the other.
pub fn append_each_other(line: &str) -> Result<(PathBuf, PathBuf), FileOpError> {
    let missing = || FileOpError::MissingOperand {
        operator: '~',
        expected: "two file names",
    };
    let (first, second) = line.split_once('~').ok_or_else(missing)?;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() || second.contains('~') {
        return Err(missing());
    }
    let first = text_file(first)?;
    let second = text_file(second)?;

    let first_data = fs::read(&first).map_err(io_err(&first))?;
    let second_data = fs::read(&second).map_err(io_err(&second))?;

    append_bytes(&first, &second_data)?;
    append_bytes(&second, &first_data)?;
    debug!("appended {} and {} to each other", first.display(), second.display());
    Ok((first, second))
}

fn append_bytes(path: &Path, data: &[u8]) -> Result<(), FileOpError> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(data))
        .map_err(io_err(path))
}

/// Words separated by spaces, tabs and newlines.
pub fn count_words(text: &str) -> usize {
    text.split([' ', '\t', '\n'])
        .filter(|w| !w.is_empty())
        .count()
}

/// `# file.txt`: number of words in the file.
pub fn word_count(line: &str) -> Result<(PathBuf, usize), FileOpError> {
    let name = line
        .split_once('#')
        .map(|(_, rest)| rest.trim())
        .filter(|name| !name.is_empty())
        .ok_or(FileOpError::MissingOperand {
            operator: '#',
            expected: "a file name",
        })?;
    let path = text_file(name)?;
    let text = fs::read_to_string(&path).map_err(io_err(&path))?;
    Ok((path, count_words(&text)))
}

/// `a.txt + b.txt + ...`: copy up to five files, in order, to `out`.
pub fn concat(line: &str, out: &mut dyn Write) -> Result<usize, FileOpError> {
    let names: Vec<&str> = line
        .split('+')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return Err(FileOpError::MissingOperand {
            operator: '+',
            expected: "at least one file name",
        });
    }
    if names.len() > MAX_CONCAT_FILES {
        return Err(FileOpError::TooManyFiles {
            limit: MAX_CONCAT_FILES,
        });
    }

    let paths = names
        .into_iter()
        .map(text_file)
        .collect::<Result<Vec<_>, _>>()?;
    for path in &paths {
        let mut file = fs::File::open(path).map_err(io_err(path))?;
        io::copy(&mut file, out).map_err(io_err(path))?;
    }
    Ok(paths.len())
}
