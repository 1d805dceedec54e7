use std::path::PathBuf;

use log::debug;

use crate::error::{ParseError, ShellResult};
use crate::launcher::{self, ExitOutcome, OpenMode, Rebind, StdStream, Streams};
use crate::tokenize::ArgList;

/// A command with at most one input and one output redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    pub args: ArgList,
    pub input: Option<PathBuf>,
    pub output: Option<(PathBuf, OpenMode)>,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    pos: usize,
    token: &'static str,
    kind: MarkerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Input,
    Output(OpenMode),
}

impl RedirectionSpec {
    /// Parse `cmd [< in] [> out | >> out]`, markers in either order.
    ///
    /// The command is the text before the first marker; each file name runs
    /// from its marker to the next marker or the end of the line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut markers = Vec::with_capacity(2);

        // `>>` first: it contains `>`
        let output = match line.find(">>") {
            Some(pos) => Some(Marker {
                pos,
                token: ">>",
                kind: MarkerKind::Output(OpenMode::Append),
            }),
            None => line.find('>').map(|pos| Marker {
                pos,
                token: ">",
                kind: MarkerKind::Output(OpenMode::Truncate),
            }),
        };
        if let Some(marker) = output {
            if line.matches('>').count() > marker.token.len() {
                return Err(ParseError::DuplicateRedirect { marker: ">" });
            }
            markers.push(marker);
        }

        if let Some(pos) = line.find('<') {
            if line[pos + 1..].contains('<') {
                return Err(ParseError::DuplicateRedirect { marker: "<" });
            }
            markers.push(Marker {
                pos,
                token: "<",
                kind: MarkerKind::Input,
            });
        }

        markers.sort_by_key(|m| m.pos);

        let command_end = markers.first().map_or(line.len(), |m| m.pos);
        let args = ArgList::parse(line[..command_end].trim(), 1)?;

        let mut input = None;
        let mut output = None;
        for (i, marker) in markers.iter().enumerate() {
            let start = marker.pos + marker.token.len();
            let end = markers.get(i + 1).map_or(line.len(), |next| next.pos);
            let name = line[start..end].trim();
            if name.is_empty() {
                return Err(ParseError::MissingRedirectTarget {
                    marker: marker.token,
                });
            }
            match marker.kind {
                MarkerKind::Input => input = Some(PathBuf::from(name)),
                MarkerKind::Output(mode) => output = Some((PathBuf::from(name), mode)),
            }
        }

        Ok(Self { args, input, output })
    }

    /// Spawn the command with its streams rebound to the files and wait.
    /// The files are opened by the child; an open failure shows up as
    /// [`launcher::EXIT_REDIRECT_FAILED`].
    pub fn run(&self, io: Streams<'_>) -> ShellResult<ExitOutcome> {
        let mut rebinds = Vec::with_capacity(2);
        if let Some(path) = &self.input {
            rebinds.push(Rebind::file(path, OpenMode::Read, StdStream::Stdin)?);
        }
        if let Some((path, mode)) = &self.output {
            rebinds.push(Rebind::file(path, *mode, StdStream::Stdout)?);
        }
        debug!(
            "redirect `{}` in={:?} out={:?}",
            self.args, self.input, self.output
        );
        Ok(launcher::run(&self.args, io, &rebinds)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn run_line(line: &str) -> ExitOutcome {
        RedirectionSpec::parse(line)
            .unwrap()
            .run(Streams::default())
            .unwrap()
    }

    #[test]
    fn parses_output_truncate() {
        let redirect = RedirectionSpec::parse("echo hi > out.txt").unwrap();
        assert_eq!(redirect.args.words(), &["echo", "hi"]);
        assert_eq!(redirect.input, None);
        assert_eq!(redirect.output, Some((PathBuf::from("out.txt"), OpenMode::Truncate)));
    }

    #[test]
    fn parses_append_before_plain_output() {
        let redirect = RedirectionSpec::parse("echo bye>>log.txt").unwrap();
        assert_eq!(redirect.output, Some((PathBuf::from("log.txt"), OpenMode::Append)));
    }

    #[test]
    fn markers_in_either_order() {
        let a = RedirectionSpec::parse("sort < in.txt > out.txt").unwrap();
        let b = RedirectionSpec::parse("sort > out.txt < in.txt").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.input, Some(PathBuf::from("in.txt")));
    }

    #[test]
    fn rejects_malformed_redirections() {
        assert_eq!(
            RedirectionSpec::parse("echo hi >").unwrap_err(),
            ParseError::MissingRedirectTarget { marker: ">" }
        );
        assert_eq!(
            RedirectionSpec::parse("cat < > out").unwrap_err(),
            ParseError::MissingRedirectTarget { marker: "<" }
        );
        assert_eq!(
            RedirectionSpec::parse("> out.txt").unwrap_err(),
            ParseError::EmptyCommand { position: 1 }
        );
        assert_eq!(
            RedirectionSpec::parse("cat < a < b").unwrap_err(),
            ParseError::DuplicateRedirect { marker: "<" }
        );
        assert_eq!(
            RedirectionSpec::parse("echo x >> a > b").unwrap_err(),
            ParseError::DuplicateRedirect { marker: ">" }
        );
        assert_eq!(
            RedirectionSpec::parse("echo a > b >> c").unwrap_err(),
            ParseError::DuplicateRedirect { marker: ">" }
        );
        assert_eq!(
            RedirectionSpec::parse("echo a > b > c").unwrap_err(),
            ParseError::DuplicateRedirect { marker: ">" }
        );
    }

    #[test]
    fn truncate_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        assert!(run_line(&format!("echo hi > {}", out.display())).is_success());
        assert!(run_line(&format!("echo bye >> {}", out.display())).is_success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\nbye\n");

        run_line(&format!("echo again > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "again\n");
    }

    #[test]
    fn created_file_mode_is_0644() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mode.txt");
        run_line(&format!("true > {}", out.display()));
        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        // umask can only clear bits
        assert_eq!(mode & !0o644, 0);
        assert_ne!(mode & 0o600, 0);
    }

    #[test]
    fn input_and_output_together() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("sorted.txt");
        fs::write(&input, "c\na\nb\n").unwrap();

        let line = format!("sort > {} < {}", output.display(), input.display());
        assert!(run_line(&line).is_success());
        assert_eq!(fs::read_to_string(&output).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn missing_input_fails_in_child() {
        let dir = tempfile::tempdir().unwrap();
        let line = format!("cat < {}", dir.path().join("absent.txt").display());
        assert_eq!(
            run_line(&line),
            ExitOutcome::Failure(launcher::EXIT_REDIRECT_FAILED)
        );
    }

    #[test]
    fn nonzero_exit_is_reported_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let line = format!("ls {} > {}", dir.path().join("nope").display(), dir.path().join("o").display());
        assert!(matches!(run_line(&line), ExitOutcome::Failure(code) if code != 0));
    }
}
