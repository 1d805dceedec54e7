use std::io::{self, Write};

use colored::Colorize;
use log::{debug, info, warn};
use nix::unistd::Pid;

use crate::chain::{self, ChainReport};
use crate::command::{Builtin, Command};
use crate::config::Config;
use crate::editor::{LineEditor, MAX_INPUT};
use crate::error::{ParseError, ShellResult};
use crate::fileops;
use crate::history::History;
use crate::launcher::{self, ExitOutcome, Streams};
use crate::pipes::run_pipeline;
use crate::procdir::{self, Pgrep, ProcessDirectory};
use crate::prompt::Prompt;
use crate::redirects::RedirectionSpec;
use crate::signal_handler;
use crate::topology::{
    classify, ConditionalChain, Direction, OperatorClass, PipelineTopology, SequentialList,
};

/// Whether the prompt loop keeps going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Turns one input line into processes. Holds no terminal state, so it can
/// run against any streams.
pub struct Evaluator {
    directory: Box<dyn ProcessDirectory>,
    process_name: String,
}

impl Evaluator {
    pub fn new(directory: Box<dyn ProcessDirectory>, process_name: String) -> Self {
        Self {
            directory,
            process_name,
        }
    }

    /// Execute `line`. Child processes use `io`; the shell's own output
    /// (file operator results, exit statuses, built-in messages) goes to `out`.
    pub fn execute_line(&self, line: &str, io: Streams<'_>, out: &mut dyn Write) -> ShellResult<Flow> {
        if line.len() > MAX_INPUT {
            return Err(ParseError::InputTooLong { limit: MAX_INPUT }.into());
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        let class = classify(line);
        debug!("{:?}: {}", class, line);

        match class {
            OperatorClass::Forward => self.pipeline(line, Direction::Forward, io),
            OperatorClass::Reverse => self.pipeline(line, Direction::Reverse, io),
            OperatorClass::Append => {
                let (first, second) = fileops::append_each_other(line)?;
                writeln!(
                    out,
                    "Appended {} and {} to each other",
                    first.display(),
                    second.display()
                )?;
                Ok(Flow::Continue)
            }
            OperatorClass::WordCount => {
                let (path, words) = fileops::word_count(line)?;
                writeln!(out, "Number of words in {}: {}", path.display(), words)?;
                Ok(Flow::Continue)
            }
            OperatorClass::Concat => {
                fileops::concat(line, out)?;
                out.flush()?;
                Ok(Flow::Continue)
            }
            OperatorClass::Redirect => {
                let outcome = RedirectionSpec::parse(line)?.run(io)?;
                report_status(outcome, out)?;
                Ok(Flow::Continue)
            }
            OperatorClass::Sequential => {
                let list = SequentialList::parse(line)?;
                let report = chain::run_sequential(&list, io)?;
                self.finish_chain(report, false, out)
            }
            OperatorClass::Conditional => {
                let chain = ConditionalChain::parse(line)?;
                let report = chain::run_conditional(&chain, io)?;
                self.finish_chain(report, true, out)
            }
            OperatorClass::Plain => match Command::parse(line)? {
                Command::Builtin(builtin) => self.builtin(builtin, out),
                Command::External(args) => {
                    let outcome = launcher::run(&args, io, &[])?;
                    report_status(outcome, out)?;
                    Ok(Flow::Continue)
                }
            },
        }
    }

    fn pipeline(&self, line: &str, direction: Direction, io: Streams<'_>) -> ShellResult<Flow> {
        let topology = PipelineTopology::parse(line, direction)?;
        let run = run_pipeline(&topology, io)?;
        debug!("spawn order {:?}", run.spawn_order);
        for exit in &run.exits {
            debug!("stage {} (pid {}): {:?}", exit.index, exit.pid, exit.outcome);
        }
        Ok(Flow::Continue)
    }

    fn finish_chain(&self, report: ChainReport, show_status: bool, out: &mut dyn Write) -> ShellResult<Flow> {
        if show_status {
            for (_, outcome) in report.ran() {
                report_chain_status(outcome, out)?;
            }
        }
        match report.builtin {
            Some(builtin) => self.builtin(builtin, out),
            None => Ok(Flow::Continue),
        }
    }

    fn builtin(&self, builtin: Builtin, out: &mut dyn Write) -> ShellResult<Flow> {
        match builtin {
            Builtin::Exit => {
                writeln!(out, "Goodbye!")?;
            }
            Builtin::KillAll => {
                let report =
                    procdir::broadcast_terminate(self.directory.as_ref(), &self.process_name, Pid::this())?;
                info!(
                    "broadcast to `{}`: {} terminated, {} failed",
                    self.process_name,
                    report.terminated.len(),
                    report.failed.len()
                );
                writeln!(out, "Terminated {} other shell processes", report.terminated.len())?;
            }
        }
        Ok(Flow::Exit)
    }
}

fn report_status(outcome: ExitOutcome, out: &mut dyn Write) -> io::Result<()> {
    match outcome {
        ExitOutcome::Success => Ok(()),
        ExitOutcome::Failure(code) => writeln!(out, "Command exited with status {}", code),
        ExitOutcome::Abnormal(signal) => writeln!(out, "Command terminated by {}", signal),
    }
}

/// Every command of a conditional chain reports, successful or not.
fn report_chain_status(outcome: ExitOutcome, out: &mut dyn Write) -> io::Result<()> {
    match outcome {
        ExitOutcome::Success => writeln!(out, "Command exited with status 0 (success)"),
        ExitOutcome::Failure(code) => writeln!(out, "Command exited with status {} (failure)", code),
        ExitOutcome::Abnormal(signal) => {
            writeln!(out, "Command terminated by {} - considered failed", signal)
        }
    }
}

pub struct Shell {
    prompt: Prompt,
    history: History,
    editor: LineEditor,
    evaluator: Evaluator,
    color: bool,
    running: bool,
}

impl Shell {
    pub fn new(config: &Config) -> Self {
        Self {
            prompt: Prompt::new(&config.prompt),
            history: History::new(config.history_path(), config.history.max_entries),
            editor: LineEditor::new(),
            evaluator: Evaluator::new(Box::new(Pgrep), config.process_name()),
            color: config.prompt.color,
            running: true,
        }
    }

    /// Run a single line, as for `-c`. Returns the process exit code.
    pub fn execute_once(&mut self, line: &str) -> i32 {
        self.execute(line).map_or(1, |_| 0)
    }

    /// `None` when the line failed; the error has been reported.
    fn execute(&mut self, line: &str) -> Option<Flow> {
        let mut stdout = io::stdout();
        let result = self.evaluator.execute_line(line, Streams::default(), &mut stdout);
        let _ = stdout.flush();
        match result {
            Ok(flow) => Some(flow),
            Err(e) => {
                warn!("`{}`: {}", line.trim(), e);
                let message = format!("pipesh: {}", e);
                if self.color {
                    eprintln!("{}", message.red());
                } else {
                    eprintln!("{}", message);
                }
                None
            }
        }
    }

    pub fn run(&mut self) {
        signal_handler::ignore_interactive_signals();
        info!(
            "shell started (pid {}, {} history entries)",
            Pid::this(),
            self.history.entry_count()
        );

        while self.running {
            let prompt = self.prompt.get_string();
            match self.editor.read_line(&prompt, &mut self.history) {
                Ok(Some(input)) => {
                    let trimmed = input.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.history.add(trimmed);
                    if let Some(Flow::Exit) = self.execute(&input) {
                        self.running = false;
                    }
                }
                Ok(None) => self.running = false,
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    break;
                }
            }
        }

        info!("shell exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::os::fd::AsFd;
    use std::rc::Rc;

    use nix::sys::signal::Signal;
    use tempfile::NamedTempFile;

    use crate::error::{FileOpError, ShellError};

    #[derive(Default)]
    struct FakeDirectory {
        pids: Vec<i32>,
        signalled: Rc<RefCell<Vec<Pid>>>,
    }

    impl ProcessDirectory for FakeDirectory {
        fn find(&self, _name: &str) -> io::Result<Vec<Pid>> {
            Ok(self.pids.iter().copied().map(Pid::from_raw).collect())
        }

        fn signal(&self, pid: Pid, _signal: Signal) -> nix::Result<()> {
            self.signalled.borrow_mut().push(pid);
            Ok(())
        }
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(Box::new(FakeDirectory::default()), "pipesh".to_string())
    }

    /// Child output and shell output of one line.
    fn exec(ev: &Evaluator, line: &str) -> (ShellResult<Flow>, String, String) {
        let sink = NamedTempFile::new().unwrap();
        let io = Streams {
            stdin: None,
            stdout: Some(sink.as_file().as_fd()),
        };
        let mut out = Vec::new();
        let result = ev.execute_line(line, io, &mut out);
        let child = fs::read_to_string(sink.path()).unwrap();
        (result, child, String::from_utf8(out).unwrap())
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let (result, child, shell) = exec(&evaluator(), "   ");
        assert_eq!(result.unwrap(), Flow::Continue);
        assert!(child.is_empty() && shell.is_empty());
    }

    #[test]
    fn over_long_input_is_rejected() {
        let line = format!("echo {}", "x".repeat(MAX_INPUT));
        let (result, child, _) = exec(&evaluator(), &line);
        assert!(matches!(
            result,
            Err(ShellError::Parse(ParseError::InputTooLong { limit: MAX_INPUT }))
        ));
        assert!(child.is_empty());
    }

    #[test]
    fn forward_and_reverse_pipelines() {
        let ev = evaluator();
        let (_, fwd, _) = exec(&ev, "echo hello | tr a-z A-Z | tr H J");
        let (_, rev, _) = exec(&ev, "echo hello = tr a-z A-Z = tr H J");
        assert_eq!(fwd, "JELLO\n");
        assert_eq!(rev, fwd);
    }

    #[test]
    fn too_many_stages_spawn_nothing() {
        let (result, child, _) = exec(&evaluator(), "echo a|cat|cat|cat|cat|cat|cat");
        assert!(matches!(
            result,
            Err(ShellError::Parse(ParseError::TooManySegments { found: 7, limit: 6 }))
        ));
        assert!(child.is_empty());
    }

    #[test]
    fn conditional_reports_every_command_that_ran() {
        let ev = evaluator();
        let (result, child, shell) = exec(&ev, "false || echo X");
        assert_eq!(result.unwrap(), Flow::Continue);
        assert_eq!(child, "X\n");
        assert_eq!(
            shell,
            "Command exited with status 1 (failure)\nCommand exited with status 0 (success)\n"
        );

        let (_, child, shell) = exec(&ev, "true && echo Y");
        assert_eq!(child, "Y\n");
        assert_eq!(shell.lines().count(), 2);
        assert!(shell.lines().all(|l| l.ends_with("(success)")));
    }

    #[test]
    fn skipped_links_do_not_report() {
        let (_, child, shell) = exec(&evaluator(), "false && echo never");
        assert!(child.is_empty());
        assert_eq!(shell, "Command exited with status 1 (failure)\n");
    }

    #[test]
    fn sequential_discards_statuses() {
        let (_, child, shell) = exec(&evaluator(), "false ; echo A ; ; echo B");
        assert_eq!(child, "A\nB\n");
        assert!(shell.is_empty());
    }

    #[test]
    fn plain_command_reports_nonzero_exit() {
        let ev = evaluator();
        let (_, _, shell) = exec(&ev, "false");
        assert_eq!(shell, "Command exited with status 1\n");
        let (_, child, shell) = exec(&ev, "echo fine");
        assert_eq!(child, "fine\n");
        assert!(shell.is_empty());
    }

    #[test]
    fn redirection_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let ev = evaluator();
        exec(&ev, &format!("echo hi > {}", target.display())).0.unwrap();
        exec(&ev, &format!("echo bye >> {}", target.display())).0.unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hi\nbye\n");
    }

    #[test]
    fn word_count_and_concat_print_to_shell_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "one two three\n").unwrap();
        fs::write(&b, "four\n").unwrap();
        let ev = evaluator();

        let (_, _, shell) = exec(&ev, &format!("# {}", a.display()));
        assert_eq!(shell, format!("Number of words in {}: 3\n", a.display()));

        let (_, _, shell) = exec(&ev, &format!("{} + {}", a.display(), b.display()));
        assert_eq!(shell, "one two three\nfour\n");
    }

    #[test]
    fn file_operator_errors_surface() {
        let (result, _, _) = exec(&evaluator(), "# notes.md");
        assert!(matches!(result, Err(ShellError::FileOp(FileOpError::NotText(_)))));
    }

    #[test]
    fn exit_builtins() {
        let ev = evaluator();
        assert_eq!(exec(&ev, "killterm").0.unwrap(), Flow::Exit);
        assert_eq!(exec(&ev, "exit").0.unwrap(), Flow::Exit);
        let (flow, child, _) = exec(&ev, "echo before ; killterm ; echo after");
        assert_eq!(flow.unwrap(), Flow::Exit);
        assert_eq!(child, "before\n");
    }

    #[test]
    fn killallterms_signals_others_then_exits() {
        let signalled = Rc::new(RefCell::new(Vec::new()));
        let own = Pid::this().as_raw();
        let directory = FakeDirectory {
            pids: vec![own, 4242, 4343],
            signalled: Rc::clone(&signalled),
        };
        let ev = Evaluator::new(Box::new(directory), "pipesh".to_string());

        let (flow, _, shell) = exec(&ev, "killallterms");
        assert_eq!(flow.unwrap(), Flow::Exit);
        assert_eq!(shell, "Terminated 2 other shell processes\n");
        assert_eq!(
            *signalled.borrow(),
            vec![Pid::from_raw(4242), Pid::from_raw(4343)]
        );
    }
}
