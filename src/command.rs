use crate::error::ParseError;
use crate::tokenize::ArgList;

/// Commands the shell carries out itself instead of exec'ing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Terminate this shell only.
    Exit,
    /// Terminate every other instance of this shell, then this one.
    KillAll,
}

impl Builtin {
    pub fn lookup(program: &str) -> Option<Self> {
        match program {
            "killterm" | "exit" => Some(Builtin::Exit),
            "killallterms" => Some(Builtin::KillAll),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Builtin(Builtin),
    External(ArgList),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        ArgList::parse(input, 1).map(Self::from_args)
    }

    pub fn from_args(args: ArgList) -> Self {
        match Builtin::lookup(args.program()) {
            Some(builtin) => Command::Builtin(builtin),
            None => Command::External(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_builtins() {
        assert!(matches!(Command::parse("killterm"), Ok(Command::Builtin(Builtin::Exit))));
        assert!(matches!(Command::parse(" exit "), Ok(Command::Builtin(Builtin::Exit))));
        assert!(matches!(
            Command::parse("killallterms"),
            Ok(Command::Builtin(Builtin::KillAll))
        ));
    }

    #[test]
    fn everything_else_is_external() {
        match Command::parse("ls -la /tmp").unwrap() {
            Command::External(args) => assert_eq!(args.words(), &["ls", "-la", "/tmp"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn builtin_name_only_matches_as_program() {
        assert!(matches!(Command::parse("echo exit"), Ok(Command::External(_))));
    }

    #[test]
    fn blank_input_is_an_error() {
        assert_eq!(
            Command::parse("   ").unwrap_err(),
            ParseError::EmptyCommand { position: 1 }
        );
    }
}
