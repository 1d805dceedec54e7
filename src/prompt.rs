use std::env;

use colored::Colorize;

use crate::config::PromptConfig;

pub struct Prompt {
    symbol: String,
    identity: Option<String>,
    color: bool,
}

impl Prompt {
    pub fn new(config: &PromptConfig) -> Self {
        let identity = config.show_identity.then(|| {
            let host = whoami::fallible::hostname().unwrap_or_else(|_| String::from("localhost"));
            format!("{}@{}", whoami::username(), host)
        });

        Self {
            symbol: config.symbol.clone(),
            identity,
            color: config.color,
        }
    }

    pub fn get_string(&self) -> String {
        let cwd = env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| String::from("?"));

        match (&self.identity, self.color) {
            (Some(id), true) => format!("{} {} {} ", id.green().bold(), cwd.blue(), self.symbol),
            (Some(id), false) => format!("{} {} {} ", id, cwd, self.symbol),
            (None, true) => format!("{} {} ", cwd.blue(), self.symbol),
            (None, false) => format!("{} {} ", cwd, self.symbol),
        }
    }
}
