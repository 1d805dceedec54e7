use std::env;
use std::process;

mod chain;
mod channel;
mod command;
mod config;
mod editor;
mod error;
mod fileops;
mod history;
mod launcher;
mod logging;
mod pipes;
mod procdir;
mod prompt;
mod redirects;
mod shell;
mod signal_handler;
mod tokenize;
mod topology;

fn print_help() {
    println!("pipesh - pipeline shell");
    println!();
    println!("Usage: pipesh [OPTIONS]");
    println!("  -h, --help       Print this help");
    println!("  -v, --version    Print version");
    println!("  -c <line>        Execute one line and exit");
    println!();
    println!("Operators: | = ~ # + < > >> ; && ||");
    println!("Built-ins: killterm, exit, killallterms");
}

fn print_version() {
    println!("pipesh v {}", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // answer the informational flags before touching config or the terminal
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        process::exit(0);
    }

    if args.iter().any(|a| a == "-v" || a == "--version" || a == "-V") {
        print_version();
        process::exit(0);
    }

    let config = config::Config::load();
    logging::init(&config);

    let mut shell = shell::Shell::new(&config);

    if let Some(pos) = args.iter().position(|a| a == "-c") {
        let Some(line) = args.get(pos + 1) else {
            eprintln!("pipesh: -c requires an argument");
            process::exit(2);
        };
        process::exit(shell.execute_once(line));
    }

    shell.run();
}
