//! Line-oriented conversation loop.
//!
//! Protocol:
//! - Lines starting with `#` are commands (quit, mode, history, help)
//! - Every other non-empty line is one user turn
//! - Output lines are tagged `[SYMBIOSIS]`, `[ASK]`, `[ERROR]` and so on

use std::path::PathBuf;
use symbiosis_core::{
    ChatTurn, HttpMemoryStore, Pipeline, Session, SymbiosisConfig, TurnOutcome, TurnReply,
    TurnRequest,
};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

const DEFAULT_CONFIG: &str = "symbiosis.toml";

/// Command-line options.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleOptions {
    pub config_path: PathBuf,
    pub question_mode: bool,
    pub json: bool,
    pub help: bool,
}

impl ConsoleOptions {
    /// Parse options from the full argument list (program name first).
    pub fn from_args(args: &[String]) -> Self {
        let mut options = Self {
            config_path: PathBuf::from(DEFAULT_CONFIG),
            question_mode: false,
            json: false,
            help: false,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if let Some(path) = args.get(i + 1) {
                        options.config_path = PathBuf::from(path);
                        i += 1;
                    }
                }
                "--question-mode" => options.question_mode = true,
                "--json" => options.json = true,
                "--help" | "-h" => options.help = true,
                _ => {}
            }
            i += 1;
        }

        options
    }
}

/// A `#` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleMode,
    History,
    Help,
    Unknown(String),
}

impl Command {
    /// Parse a line, returning `None` when it is not a command.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('#')?;
        let name = rest.split_whitespace().next().unwrap_or("").to_lowercase();
        Some(match name.as_str() {
            "quit" | "exit" => Command::Quit,
            "mode" => Command::ToggleMode,
            "history" => Command::History,
            "help" => Command::Help,
            _ => Command::Unknown(name),
        })
    }
}

fn mode_name(question_mode: bool) -> &'static str {
    if question_mode {
        "interrogation"
    } else {
        "companion"
    }
}

/// Run the console until end of input or `#quit`.
pub async fn run_console(
    pipeline: &Pipeline<openrouter::OpenRouter, HttpMemoryStore>,
    config: &SymbiosisConfig,
    credential: String,
    options: ConsoleOptions,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut question_mode = options.question_mode || config.persona.question_mode;

    let mut session = pipeline.restore_session().await;

    println!("=== Symbiosis ===");
    println!("Identity: {}", config.persona.identity);
    println!("Models: {} / {}", config.generation.high_model, config.generation.low_model);
    println!("Mode: {}", mode_name(question_mode));
    println!("Restored turns: {}", session.history().len());
    println!();
    print_help();
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = Command::parse(line) {
            match command {
                Command::Quit => {
                    println!("Goodbye!");
                    break;
                }
                Command::ToggleMode => {
                    question_mode = !question_mode;
                    println!("[MODE] {}", mode_name(question_mode));
                }
                Command::History => print_history(&session),
                Command::Help => print_help(),
                Command::Unknown(_) => println!("[ERROR] Unknown command. Type #help for help."),
            }
            stdout.flush().await?;
            continue;
        }

        let request = TurnRequest::new(line, credential.as_str())
            .with_models(&config.generation.high_model, &config.generation.low_model)
            .with_question_mode(question_mode);

        stdout.write_all(b"[THINKING]").await?;
        stdout.flush().await?;

        let result = pipeline.process_turn(&mut session, &request).await;

        stdout.write_all(b"\r          \r").await?;
        stdout.flush().await?;

        match result {
            Ok(reply) => print_reply(&reply, options.json),
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    Ok(())
}

fn print_reply(reply: &TurnReply, json: bool) {
    if json {
        match serde_json::to_string(&reply.envelope()) {
            Ok(envelope) => println!("{envelope}"),
            Err(e) => println!("[ERROR] {e}"),
        }
        return;
    }

    let tag = match reply.outcome {
        TurnOutcome::Answered => "SYMBIOSIS",
        TurnOutcome::Clarifying => "ASK",
    };
    let mood = reply.tree.mood.map(|m| m.as_str()).unwrap_or("NEUTRAL");

    println!("[{tag}] ({mood})");
    println!("{}", reply.tree.response);
    for root in &reply.tree.roots {
        println!("  {} ({})", root.label, root.mood.as_str());
        for branch in &root.branches {
            println!("    {} ({}): {}", branch.label, branch.mood.as_str(), branch.leaves.join(", "));
        }
    }
    println!();
}

fn print_history(session: &Session) {
    println!("[HISTORY]");
    if session.history().is_empty() {
        println!("  (empty)");
    }
    for ChatTurn { role, content, timestamp } in session.history() {
        match timestamp {
            Some(ts) => println!("  {ts} {}: {content}", role.as_str().to_uppercase()),
            None => println!("  {}: {content}", role.as_str().to_uppercase()),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  #quit     - Exit");
    println!("  #mode     - Toggle companion / interrogation mode");
    println!("  #history  - Show the conversation so far");
    println!("  #help     - Show this help");
    println!("  (anything else is sent as a message)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_options() {
        let options = ConsoleOptions::from_args(&args(&["symbiosis"]));
        assert_eq!(options.config_path, PathBuf::from("symbiosis.toml"));
        assert!(!options.question_mode && !options.json && !options.help);
    }

    #[test]
    fn test_parse_options() {
        let options = ConsoleOptions::from_args(&args(&[
            "symbiosis",
            "--config",
            "/etc/symbiosis.toml",
            "--question-mode",
            "--json",
        ]));
        assert_eq!(options.config_path, PathBuf::from("/etc/symbiosis.toml"));
        assert!(options.question_mode);
        assert!(options.json);

        assert!(ConsoleOptions::from_args(&args(&["symbiosis", "-h"])).help);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("#quit"), Some(Command::Quit));
        assert_eq!(Command::parse("  #EXIT now"), Some(Command::Quit));
        assert_eq!(Command::parse("#mode"), Some(Command::ToggleMode));
        assert_eq!(Command::parse("#history"), Some(Command::History));
        assert_eq!(Command::parse("#dance"), Some(Command::Unknown("dance".to_string())));
        assert_eq!(Command::parse("My dad is eating spinach"), None);
    }
}
