//! REPL – the Peach memory console.
//!
//! Plain lines are captured as user messages.  Supported slash-commands:
//!   /help              – show this list
//!   /mood              – current and blended mood, with a self-reflection
//!   /style             – response style the mood currently suggests
//!   /reflect [mood]    – reflect on memories linked to a mood
//!   /muse              – speak aloud about a recent memory
//!   /enrich            – ask the model for extra tags on recent memories
//!   /memories          – recent episodic memories
//!   /history           – recent chat turns
//!   /recall <query>    – semantically closest memories
//!   /forget <keyword>  – delete memories mentioning a keyword
//!   /prune             – delete faded memories
//!   /cleanup <days>    – delete everything older than <days> days
//!   /days              – memories grouped by day
//!   /story             – the life story so far
//!   /quit | /exit      – leave the console

use colored::Colorize;
use peach_memory::{DeleteFilter, MemoryOrchestrator, Period};
use peach_types::{PeachError, Role, display_time};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Help,
    Mood,
    Style,
    Reflect(Option<String>),
    Muse,
    Enrich,
    Memories,
    History,
    Recall(String),
    Forget(String),
    Prune,
    Cleanup(u64),
    Days,
    Story,
    Quit,
    Unknown(String),
}

/// Parse a console line.  Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Say(line.to_string()));
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let cmd = match (head, arg) {
        ("/help", _) => Command::Help,
        ("/mood", _) => Command::Mood,
        ("/style", _) => Command::Style,
        ("/reflect", mood) => Command::Reflect(mood.map(|m| m.to_lowercase())),
        ("/muse", _) => Command::Muse,
        ("/enrich", _) => Command::Enrich,
        ("/memories", _) => Command::Memories,
        ("/history", _) => Command::History,
        ("/recall", Some(query)) => Command::Recall(query),
        ("/forget", Some(keyword)) => Command::Forget(keyword),
        ("/prune", _) => Command::Prune,
        ("/cleanup", Some(days)) => match days.parse::<u64>() {
            Ok(days) => Command::Cleanup(days),
            Err(_) => Command::Unknown(line.to_string()),
        },
        ("/days", _) => Command::Days,
        ("/story", _) => Command::Story,
        ("/quit" | "/exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(cmd)
}

/// Entry point for the interactive console.  Returns when the user quits,
/// presses Ctrl-C / Ctrl-D, or the terminal fails.
pub fn run(memory: &mut MemoryOrchestrator) -> Result<(), PeachError> {
    let mut editor =
        DefaultEditor::new().map_err(|e| PeachError::Config(format!("terminal unavailable: {e}")))?;

    loop {
        let line = match editor.readline(&format!("{} ", "peach>".bold().magenta())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "console read failed");
                break;
            }
        };
        let Some(cmd) = parse(&line) else { continue };
        if let Err(e) = editor.add_history_entry(line.as_str()) {
            warn!(error = %e, "failed to record console history");
        }

        match cmd {
            Command::Quit => break,
            Command::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
            Command::Help => print_help(),
            cmd => println!("{}", respond(memory, &cmd)),
        }
    }

    println!("{}", "Goodbye.".green());
    Ok(())
}

/// Plain-text response for a memory command.
pub fn respond(memory: &mut MemoryOrchestrator, cmd: &Command) -> String {
    match cmd {
        Command::Say(text) => say(memory, text),
        Command::Mood => {
            let current = memory.current_mood();
            let blended = memory.blended_mood();
            let reflection = memory.emotion().lock().self_reflect(false);
            format!("mood: {current} (blend: {blended})\n{reflection}")
        }
        Command::Style => format!("style: {}", memory.response_style(None)),
        Command::Reflect(mood) => memory.reflect(mood.as_deref()),
        Command::Muse => memory.self_dialogue(),
        Command::Enrich => format!("enriched {} memories", memory.manual_reflect()),
        Command::Memories => {
            let recalled = memory.hybrid_recall(None);
            if recalled.episodic.is_empty() {
                return "no memories yet".to_string();
            }
            recalled
                .episodic
                .iter()
                .map(|r| {
                    format!(
                        "#{} {} [{}] {} (mood: {}, importance: {:.2}, tags: {})",
                        r.id.unwrap_or_default(),
                        r.time,
                        r.category.as_str(),
                        r.content,
                        r.mood,
                        r.importance,
                        r.tags.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::History => {
            let chat = memory.recall();
            if chat.is_empty() {
                return "no conversation yet".to_string();
            }
            chat.iter()
                .map(|e| format!("[{}] {}: {}", display_time(e.timestamp), e.role.as_str(), e.content))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Recall(query) => {
            let hits = memory.hybrid_recall(Some(query)).semantic;
            if hits.is_empty() {
                return format!("nothing comes to mind for '{query}'");
            }
            hits.iter()
                .map(|c| format!("• {c}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Forget(keyword) => {
            match memory.forget(&DeleteFilter::Keyword(keyword.clone())) {
                Ok(n) => format!("forgot {n} memories mentioning '{keyword}'"),
                Err(e) => format!("could not forget: {e}"),
            }
        }
        Command::Prune => match memory.prune_faded() {
            Ok(n) => format!("pruned {n} faded memories"),
            Err(e) => format!("could not prune: {e}"),
        },
        Command::Cleanup(days) => {
            let cutoff = memory.now() - *days as f64 * 86_400.0;
            match memory.cleanup_older_than(cutoff) {
                Ok(report) => format!(
                    "cleaned up {} memories and {} chat turns older than {days} days",
                    report.episodic_removed.len(),
                    report.chat_removed
                ),
                Err(e) => format!("could not clean up: {e}"),
            }
        }
        Command::Days => {
            let days = memory.timeline(Period::Day);
            if days.is_empty() {
                return "no memories yet".to_string();
            }
            days.iter()
                .map(|(day, records)| format!("{day}: {} memories", records.len()))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Story => memory.life_story(),
        Command::Help | Command::Quit | Command::Unknown(_) => String::new(),
    }
}

fn say(memory: &mut MemoryOrchestrator, text: &str) -> String {
    let outcome = memory.capture(Role::User, text, None);
    let mut lines = Vec::new();
    match &outcome.episodic {
        Some(r) => lines.push(format!(
            "remembered #{} [{}] importance {:.2}, tags: {}",
            r.id.unwrap_or_default(),
            r.category.as_str(),
            r.importance,
            r.tags.join(", ")
        )),
        None => lines.push("noted".to_string()),
    }
    if let Some(trigger) = outcome.trigger {
        lines.push(format!(
            "reflection ({}): enriched {} memories",
            trigger.as_str(),
            outcome.enriched
        ));
    }
    lines.push(format!("mood: {}", memory.current_mood()));
    lines.join("\n")
}

fn print_help() {
    println!();
    println!("{}", "Peach Commands".bold().underline());
    let rows = [
        ("/mood", "current and blended mood"),
        ("/style", "suggested response style"),
        ("/reflect [mood]", "reflect on memories linked to a mood"),
        ("/muse", "speak aloud about a recent memory"),
        ("/enrich", "ask the model for extra tags"),
        ("/memories", "recent episodic memories"),
        ("/history", "recent chat turns"),
        ("/recall <query>", "semantically closest memories"),
        ("/forget <keyword>", "delete memories mentioning a keyword"),
        ("/prune", "delete faded memories"),
        ("/cleanup <days>", "delete everything older than <days> days"),
        ("/days", "memories grouped by day"),
        ("/story", "the life story so far"),
        ("/quit  /exit", "leave the console"),
    ];
    for (cmd, what) in rows {
        println!("  {:<18} – {}", cmd.bold().cyan(), what);
    }
    println!("  Anything else is remembered as something you said.");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
