use super::command_registry::{
    CommandSpec, ASPECT_COMMAND, NO_ARG_COMMANDS, PROMPT_COMMAND, SLOT_ARG_COMMANDS,
    UPLOAD_COMMANDS,
};
use crate::prompt::AspectRatio;
use crate::slots::Slot;

/// One workbench interaction parsed from a line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Noop,
    Upload { slot: Slot, path: String },
    Remove(Slot),
    Include(Slot),
    Exclude(Slot),
    SetAspectRatio(AspectRatio),
    SetPrompt(String),
    Generate,
    /// Plain text: replace the prompt and submit.
    PromptAndGenerate(String),
    Status,
    Help,
    Quit,
    Invalid { command: String, message: String },
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

fn invalid(command: &str, message: impl Into<String>) -> Command {
    Command::Invalid {
        command: command.to_string(),
        message: message.into(),
    }
}

pub fn parse_command(text: &str) -> Command {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Command::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return Command::PromptAndGenerate(raw_trimmed.to_string());
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return Command::PromptAndGenerate(raw_trimmed.to_string());
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if UPLOAD_COMMANDS.contains(&command.as_str()) {
        let path = parse_single_path_arg(arg);
        if path.is_empty() {
            return invalid(&command, format!("/{command} requires a file path"));
        }
        return match command.parse::<Slot>() {
            Ok(slot) => Command::Upload { slot, path },
            Err(message) => invalid(&command, message),
        };
    }

    if let Some(action) = find_action(&command, SLOT_ARG_COMMANDS) {
        let slot = match arg.parse::<Slot>() {
            Ok(slot) => slot,
            Err(message) => return invalid(&command, message),
        };
        return match action {
            "remove" => Command::Remove(slot),
            "include" => Command::Include(slot),
            _ => Command::Exclude(slot),
        };
    }

    if command == ASPECT_COMMAND {
        return match arg.parse::<AspectRatio>() {
            Ok(ratio) => Command::SetAspectRatio(ratio),
            Err(message) => invalid(&command, message),
        };
    }

    if command == PROMPT_COMMAND {
        if arg.is_empty() {
            return invalid(&command, "/prompt requires text");
        }
        return Command::SetPrompt(arg.to_string());
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return match action {
            "generate" => Command::Generate,
            "status" => Command::Status,
            "help" => Command::Help,
            _ => Command::Quit,
        };
    }

    Command::Unknown {
        command,
        arg: arg.to_string(),
    }
}
