use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Empty the conversation
    Clear,
    /// Copy a bot reply to the clipboard
    Copy,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// 1-based reply number for `/copy <n>`; `Ok(None)` means "latest"
    pub fn copy_target(&self) -> Result<Option<usize>, String> {
        match self.argument().map(str::trim) {
            None | Some("") => Ok(None),
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(format!("'{arg}' is not a reply number")),
            },
        }
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Clear => "clear the conversation (Ctrl+L)",
            SlashCommand::Copy => "copy the latest reply, or reply <n> (Ctrl+Y)",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application (Ctrl+C)",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is outstanding.
    pub fn available_while_busy(self) -> bool {
        match self {
            SlashCommand::Clear => false,
            SlashCommand::Copy | SlashCommand::Help | SlashCommand::Bye => true,
        }
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "c" | "cls" | "reset" => Some(SlashCommand::Clear),
            "y" | "cp" => Some(SlashCommand::Copy),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Commands:");
    for entry in command_entries() {
        help.push_str(&format!("  /{} - {}", entry.keyword, entry.description));
    }
    help.push_str("  ·  Enter sends, Shift+Enter adds a line, PgUp/PgDn scroll");
    help
}
