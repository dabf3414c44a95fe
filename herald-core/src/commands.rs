// ABOUTME: Slash-command parsing for the subscribe/unsubscribe bot commands
// ABOUTME: Recognizes /start and /stop (optionally addressed as /cmd@BotName)

use std::fmt;

/// Commands the bot reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotCommand {
    /// Subscribe and receive the welcome message
    Start,
    /// Opt out of broadcasts
    Stop,
}

impl BotCommand {
    pub fn name(self) -> &'static str {
        match self {
            BotCommand::Start => "start",
            BotCommand::Stop => "stop",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(BotCommand::Start),
            "stop" => Some(BotCommand::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Result of parsing an inbound message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// A recognized command with whatever text followed it
    Command { command: BotCommand, payload: String },
    /// Not a command for this bot
    Ignore,
}

impl ParseResult {
    pub fn is_command(&self) -> bool {
        matches!(self, ParseResult::Command { .. })
    }

    pub fn command(&self) -> Option<BotCommand> {
        match self {
            ParseResult::Command { command, .. } => Some(*command),
            ParseResult::Ignore => None,
        }
    }
}

/// Parse a message body into a bot command.
///
/// Recognized forms:
/// - `/start`, `/stop`
/// - `/start <payload>` (deep-link payloads arrive this way)
/// - `/stop@BotName` when `bot_username` matches, case-insensitively
///
/// Command names are case-sensitive. Commands addressed to a different bot,
/// unknown commands, and plain text are ignored.
pub fn parse_message(body: &str, bot_username: Option<&str>) -> ParseResult {
    let trimmed = body.trim();

    let Some(after_slash) = trimmed.strip_prefix('/') else {
        return ParseResult::Ignore;
    };

    let mut parts = after_slash.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("");
    let payload = parts.next().map(str::trim).unwrap_or("").to_string();

    let name = match head.split_once('@') {
        Some((name, mention)) => {
            let addressed_to_us = bot_username
                .is_some_and(|username| username.eq_ignore_ascii_case(mention));
            if !addressed_to_us {
                return ParseResult::Ignore;
            }
            name
        }
        None => head,
    };

    match BotCommand::from_name(name) {
        Some(command) => ParseResult::Command { command, payload },
        None => ParseResult::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        assert_eq!(
            parse_message("/start", None),
            ParseResult::Command {
                command: BotCommand::Start,
                payload: String::new()
            }
        );
    }

    #[test]
    fn test_parse_start_with_payload() {
        assert_eq!(
            parse_message("/start  promo_42 ", None),
            ParseResult::Command {
                command: BotCommand::Start,
                payload: "promo_42".to_string()
            }
        );
    }

    #[test]
    fn test_parse_stop_surrounding_whitespace() {
        assert_eq!(parse_message("  /stop\n", None).command(), Some(BotCommand::Stop));
    }

    #[test]
    fn test_parse_addressed_to_this_bot() {
        let result = parse_message("/stop@KiddzoneBot", Some("kiddzonebot"));
        assert_eq!(result.command(), Some(BotCommand::Stop));
    }

    #[test]
    fn test_parse_addressed_to_other_bot() {
        assert!(!parse_message("/stop@OtherBot", Some("KiddzoneBot")).is_command());
        assert!(!parse_message("/stop@OtherBot", None).is_command());
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(parse_message("/STOP", None), ParseResult::Ignore);
        assert_eq!(parse_message("/Start", None), ParseResult::Ignore);
    }

    #[test]
    fn test_parse_ignores_plain_text_and_unknown_commands() {
        assert_eq!(parse_message("hello", None), ParseResult::Ignore);
        assert_eq!(parse_message("", None), ParseResult::Ignore);
        assert_eq!(parse_message("/", None), ParseResult::Ignore);
        assert_eq!(parse_message("/help", None), ParseResult::Ignore);
        assert_eq!(parse_message("start", None), ParseResult::Ignore);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(BotCommand::Start.to_string(), "/start");
        assert_eq!(BotCommand::Stop.to_string(), "/stop");
    }
}
