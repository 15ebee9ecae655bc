use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"https?://[^\s<>]+").unwrap();
}

/// An operator instruction parsed out of a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Disconnect,
    Pause,
    Resume,
    Skip,
    Clear,
    Play { url: String },
}

/// Parse a message into a command. Most messages are just chat, so
/// unknown text is `None`, not an error.
pub fn parse(content: &str) -> Option<Command> {
    let trimmed = content.trim();

    match trimmed {
        "ping" => return Some(Command::Ping),
        "disconnect" => return Some(Command::Disconnect),
        _ => {}
    }

    // Playback controls match on prefix, so trailing chatter is fine.
    for (prefix, command) in [
        ("pause", Command::Pause),
        ("resume", Command::Resume),
        ("skip", Command::Skip),
        ("clear", Command::Clear),
    ] {
        if trimmed.starts_with(prefix) {
            return Some(command);
        }
    }

    // A bare "play" still parses, with an empty URL the bot can complain
    // about. "playful" and friends stay chat.
    if let Some(rest) = trimmed.strip_prefix("play") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(Command::Play {
                url: rest.trim().to_string(),
            });
        }
    }

    None
}

/// Every http(s) URL in a message, in order, each one once.
pub fn extract_urls(content: &str) -> Vec<&str> {
    URL_RE
        .find_iter(content)
        .map(|found| found.as_str())
        .unique()
        .collect()
}
