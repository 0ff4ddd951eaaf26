//! Parsing of stdin lines into chat commands.

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// Plain text to send to the room.
    Say(String),
    Login { username: String, token: String },
    Logout,
    Retry,
    Quit,
    Help,
    /// A `/word` that is not a command, or a command with bad arguments.
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  /login USER [TOKEN]  switch to another identity
  /logout              leave the room
  /retry               retry a failed history load
  /quit                leave and exit
anything else is sent to the room";

pub fn parse_line(line: &str) -> InputCommand {
    let trimmed = line.trim_start();
    // `//text` sends "/text" literally.
    if let Some(rest) = trimmed.strip_prefix("//") {
        return InputCommand::Say(format!("/{}", rest));
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return InputCommand::Say(line.to_string());
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match (name, args.as_slice()) {
        ("login", [username]) => InputCommand::Login {
            username: username.to_string(),
            token: String::new(),
        },
        ("login", [username, token]) => InputCommand::Login {
            username: username.to_string(),
            token: token.to_string(),
        },
        ("login", _) => InputCommand::Invalid("usage: /login USER [TOKEN]".to_string()),
        ("logout", []) => InputCommand::Logout,
        ("retry", []) => InputCommand::Retry,
        ("quit" | "exit", []) => InputCommand::Quit,
        ("help", []) => InputCommand::Help,
        (name, _) => InputCommand::Invalid(format!("unknown command: /{} (try /help)", name)),
    }
}
