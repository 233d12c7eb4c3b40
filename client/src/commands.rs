//! Parsing of interactive commands into protocol messages.

use shared::{Message, MessageType};

/// One line of user input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    ListPlayers,
    ListGames,
    Challenge(String),
    Accept(String),
    Refuse(String),
    Move { session: Option<u32>, hole: usize },
    GiveUp { session: Option<u32> },
    SessionChat { session: Option<u32>, text: String },
    PrivateChat { to: String, text: String },
    Spectate(u32),
    SpectateLeave(u32),
    TogglePrivate,
    BioView(Option<String>),
    BioEdit(String),
    Friends,
    AddFriend(String),
    RemoveFriend(String),
    AcceptFriend(String),
    RefuseFriend(String),
    Quit,
}

pub const HELP: &str = "\
Commands:
  list                      connected players
  games                     running games
  challenge <name>          challenge a player
  accept <name>             accept a pending challenge
  refuse <name>             refuse a pending challenge
  move [<session>] <hole>   sow from a hole (session optional with one game)
  give up [<session>]       concede the game
  chat [<session>] <text>   chat with everyone at the table
  msg <name> <text>         private message
  spectate <session>        watch a game
  spectate leave <session>  stop watching
  private                   toggle whether your games can be watched
  bio view [<name>]         show a bio (yours by default)
  bio edit <text>           set your bio
  friends                   list your friends
  addfriend <name>          send a friend request
  acceptfriend <name>       accept a friend request
  refusefriend <name>       refuse a friend request
  quit                      leave the server";

fn one_name<F>(words: &[&str], build: F) -> Result<Command, String>
where
    F: FnOnce(String) -> Command,
{
    match words {
        [name] => Ok(build((*name).to_string())),
        _ => Err("Expected exactly one player name".to_string()),
    }
}

fn parse_session(word: &str) -> Result<u32, String> {
    word.parse()
        .map_err(|_| format!("Invalid session id '{}'", word))
}

/// Parses one input line. The error is a message for the user.
pub fn parse(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let (verb, rest) = match words.split_first() {
        Some(split) => split,
        None => return Err("Empty command (try 'help')".to_string()),
    };

    match *verb {
        "help" => Ok(Command::Help),
        "list" => Ok(Command::ListPlayers),
        "games" => Ok(Command::ListGames),
        "challenge" => one_name(rest, Command::Challenge),
        "accept" => one_name(rest, Command::Accept),
        "refuse" => one_name(rest, Command::Refuse),
        "move" => match rest {
            [hole] => Ok(Command::Move {
                session: None,
                hole: hole.parse().map_err(|_| "Invalid hole".to_string())?,
            }),
            [session, hole] => Ok(Command::Move {
                session: Some(parse_session(session)?),
                hole: hole.parse().map_err(|_| "Invalid hole".to_string())?,
            }),
            _ => Err("Usage: move [<session>] <hole>".to_string()),
        },
        "give" => match rest {
            ["up"] => Ok(Command::GiveUp { session: None }),
            ["up", session] => Ok(Command::GiveUp {
                session: Some(parse_session(session)?),
            }),
            _ => Err("Usage: give up [<session>]".to_string()),
        },
        "chat" => match rest {
            [] => Err("Usage: chat [<session>] <text>".to_string()),
            [first, text @ ..] => match first.parse::<u32>() {
                Ok(session) if !text.is_empty() => Ok(Command::SessionChat {
                    session: Some(session),
                    text: text.join(" "),
                }),
                _ => Ok(Command::SessionChat {
                    session: None,
                    text: rest.join(" "),
                }),
            },
        },
        "msg" => match rest {
            [to, text @ ..] if !text.is_empty() => Ok(Command::PrivateChat {
                to: (*to).to_string(),
                text: text.join(" "),
            }),
            _ => Err("Usage: msg <name> <text>".to_string()),
        },
        "spectate" => match rest {
            [session] => Ok(Command::Spectate(parse_session(session)?)),
            ["leave", session] => Ok(Command::SpectateLeave(parse_session(session)?)),
            _ => Err("Usage: spectate [leave] <session>".to_string()),
        },
        "private" => Ok(Command::TogglePrivate),
        "bio" => match rest {
            ["view"] => Ok(Command::BioView(None)),
            ["view", name] => Ok(Command::BioView(Some((*name).to_string()))),
            ["edit", text @ ..] => Ok(Command::BioEdit(text.join(" "))),
            _ => Err("Usage: bio view [<name>] | bio edit <text>".to_string()),
        },
        "friends" => Ok(Command::Friends),
        "addfriend" => one_name(rest, Command::AddFriend),
        "rmfriend" => one_name(rest, Command::RemoveFriend),
        "acceptfriend" => one_name(rest, Command::AcceptFriend),
        "refusefriend" => one_name(rest, Command::RefuseFriend),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command '{}' (try 'help')", other)),
    }
}

fn session_field(explicit: Option<u32>, current: Option<u32>) -> String {
    explicit
        .or(current)
        .map(|id| id.to_string())
        .unwrap_or_default()
}

impl Command {
    /// Turns the command into the message to send, or `None` for commands
    /// handled entirely on the client (`help`, `quit`). `current` is the
    /// session the client last heard from, used when none was typed.
    pub fn to_message(&self, me: &str, current: Option<u32>) -> Option<Message> {
        match self {
            Command::Help | Command::Quit => None,
            Command::ListPlayers => Some(Message::new(MessageType::ListPlayers, me, "", "")),
            Command::ListGames => Some(Message::new(MessageType::ListGames, me, "", "")),
            Command::Challenge(name) => Some(Message::challenge(me, name)),
            Command::Accept(name) => {
                Some(Message::new(MessageType::ChallengeAccept, me, name, ""))
            }
            Command::Refuse(name) => {
                Some(Message::new(MessageType::ChallengeRefuse, me, name, ""))
            }
            Command::Move { session, hole } => Some(Message::play_move(
                me,
                &session_field(*session, current),
                *hole,
            )),
            Command::GiveUp { session } => Some(Message::new(
                MessageType::GiveUp,
                me,
                &session_field(*session, current),
                "",
            )),
            Command::SessionChat { session, text } => Some(Message::session_chat(
                me,
                &session_field(*session, current),
                text,
            )),
            Command::PrivateChat { to, text } => Some(Message::private_chat(me, to, text)),
            Command::Spectate(session) => Some(Message::new(
                MessageType::Spectate,
                me,
                "",
                &session.to_string(),
            )),
            Command::SpectateLeave(session) => Some(Message::new(
                MessageType::Spectate,
                me,
                "",
                &format!("leave {}", session),
            )),
            Command::TogglePrivate => Some(Message::new(MessageType::SetPrivate, me, "", "")),
            Command::BioView(name) => Some(Message::new(
                MessageType::BioView,
                me,
                name.as_deref().unwrap_or(""),
                "",
            )),
            Command::BioEdit(text) => Some(Message::new(MessageType::BioEdit, me, "", text)),
            Command::Friends => Some(Message::new(MessageType::ListFriends, me, "", "")),
            Command::AddFriend(name) => Some(Message::new(MessageType::AddFriend, me, name, "")),
            Command::RemoveFriend(name) => {
                Some(Message::new(MessageType::RemoveFriend, me, name, ""))
            }
            Command::AcceptFriend(name) => {
                Some(Message::new(MessageType::FriendRequestAccept, me, name, ""))
            }
            Command::RefuseFriend(name) => {
                Some(Message::new(MessageType::FriendRequestRefuse, me, name, ""))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_verbs() {
        assert_eq!(parse("help"), Ok(Command::Help));
        assert_eq!(parse("list"), Ok(Command::ListPlayers));
        assert_eq!(parse("games"), Ok(Command::ListGames));
        assert_eq!(parse("quit"), Ok(Command::Quit));
        assert_eq!(parse("friends"), Ok(Command::Friends));
        assert_eq!(parse("private"), Ok(Command::TogglePrivate));
    }

    #[test]
    fn names_are_required_where_expected() {
        assert_eq!(parse("challenge bob"), Ok(Command::Challenge("bob".into())));
        assert!(parse("challenge").is_err());
        assert!(parse("challenge a b").is_err());
        assert_eq!(parse("addfriend eve"), Ok(Command::AddFriend("eve".into())));
    }

    #[test]
    fn move_with_and_without_session() {
        assert_eq!(
            parse("move 3"),
            Ok(Command::Move {
                session: None,
                hole: 3
            })
        );
        assert_eq!(
            parse("move 7 3"),
            Ok(Command::Move {
                session: Some(7),
                hole: 3
            })
        );
        assert!(parse("move x").is_err());
        assert!(parse("move").is_err());
    }

    #[test]
    fn give_up_needs_the_word_up() {
        assert_eq!(parse("give up"), Ok(Command::GiveUp { session: None }));
        assert_eq!(
            parse("give up 2"),
            Ok(Command::GiveUp { session: Some(2) })
        );
        assert!(parse("give").is_err());
    }

    #[test]
    fn chat_leading_number_is_a_session_id() {
        assert_eq!(
            parse("chat 4 nice capture"),
            Ok(Command::SessionChat {
                session: Some(4),
                text: "nice capture".into()
            })
        );
        // A lone number is the whole message, not a session id.
        assert_eq!(
            parse("chat 42"),
            Ok(Command::SessionChat {
                session: None,
                text: "42".into()
            })
        );
        assert_eq!(
            parse("chat good game"),
            Ok(Command::SessionChat {
                session: None,
                text: "good game".into()
            })
        );
    }

    #[test]
    fn private_messages_carry_target_and_text() {
        assert_eq!(
            parse("msg bob see you at 8"),
            Ok(Command::PrivateChat {
                to: "bob".into(),
                text: "see you at 8".into()
            })
        );
        assert!(parse("msg bob").is_err());
    }

    #[test]
    fn spectate_and_leave() {
        assert_eq!(parse("spectate 5"), Ok(Command::Spectate(5)));
        assert_eq!(parse("spectate leave 5"), Ok(Command::SpectateLeave(5)));
        assert!(parse("spectate five").is_err());
    }

    #[test]
    fn bio_subcommands() {
        assert_eq!(parse("bio view"), Ok(Command::BioView(None)));
        assert_eq!(
            parse("bio view bob"),
            Ok(Command::BioView(Some("bob".into())))
        );
        assert_eq!(
            parse("bio edit I play fast"),
            Ok(Command::BioEdit("I play fast".into()))
        );
        assert!(parse("bio").is_err());
    }

    #[test]
    fn unknown_verb_is_reported() {
        let err = parse("dance").unwrap_err();
        assert!(err.contains("dance"));
    }

    #[test]
    fn session_defaults_to_current_game() {
        let cmd = Command::Move {
            session: None,
            hole: 2,
        };
        let msg = cmd.to_message("alice", Some(9)).unwrap();
        assert_eq!(msg.recipient, "9");
        assert_eq!(msg.data, "2");

        // An explicit id always wins over the tracked one.
        let cmd = Command::GiveUp { session: Some(1) };
        let msg = cmd.to_message("alice", Some(9)).unwrap();
        assert_eq!(msg.recipient, "1");

        let cmd = Command::SessionChat {
            session: None,
            text: "hi".into(),
        };
        let msg = cmd.to_message("alice", None).unwrap();
        assert_eq!(msg.recipient, "");
    }

    #[test]
    fn local_commands_produce_no_message() {
        assert!(Command::Help.to_message("alice", None).is_none());
        assert!(Command::Quit.to_message("alice", None).is_none());
    }
}
