//! Connection handling and the interactive loop: a reader task feeds
//! decoded server messages into a channel, and one `select!` alternates
//! between stdin lines and that channel.

use std::io;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};

use shared::{read_message, write_message, Message, MessageType};

use crate::commands::{self, Command, HELP};

pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    name: String,
}

impl Client {
    /// Connects and sends the login message. The server's verdict arrives
    /// as the first message of [`Client::run`].
    pub async fn connect(addr: &str, name: &str, secret: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        write_message(&mut writer, &Message::login(name, secret)).await?;
        Ok(Client {
            reader,
            writer,
            name: name.to_string(),
        })
    }

    pub async fn run(self) -> io::Result<()> {
        let Client {
            reader,
            mut writer,
            name,
        } = self;
        // The reader task owns the socket half: `read_message` buffers a
        // partially delivered record across polls, so it must never be
        // dropped mid-record by the other `select!` branch completing.
        let (incoming_tx, mut incoming_rx) = mpsc::unbounded_channel();
        tokio::spawn(reader_task(reader, incoming_tx));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        // The session the client last heard from; lets the user type bare
        // `move`/`chat`/`give up` while in a single game.
        let mut current_session: Option<u32> = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            let done = handle_line(
                                line.trim(),
                                &name,
                                current_session,
                                &mut writer,
                            )
                            .await?;
                            if done {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = incoming_rx.recv() => {
                    match incoming {
                        Some(message) => display(&message?, &mut current_session),
                        None => {
                            println!("Server closed the connection");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reads framed messages until the server closes or the transport fails.
/// An orderly close just drops the sender; an error is forwarded so the
/// main loop can report it.
async fn reader_task<R>(mut reader: R, incoming: UnboundedSender<io::Result<Message>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => {
                if incoming.send(Ok(message)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                let _ = incoming.send(Err(err));
                break;
            }
        }
    }
}

/// Handles one input line; returns true when the user quits.
async fn handle_line(
    line: &str,
    me: &str,
    current_session: Option<u32>,
    writer: &mut OwnedWriteHalf,
) -> io::Result<bool> {
    if line.is_empty() {
        return Ok(false);
    }
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(reason) => {
            println!("{}", reason);
            return Ok(false);
        }
    };
    match command {
        Command::Help => {
            println!("{}", HELP);
            Ok(false)
        }
        Command::Quit => {
            write_message(writer, &Message::new(MessageType::Logout, me, "", "")).await?;
            Ok(true)
        }
        other => {
            if let Some(message) = other.to_message(me, current_session) {
                write_message(writer, &message).await?;
            }
            Ok(false)
        }
    }
}

fn display(message: &Message, current_session: &mut Option<u32>) {
    match message.msg_type {
        MessageType::LoginSuccess => println!("{}", message.data),
        MessageType::PlayerList => {
            println!("Connected players:");
            println!("{}", message.data);
        }
        MessageType::GameList => {
            if message.data.is_empty() {
                println!("No running games");
            } else {
                println!("Running games:");
                println!("{}", message.data);
            }
        }
        MessageType::Challenge => {
            println!(
                "{} challenges you to a game (accept {0} / refuse {0})",
                message.sender
            );
        }
        MessageType::ChallengeRefuse => {
            println!("{} refused your challenge", message.sender);
        }
        MessageType::GameStart => {
            if let Ok(id) = message.recipient.parse() {
                *current_session = Some(id);
            }
            println!(
                "Game starting against {} (session {})",
                message.data, message.recipient
            );
        }
        MessageType::GameState => {
            if let Ok(id) = message.recipient.parse() {
                *current_session = Some(id);
            }
            println!("{}", message.data);
        }
        MessageType::GameOver => {
            println!("{}", message.data);
            if message.recipient.parse::<u32>().ok() == *current_session {
                *current_session = None;
            }
        }
        MessageType::PrivateChat => println!("[{}] {}", message.sender, message.data),
        MessageType::SessionChat => {
            println!(
                "[game {}] {}: {}",
                message.recipient, message.sender, message.data
            );
        }
        MessageType::FriendRequest => {
            println!(
                "{} wants to be your friend (acceptfriend {0} / refusefriend {0})",
                message.sender
            );
        }
        MessageType::FriendResult => {
            if message.data.is_empty() {
                println!("No friends yet");
            } else {
                println!("{}", message.data);
            }
        }
        MessageType::BioView => {
            if message.data.is_empty() {
                println!("{} has no bio", message.recipient);
            } else {
                println!("Bio of {}:", message.recipient);
                println!("{}", message.data);
            }
        }
        MessageType::BioEdit | MessageType::Spectate | MessageType::SetPrivate => {
            println!("{}", message.data);
        }
        MessageType::Error => println!("Error: {}", message.data),
        other => debug!("Ignoring unexpected {:?} message", other),
    }
}
