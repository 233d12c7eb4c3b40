//! TCP listener, per-connection reader/writer tasks and the dispatch loop.
//!
//! All connection events funnel into one `mpsc` channel consumed by a single
//! dispatch loop that exclusively owns the player registry, account store and
//! session manager. Outbound traffic goes through one unbounded sender per
//! connection, drained by that connection's writer task, so no handler ever
//! blocks on a slow socket.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use shared::{read_message, write_message, Message, MessageType};

use crate::accounts::AccountStore;
use crate::registry::{Outbound, PlayerRegistry};
use crate::session::{MoveOutcome, Participant, SessionManager};

/// Server configuration, normally filled in from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub accounts_file: PathBuf,
    pub games_dir: PathBuf,
    pub max_sessions: usize,
    pub max_pending: usize,
}

/// Events from the accept loop and reader tasks into the dispatch loop.
#[derive(Debug)]
enum ServerEvent {
    Connected { conn_id: u32, sender: Outbound },
    Message { conn_id: u32, message: Message },
    Disconnected { conn_id: u32 },
}

/// A connection is only an anonymous socket until its LOGIN is accepted.
/// Keeping the handshake as dispatch-loop state (instead of a blocking read
/// after accept) means an idle half-connected client costs nothing.
enum ConnState {
    AwaitingLogin { sender: Outbound },
    LoggedIn { name: String },
}

pub struct Server {
    listener: TcpListener,
    event_tx: UnboundedSender<ServerEvent>,
    event_rx: UnboundedReceiver<ServerEvent>,
    dispatcher: Dispatcher,
}

impl Server {
    /// Binds the listener and loads the account store.
    pub async fn bind(config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let accounts = AccountStore::open(&config.accounts_file)?;
        info!(
            "Loaded {} account(s) from {}",
            accounts.len(),
            accounts.path().display()
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener,
            event_tx,
            event_rx,
            dispatcher: Dispatcher {
                registry: PlayerRegistry::new(config.max_pending),
                accounts,
                sessions: SessionManager::new(config.max_sessions, config.games_dir),
                connections: HashMap::new(),
            },
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the dispatch loop until the process ends.
    pub async fn run(self) -> io::Result<()> {
        let Server {
            listener,
            event_tx,
            mut event_rx,
            mut dispatcher,
        } = self;

        tokio::spawn(accept_loop(listener, event_tx));

        while let Some(event) = event_rx.recv().await {
            dispatcher.handle_event(event);
        }
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, events: UnboundedSender<ServerEvent>) {
    let mut next_conn_id: u32 = 0;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("Accept failed: {}", err);
                continue;
            }
        };
        let conn_id = next_conn_id;
        next_conn_id += 1;
        debug!("Connection {} accepted from {}", conn_id, addr);

        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        if events
            .send(ServerEvent::Connected {
                conn_id,
                sender: out_tx,
            })
            .is_err()
        {
            return;
        }
        tokio::spawn(writer_task(conn_id, write_half, out_rx));
        tokio::spawn(reader_task(conn_id, read_half, events.clone()));
    }
}

/// Reads framed messages until the peer closes or the transport fails, then
/// reports the disconnect. Both outcomes end the connection the same way.
async fn reader_task(
    conn_id: u32,
    mut read_half: OwnedReadHalf,
    events: UnboundedSender<ServerEvent>,
) {
    loop {
        match read_message(&mut read_half).await {
            Ok(Some(message)) => {
                if events
                    .send(ServerEvent::Message { conn_id, message })
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!("Connection {} read error: {}", conn_id, err);
                break;
            }
        }
    }
    let _ = events.send(ServerEvent::Disconnected { conn_id });
}

/// Drains the connection's outbound queue. Dropping the sender side closes
/// the queue, which flushes what is left and then shuts the socket down.
async fn writer_task(
    conn_id: u32,
    mut write_half: OwnedWriteHalf,
    mut queue: UnboundedReceiver<Message>,
) {
    while let Some(message) = queue.recv().await {
        if let Err(err) = write_message(&mut write_half, &message).await {
            debug!("Connection {} write error: {}", conn_id, err);
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Rejects names that would break the account-store record format or shadow
/// the server's own sender name.
fn validate_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("Name must not be empty");
    }
    if name == "server" {
        return Some("That name is reserved");
    }
    if name
        .chars()
        .any(|c| matches!(c, '|' | '\\' | '\n' | ','))
    {
        return Some("Name contains forbidden characters");
    }
    None
}

/// Owns every piece of mutable server state. Runs on a single task, so each
/// handler sees the registry, accounts and sessions atomically.
struct Dispatcher {
    registry: PlayerRegistry,
    accounts: AccountStore,
    sessions: SessionManager,
    connections: HashMap<u32, ConnState>,
}

impl Dispatcher {
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { conn_id, sender } => {
                self.connections
                    .insert(conn_id, ConnState::AwaitingLogin { sender });
            }
            ServerEvent::Message { conn_id, message } => self.route(conn_id, message),
            ServerEvent::Disconnected { conn_id } => self.disconnect(conn_id),
        }
    }

    fn route(&mut self, conn_id: u32, message: Message) {
        match self.connections.get(&conn_id) {
            Some(ConnState::AwaitingLogin { .. }) => self.handle_login(conn_id, message),
            Some(ConnState::LoggedIn { name }) => {
                // The authenticated name is the actor; the wire `sender`
                // field is display-only and never trusted.
                let actor = name.clone();
                self.handle_message(conn_id, &actor, message);
            }
            None => {}
        }
    }

    /// LOGIN is the only message a half-connected client may send. Anything
    /// else, and any rejected login, answers ERROR and drops the connection
    /// without touching the registry.
    fn handle_login(&mut self, conn_id: u32, message: Message) {
        if message.msg_type != MessageType::Login {
            self.reject(conn_id, "Log in first");
            return;
        }
        let name = message.sender;
        let secret = message.data;

        if let Some(reason) = validate_name(&name) {
            self.reject(conn_id, reason);
            return;
        }
        if self.registry.contains(&name) {
            self.reject(conn_id, "Player already connected");
            return;
        }

        let bio = match self.accounts.find(&name) {
            Some(account) => {
                if account.secret != secret {
                    info!("Login for '{}' rejected: wrong secret", name);
                    self.reject(conn_id, "Wrong secret");
                    return;
                }
                account.bio.clone()
            }
            None => {
                // First login registers the account on the spot.
                if let Err(err) = self.accounts.create(&name, &secret, "") {
                    warn!("Could not persist new account '{}': {}", name, err);
                }
                String::new()
            }
        };

        let sender = match self.connections.remove(&conn_id) {
            Some(ConnState::AwaitingLogin { sender }) => sender,
            _ => return,
        };
        self.connections.insert(
            conn_id,
            ConnState::LoggedIn { name: name.clone() },
        );
        self.registry.add(&name, conn_id, sender, &bio);

        if let Some(player) = self.registry.get(&name) {
            player.send(Message::server(
                MessageType::LoginSuccess,
                &name,
                &format!("Welcome, {}!", name),
            ));
        }
        self.broadcast_player_list();
    }

    /// Sends ERROR on the still-anonymous connection and closes it.
    fn reject(&mut self, conn_id: u32, reason: &str) {
        if let Some(ConnState::AwaitingLogin { sender }) = self.connections.remove(&conn_id) {
            let _ = sender.send(Message::error("", reason));
        }
    }

    fn handle_message(&mut self, conn_id: u32, actor: &str, message: Message) {
        match message.msg_type {
            MessageType::Login => self.send_error(actor, "Already logged in"),
            MessageType::Logout => self.disconnect(conn_id),

            MessageType::ListPlayers => {
                let listing = self.registry.names().join("\n");
                self.send_to(actor, Message::server(MessageType::PlayerList, actor, &listing));
            }
            MessageType::ListGames => {
                let listing = self.sessions.list_games();
                self.send_to(actor, Message::server(MessageType::GameList, actor, &listing));
            }

            MessageType::Challenge => self.handle_challenge(actor, &message.recipient),
            MessageType::ChallengeAccept => self.handle_challenge_accept(actor, &message.recipient),
            MessageType::ChallengeRefuse => self.handle_challenge_refuse(actor, &message.recipient),

            MessageType::PlayMove => self.handle_play_move(actor, &message.recipient, &message.data),
            MessageType::GiveUp => self.handle_give_up(actor, &message.recipient),

            MessageType::PrivateChat => {
                let target = message.recipient;
                if self.registry.contains(&target) {
                    self.send_to(&target, Message::private_chat(actor, &target, &message.data));
                } else {
                    self.send_error(actor, "Player not found");
                }
            }
            MessageType::SessionChat => self.handle_session_chat(actor, &message.recipient, &message.data),

            MessageType::AddFriend => self.handle_add_friend(actor, &message.recipient),
            MessageType::FriendRequestAccept => self.handle_friend_accept(actor, &message.recipient),
            MessageType::FriendRequestRefuse => self.handle_friend_refuse(actor, &message.recipient),
            MessageType::RemoveFriend => self.handle_remove_friend(actor, &message.recipient),
            MessageType::ListFriends => {
                let listing = self
                    .accounts
                    .find(actor)
                    .map(|account| {
                        account
                            .friends
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                self.send_to(actor, Message::server(MessageType::FriendResult, actor, &listing));
            }

            MessageType::BioView => self.handle_bio_view(actor, &message.recipient),
            MessageType::BioEdit => self.handle_bio_edit(actor, &message.data),

            MessageType::Spectate => self.handle_spectate(actor, &message.data),
            MessageType::SetPrivate => self.handle_set_private(actor, &message.data),

            // Everything else is server-to-client traffic; a client sending
            // it is confused, not dangerous.
            _ => self.send_error(actor, "Unexpected message type"),
        }
    }

    fn handle_challenge(&mut self, actor: &str, target: &str) {
        if target == actor {
            self.send_error(actor, "You cannot challenge yourself");
            return;
        }
        if !self.registry.contains(target) {
            self.send_error(actor, "Player not found");
            return;
        }
        // A duplicate or over-cap entry is dropped without a word, so a
        // flooder learns nothing and the target is not spammed.
        if self.registry.record_challenge(target, actor) {
            self.send_to(target, Message::challenge(actor, target));
        }
    }

    fn handle_challenge_accept(&mut self, actor: &str, challenger: &str) {
        let has_pending = self
            .registry
            .get(actor)
            .map(|p| p.pending_challenges().iter().any(|c| c == challenger))
            .unwrap_or(false);
        if !has_pending {
            self.send_error(actor, "No pending challenge from that player");
            return;
        }

        let senders = match (self.registry.get(challenger), self.registry.get(actor)) {
            (Some(from), Some(to)) => (from.sender.clone(), to.sender.clone()),
            _ => {
                // Pending entries are purged on disconnect, so a missing
                // challenger here means the registry is inconsistent.
                self.registry.take_challenge(actor, challenger);
                self.send_error(actor, "Player not found");
                return;
            }
        };

        let created = self.sessions.create(
            Participant::new(challenger, senders.0),
            Participant::new(actor, senders.1),
        );
        match created {
            Some(_id) => {
                // Consumed only now: a full pool leaves the challenge
                // standing so it can be retried.
                self.registry.take_challenge(actor, challenger);
                for name in [challenger, actor] {
                    if let Some(player) = self.registry.get_mut(name) {
                        player.session_count += 1;
                    }
                }
            }
            None => {
                self.send_error(actor, "No free game slots");
                self.send_error(challenger, "No free game slots");
            }
        }
    }

    fn handle_challenge_refuse(&mut self, actor: &str, challenger: &str) {
        if !self.registry.take_challenge(actor, challenger) {
            self.send_error(actor, "No pending challenge from that player");
            return;
        }
        self.send_to(
            challenger,
            Message::new(MessageType::ChallengeRefuse, actor, challenger, ""),
        );
    }

    fn handle_play_move(&mut self, actor: &str, session_field: &str, hole_field: &str) {
        let id = match self.resolve_session_id(actor, session_field) {
            Ok(id) => id,
            Err(reason) => {
                self.send_error(actor, &reason);
                return;
            }
        };
        let hole = match hole_field.trim().parse::<usize>() {
            Ok(hole) => hole,
            Err(_) => {
                self.send_error(actor, "Invalid hole");
                return;
            }
        };
        let seats = self.sessions.participants(id);
        match self.sessions.handle_move(id, actor, hole) {
            MoveOutcome::Continue => {}
            MoveOutcome::Finished => self.settle_counters(seats),
            MoveOutcome::Rejected(reason) => self.send_error(actor, &reason),
        }
    }

    fn handle_give_up(&mut self, actor: &str, session_field: &str) {
        let id = match self.resolve_session_id(actor, session_field) {
            Ok(id) => id,
            Err(reason) => {
                self.send_error(actor, &reason);
                return;
            }
        };
        let seats = self.sessions.participants(id);
        match self.sessions.give_up(id, actor) {
            MoveOutcome::Finished => self.settle_counters(seats),
            MoveOutcome::Rejected(reason) => self.send_error(actor, &reason),
            MoveOutcome::Continue => {}
        }
    }

    fn handle_session_chat(&mut self, actor: &str, session_field: &str, text: &str) {
        let id = match self.resolve_session_id(actor, session_field) {
            Ok(id) => id,
            Err(reason) => {
                self.send_error(actor, &reason);
                return;
            }
        };
        if !self.sessions.session_chat(id, actor, text) {
            self.send_error(actor, "You are not part of that session");
        }
    }

    fn handle_add_friend(&mut self, actor: &str, target: &str) {
        if target == actor {
            self.send_error(actor, "You cannot befriend yourself");
            return;
        }
        if !self.registry.contains(target) {
            self.send_error(actor, "Player not found");
            return;
        }
        if self.accounts.has_friend_edge(actor, target) {
            self.send_error(actor, "Already friends");
            return;
        }
        if self.registry.record_friend_request(target, actor) {
            self.send_to(
                target,
                Message::new(MessageType::FriendRequest, actor, target, ""),
            );
        }
    }

    fn handle_friend_accept(&mut self, actor: &str, from: &str) {
        if !self.registry.take_friend_request(actor, from) {
            self.send_error(actor, "No pending friend request from that player");
            return;
        }
        if let Err(err) = self.accounts.add_friend_edge(actor, from) {
            if err.kind() == io::ErrorKind::NotFound {
                self.send_error(actor, "Player not found");
                return;
            }
            // In-memory edge stands; only the file write failed.
            warn!("Could not persist friend edge {}-{}: {}", actor, from, err);
        }
        self.send_to(
            actor,
            Message::server(
                MessageType::FriendResult,
                actor,
                &format!("You are now friends with {}", from),
            ),
        );
        self.send_to(
            from,
            Message::server(
                MessageType::FriendResult,
                from,
                &format!("You are now friends with {}", actor),
            ),
        );
    }

    fn handle_friend_refuse(&mut self, actor: &str, from: &str) {
        if !self.registry.take_friend_request(actor, from) {
            self.send_error(actor, "No pending friend request from that player");
            return;
        }
        self.send_to(
            from,
            Message::server(
                MessageType::FriendResult,
                from,
                &format!("{} declined your friend request", actor),
            ),
        );
    }

    fn handle_remove_friend(&mut self, actor: &str, target: &str) {
        if !self.accounts.has_friend_edge(actor, target) {
            self.send_error(actor, "Not friends with that player");
            return;
        }
        if let Err(err) = self.accounts.remove_friend_edge(actor, target) {
            warn!("Could not persist friend removal {}-{}: {}", actor, target, err);
        }
        self.send_to(
            actor,
            Message::server(
                MessageType::FriendResult,
                actor,
                &format!("You are no longer friends with {}", target),
            ),
        );
        self.send_to(
            target,
            Message::server(
                MessageType::FriendResult,
                target,
                &format!("You are no longer friends with {}", actor),
            ),
        );
    }

    fn handle_bio_view(&mut self, actor: &str, subject: &str) {
        let subject = if subject.is_empty() { actor } else { subject };
        // Connected players carry the live bio; fall back to the account
        // for players who are offline.
        let bio = self
            .registry
            .get(subject)
            .map(|p| p.bio.clone())
            .or_else(|| self.accounts.find(subject).map(|a| a.bio.clone()));
        match bio {
            Some(bio) => self.send_to(actor, Message::server(MessageType::BioView, subject, &bio)),
            None => self.send_error(actor, "Player not found"),
        }
    }

    fn handle_bio_edit(&mut self, actor: &str, bio: &str) {
        if let Some(player) = self.registry.get_mut(actor) {
            player.bio = bio.to_string();
        }
        if let Err(err) = self.accounts.set_bio(actor, bio) {
            warn!("Could not persist bio for '{}': {}", actor, err);
        }
        self.send_to(actor, Message::server(MessageType::BioEdit, actor, "Bio updated"));
    }

    /// `data` is either a session id to start watching or `leave <id>`.
    fn handle_spectate(&mut self, actor: &str, data: &str) {
        let data = data.trim();
        if let Some(rest) = data.strip_prefix("leave") {
            match rest.trim().parse::<u32>() {
                Ok(id) => {
                    self.sessions.remove_observer(id, actor);
                    self.send_to(
                        actor,
                        Message::server(
                            MessageType::Spectate,
                            actor,
                            &format!("Stopped watching session {}", id),
                        ),
                    );
                }
                Err(_) => self.send_error(actor, "Invalid session id"),
            }
            return;
        }

        let id = match data.parse::<u32>() {
            Ok(id) => id,
            Err(_) => {
                self.send_error(actor, "Invalid session id");
                return;
            }
        };
        let seats = match self.sessions.participants(id) {
            Some(seats) => seats,
            None => {
                self.send_error(actor, "No such session");
                return;
            }
        };
        if seats.iter().any(|name| name == actor) {
            self.send_error(actor, "You are playing in that session");
            return;
        }
        // A private participant restricts the audience to friends: being a
        // friend of any private seat is enough to watch.
        let private_seats: Vec<&String> = seats
            .iter()
            .filter(|name| self.registry.get(name).map(|p| p.private).unwrap_or(false))
            .collect();
        if !private_seats.is_empty()
            && !private_seats
                .iter()
                .any(|name| self.accounts.has_friend_edge(actor, name))
        {
            self.send_error(actor, "That game is private");
            return;
        }
        let sender = match self.registry.get(actor) {
            Some(player) => player.sender.clone(),
            None => return,
        };
        self.send_to(
            actor,
            Message::server(
                MessageType::Spectate,
                actor,
                &format!("Now watching session {}", id),
            ),
        );
        self.sessions.add_observer(id, Participant::new(actor, sender));
    }

    fn handle_set_private(&mut self, actor: &str, data: &str) {
        let private = match data.trim() {
            "" => match self.registry.get(actor) {
                Some(player) => !player.private,
                None => return,
            },
            "on" => true,
            "off" => false,
            _ => {
                self.send_error(actor, "Expected on or off");
                return;
            }
        };
        if let Some(player) = self.registry.get_mut(actor) {
            player.private = private;
        }
        let text = if private {
            "Your games are now private"
        } else {
            "Your games are now public"
        };
        self.send_to(actor, Message::server(MessageType::SetPrivate, actor, text));
    }

    /// An empty session field means "my only game". Players seated at more
    /// than one table have to say which one.
    fn resolve_session_id(&self, actor: &str, field: &str) -> Result<u32, String> {
        let field = field.trim();
        if !field.is_empty() {
            return field
                .parse()
                .map_err(|_| format!("Invalid session id '{}'", field));
        }
        let mut seats = self.sessions.sessions_of(actor);
        match seats.len() {
            0 => Err("You are not in a game".to_string()),
            1 => Ok(seats.remove(0)),
            _ => Err("Several games active, specify the session id".to_string()),
        }
    }

    fn settle_counters(&mut self, seats: Option<[String; 2]>) {
        if let Some(seats) = seats {
            for name in seats {
                if let Some(player) = self.registry.get_mut(&name) {
                    player.session_count = player.session_count.saturating_sub(1);
                }
            }
        }
    }

    /// Cleanup runs unconditionally and in a fixed order, whether the
    /// player said LOGOUT or the socket just died.
    fn disconnect(&mut self, conn_id: u32) {
        let name = match self.connections.remove(&conn_id) {
            Some(ConnState::LoggedIn { name }) => name,
            Some(ConnState::AwaitingLogin { .. }) => {
                debug!("Connection {} closed before login", conn_id);
                return;
            }
            None => return,
        };
        info!("Player '{}' disconnected", name);

        for (session_id, opponent) in self.sessions.forfeit_all(&name) {
            debug!("Session {} forfeited to {}", session_id, opponent);
            if let Some(player) = self.registry.get_mut(&opponent) {
                player.session_count = player.session_count.saturating_sub(1);
            }
        }
        self.sessions.remove_observer_everywhere(&name);
        self.registry.purge_pending_from(&name);
        self.registry.remove(&name);
        self.broadcast_player_list();
    }

    fn broadcast_player_list(&self) {
        let listing = self.registry.names().join("\n");
        for name in self.registry.names() {
            if let Some(player) = self.registry.get(&name) {
                player.send(Message::server(MessageType::PlayerList, &name, &listing));
            }
        }
    }

    fn send_to(&self, name: &str, message: Message) {
        if let Some(player) = self.registry.get(name) {
            player.send(message);
        }
    }

    fn send_error(&self, name: &str, reason: &str) {
        self.send_to(name, Message::error(name, reason));
    }
}
