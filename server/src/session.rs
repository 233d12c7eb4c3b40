//! Active game sessions: pairing two players over an [`AwaleGame`],
//! relaying board state to participants and observers, and writing a
//! JSON record of every finished match.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::{error, info};
use rand::Rng;
use serde::Serialize;
use shared::{Message, MessageType};

use crate::game::{AwaleGame, Winner, TOTAL_HOLES};
use crate::registry::Outbound;
use crate::util::unix_millis;

/// A named delivery endpoint: the outbound channel of one connection.
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub sender: Outbound,
}

impl Participant {
    pub fn new(name: impl Into<String>, sender: Outbound) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }

    fn send(&self, message: Message) {
        // A closed channel means the connection is already torn down;
        // the disconnect sweep will forfeit their games shortly.
        let _ = self.sender.send(message);
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum MoveAction {
    Move(usize),
    GiveUp,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub player: String,
    pub action: MoveAction,
    pub timestamp_ms: u64,
}

/// Audit record written to the games directory when a match ends.
#[derive(Serialize)]
struct MatchRecord<'a> {
    session_id: u32,
    players: [&'a str; 2],
    scores: [u8; 2],
    board: [u8; TOTAL_HOLES],
    result: String,
    created_ms: u64,
    finished_ms: u64,
    moves: &'a [MoveRecord],
}

pub struct Session {
    id: u32,
    players: [Participant; 2],
    game: AwaleGame,
    observers: Vec<Participant>,
    moves: Vec<MoveRecord>,
    created_ms: u64,
}

impl Session {
    pub fn game(&self) -> &AwaleGame {
        &self.game
    }

    pub fn player_names(&self) -> [&str; 2] {
        [&self.players[0].name, &self.players[1].name]
    }

    /// Name of the player whose turn it is.
    pub fn current_player_name(&self) -> &str {
        &self.players[self.game.current_player()].name
    }

    fn side_of(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    fn is_observer(&self, name: &str) -> bool {
        self.observers.iter().any(|o| o.name == name)
    }

    fn broadcast(&self, message: &Message) {
        for player in &self.players {
            player.send(message.clone());
        }
        for observer in &self.observers {
            observer.send(message.clone());
        }
    }

    /// Rendered board, addressed to this session.
    fn state_message(&self) -> Message {
        Message::server(
            MessageType::GameState,
            &self.id.to_string(),
            &self.game.render(&self.players[0].name, &self.players[1].name),
        )
    }

    fn result_text(&self) -> String {
        let scores = self.game.scores();
        match self.game.winner() {
            Some(Winner::Player(side)) => format!(
                "Game Over - Winner: {}! Scores: {} - {}",
                self.players[side].name, scores[0], scores[1]
            ),
            _ => format!("Game Over - Draw! Scores: {} - {}", scores[0], scores[1]),
        }
    }
}

/// What became of a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Move applied, game continues.
    Continue,
    /// Move applied and it ended the game; the session is gone.
    Finished,
    /// Move refused, with the reason to send back.
    Rejected(String),
}

pub struct SessionManager {
    sessions: HashMap<u32, Session>,
    next_id: u32,
    max_sessions: usize,
    games_dir: PathBuf,
}

impl SessionManager {
    pub fn new(max_sessions: usize, games_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 0,
            max_sessions,
            games_dir: games_dir.into(),
        }
    }

    /// Starts a session between a challenger (side 0) and an acceptor
    /// (side 1). The first player to move is drawn at random. Returns
    /// `None` when every slot is taken.
    pub fn create(&mut self, challenger: Participant, acceptor: Participant) -> Option<u32> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut game = AwaleGame::new();
        game.set_starting_player(rand::thread_rng().gen_range(0..2));

        let session = Session {
            id,
            players: [challenger, acceptor],
            game,
            observers: Vec::new(),
            moves: Vec::new(),
            created_ms: unix_millis(),
        };

        for (side, player) in session.players.iter().enumerate() {
            let opponent = &session.players[1 - side].name;
            player.send(Message::server(
                MessageType::GameStart,
                &id.to_string(),
                opponent,
            ));
        }
        session.broadcast(&session.state_message());

        info!(
            "Session {} started: {} vs {}",
            id, session.players[0].name, session.players[1].name
        );
        self.sessions.insert(id, session);
        Some(id)
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Both player names, cloned so callers can act after the session
    /// is freed.
    pub fn participants(&self, id: u32) -> Option<[String; 2]> {
        self.sessions
            .get(&id)
            .map(|s| [s.players[0].name.clone(), s.players[1].name.clone()])
    }

    pub fn opponent_of(&self, id: u32, name: &str) -> Option<String> {
        let session = self.sessions.get(&id)?;
        let side = session.side_of(name)?;
        Some(session.players[1 - side].name.clone())
    }

    /// Ids of every session the player is seated in, ascending.
    pub fn sessions_of(&self, name: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .sessions
            .values()
            .filter(|s| s.side_of(name).is_some())
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// One line per active session, ascending by id.
    pub fn list_games(&self) -> String {
        let mut ids: Vec<u32> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .filter_map(|id| self.sessions.get(id))
            .map(|s| format!("{}: {} vs {}", s.id, s.players[0].name, s.players[1].name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Applies a move on behalf of `player`. State is broadcast on
    /// success; a finished game is persisted and freed before this
    /// returns.
    pub fn handle_move(&mut self, id: u32, player: &str, hole: usize) -> MoveOutcome {
        let session = match self.sessions.get_mut(&id) {
            Some(session) => session,
            None => return MoveOutcome::Rejected("No such session".to_string()),
        };
        let side = match session.side_of(player) {
            Some(side) => side,
            None => return MoveOutcome::Rejected("You are not part of this game".to_string()),
        };
        if side != session.game.current_player() {
            return MoveOutcome::Rejected("Not your turn".to_string());
        }
        if let Err(err) = session.game.play_move(hole) {
            return MoveOutcome::Rejected(err.to_string());
        }

        session.moves.push(MoveRecord {
            player: player.to_string(),
            action: MoveAction::Move(hole),
            timestamp_ms: unix_millis(),
        });
        session.broadcast(&session.state_message());

        if session.game.is_over() {
            self.finish(id);
            MoveOutcome::Finished
        } else {
            MoveOutcome::Continue
        }
    }

    /// Concedes the game: the opponent collects every seed still on
    /// the board. Always ends the session when it applies.
    pub fn give_up(&mut self, id: u32, player: &str) -> MoveOutcome {
        let session = match self.sessions.get_mut(&id) {
            Some(session) => session,
            None => return MoveOutcome::Rejected("No such session".to_string()),
        };
        let side = match session.side_of(player) {
            Some(side) => side,
            None => return MoveOutcome::Rejected("You are not part of this game".to_string()),
        };

        session.game.give_up(side);
        session.moves.push(MoveRecord {
            player: player.to_string(),
            action: MoveAction::GiveUp,
            timestamp_ms: unix_millis(),
        });
        session.broadcast(&session.state_message());
        self.finish(id);
        MoveOutcome::Finished
    }

    /// Forfeits every session the player is seated in, as on a
    /// disconnect. Returns `(session id, opponent)` pairs so the
    /// caller can settle per-player counters.
    pub fn forfeit_all(&mut self, player: &str) -> Vec<(u32, String)> {
        let mut settled = Vec::new();
        for id in self.sessions_of(player) {
            if let Some(opponent) = self.opponent_of(id, player) {
                settled.push((id, opponent));
            }
            self.give_up(id, player);
        }
        settled
    }

    /// Adds an observer and sends them the current board. Adding the
    /// same name twice is a no-op. Returns false when the session does
    /// not exist.
    pub fn add_observer(&mut self, id: u32, observer: Participant) -> bool {
        let session = match self.sessions.get_mut(&id) {
            Some(session) => session,
            None => return false,
        };
        if !session.is_observer(&observer.name) {
            observer.send(session.state_message());
            session.observers.push(observer);
        }
        true
    }

    /// Removing a name that is not watching is a no-op.
    pub fn remove_observer(&mut self, id: u32, name: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.observers.retain(|o| o.name != name);
        }
    }

    /// Drops the name from every session's observer list.
    pub fn remove_observer_everywhere(&mut self, name: &str) {
        for session in self.sessions.values_mut() {
            session.observers.retain(|o| o.name != name);
        }
    }

    /// Relays a chat line to everyone at the table. Only seated
    /// players and observers may speak; returns false otherwise.
    pub fn session_chat(&self, id: u32, from: &str, text: &str) -> bool {
        let session = match self.sessions.get(&id) {
            Some(session) => session,
            None => return false,
        };
        if session.side_of(from).is_none() && !session.is_observer(from) {
            return false;
        }
        session.broadcast(&Message::new(
            MessageType::SessionChat,
            from,
            &id.to_string(),
            text,
        ));
        true
    }

    fn finish(&mut self, id: u32) {
        let session = match self.sessions.remove(&id) {
            Some(session) => session,
            None => return,
        };
        let result = session.result_text();
        session.broadcast(&Message::server(
            MessageType::GameOver,
            &id.to_string(),
            &result,
        ));
        info!("Session {} finished: {}", id, result);
        self.persist(&session);
    }

    fn persist(&self, session: &Session) {
        let finished_ms = unix_millis();
        let record = MatchRecord {
            session_id: session.id,
            players: session.player_names(),
            scores: *session.game.scores(),
            board: *session.game.holes(),
            result: session.result_text(),
            created_ms: session.created_ms,
            finished_ms,
            moves: &session.moves,
        };
        let path = self
            .games_dir
            .join(format!("game_{}_{}.json", session.id, finished_ms));
        let written = fs::create_dir_all(&self.games_dir)
            .and_then(|_| serde_json::to_string_pretty(&record).map_err(Into::into))
            .and_then(|json| fs::write(&path, json));
        if let Err(err) = written {
            error!("Failed to write match record {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn participant(name: &str) -> (Participant, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Participant::new(name, tx), rx)
    }

    fn manager() -> SessionManager {
        let dir = env::temp_dir().join(format!("awale-session-tests-{}", process::id()));
        SessionManager::new(4, dir)
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn create_notifies_both_players() {
        let mut manager = manager();
        let (alice, mut alice_rx) = participant("alice");
        let (bob, mut bob_rx) = participant("bob");

        let id = manager.create(alice, bob).unwrap();

        let alice_msgs = drain(&mut alice_rx);
        assert_eq!(alice_msgs[0].msg_type, MessageType::GameStart);
        assert_eq!(alice_msgs[0].recipient, id.to_string());
        assert_eq!(alice_msgs[0].data, "bob");
        assert_eq!(alice_msgs[1].msg_type, MessageType::GameState);

        let bob_msgs = drain(&mut bob_rx);
        assert_eq!(bob_msgs[0].data, "alice");
        assert_eq!(bob_msgs[1].msg_type, MessageType::GameState);
    }

    #[test]
    fn create_refuses_when_pool_full() {
        let dir = env::temp_dir().join(format!("awale-session-full-{}", process::id()));
        let mut manager = SessionManager::new(1, dir);
        let (a, _a_rx) = participant("a");
        let (b, _b_rx) = participant("b");
        let (c, _c_rx) = participant("c");
        let (d, _d_rx) = participant("d");

        assert!(manager.create(a, b).is_some());
        assert!(manager.create(c, d).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn move_in_unknown_session_is_rejected() {
        let mut manager = manager();
        assert_eq!(
            manager.handle_move(99, "alice", 0),
            MoveOutcome::Rejected("No such session".to_string())
        );
    }

    #[test]
    fn outsider_cannot_move_or_chat() {
        let mut manager = manager();
        let (alice, _a) = participant("alice");
        let (bob, _b) = participant("bob");
        let id = manager.create(alice, bob).unwrap();

        assert_eq!(
            manager.handle_move(id, "mallory", 0),
            MoveOutcome::Rejected("You are not part of this game".to_string())
        );
        assert!(!manager.session_chat(id, "mallory", "hi"));
    }

    #[test]
    fn moving_out_of_turn_is_rejected() {
        let mut manager = manager();
        let (alice, _a) = participant("alice");
        let (bob, _b) = participant("bob");
        let id = manager.create(alice, bob).unwrap();

        let waiting = if manager.get(id).unwrap().current_player_name() == "alice" {
            "bob"
        } else {
            "alice"
        };
        let hole = if waiting == "alice" { 0 } else { 6 };
        assert_eq!(
            manager.handle_move(id, waiting, hole),
            MoveOutcome::Rejected("Not your turn".to_string())
        );
    }

    #[test]
    fn legal_move_reaches_players_and_observers() {
        let mut manager = manager();
        let (alice, mut alice_rx) = participant("alice");
        let (bob, mut bob_rx) = participant("bob");
        let id = manager.create(alice, bob).unwrap();

        let (eve, mut eve_rx) = participant("eve");
        assert!(manager.add_observer(id, eve));
        let joined = drain(&mut eve_rx);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].msg_type, MessageType::GameState);

        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let mover = manager.get(id).unwrap().current_player_name().to_string();
        let hole = if mover == "alice" { 2 } else { 8 };
        assert_eq!(manager.handle_move(id, &mover, hole), MoveOutcome::Continue);

        for rx in [&mut alice_rx, &mut bob_rx, &mut eve_rx] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0].msg_type, MessageType::GameState);
            assert_eq!(msgs[0].recipient, id.to_string());
        }
    }

    #[test]
    fn give_up_ends_session_and_scores_opponent() {
        let mut manager = manager();
        let (alice, mut alice_rx) = participant("alice");
        let (bob, mut bob_rx) = participant("bob");
        let id = manager.create(alice, bob).unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        assert_eq!(manager.give_up(id, "alice"), MoveOutcome::Finished);
        assert!(!manager.contains(id));

        let bob_msgs = drain(&mut bob_rx);
        let over = bob_msgs
            .iter()
            .find(|m| m.msg_type == MessageType::GameOver)
            .unwrap();
        assert!(over.data.contains("Winner: bob"));
        // All 48 unscored seeds fall to bob.
        assert!(over.data.contains("48 - 0") || over.data.contains("0 - 48"));
    }

    #[test]
    fn forfeit_all_settles_every_seat() {
        let mut manager = manager();
        let (alice1, _a1) = participant("alice");
        let (alice2, _a2) = participant("alice");
        let (bob, _b) = participant("bob");
        let (carol, _c) = participant("carol");

        let first = manager.create(alice1, bob).unwrap();
        let second = manager.create(carol, alice2).unwrap();

        let mut settled = manager.forfeit_all("alice");
        settled.sort_unstable();
        assert_eq!(
            settled,
            vec![(first, "bob".to_string()), (second, "carol".to_string())]
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn observer_add_and_remove_are_idempotent() {
        let mut manager = manager();
        let (alice, _a) = participant("alice");
        let (bob, _b) = participant("bob");
        let id = manager.create(alice, bob).unwrap();

        let (eve1, mut eve_rx) = participant("eve");
        let (eve2, _eve_rx2) = participant("eve");
        assert!(manager.add_observer(id, eve1));
        assert!(manager.add_observer(id, eve2));
        drain(&mut eve_rx);

        manager.session_chat(id, "alice", "hello");
        // A double-added observer still hears each line once.
        assert_eq!(drain(&mut eve_rx).len(), 1);

        manager.remove_observer(id, "eve");
        manager.remove_observer(id, "eve");
        manager.session_chat(id, "alice", "again");
        assert!(drain(&mut eve_rx).is_empty());

        assert!(!manager.add_observer(99, participant("eve").0));
    }

    #[test]
    fn session_chat_reaches_the_table() {
        let mut manager = manager();
        let (alice, mut alice_rx) = participant("alice");
        let (bob, mut bob_rx) = participant("bob");
        let id = manager.create(alice, bob).unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        assert!(manager.session_chat(id, "bob", "good luck"));
        let msgs = drain(&mut alice_rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].msg_type, MessageType::SessionChat);
        assert_eq!(msgs[0].sender, "bob");
        assert_eq!(msgs[0].data, "good luck");
    }

    #[test]
    fn list_games_is_ordered_by_id() {
        let mut manager = manager();
        let (a, _a) = participant("alice");
        let (b, _b) = participant("bob");
        let (c, _c) = participant("carol");
        let (d, _d) = participant("dave");
        let first = manager.create(a, b).unwrap();
        let second = manager.create(c, d).unwrap();

        let listing = manager.list_games();
        assert_eq!(
            listing,
            format!("{}: alice vs bob\n{}: carol vs dave", first, second)
        );
    }
}
