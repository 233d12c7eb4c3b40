//! Socket-level tests: a real server on an ephemeral port, real TCP
//! clients speaking the fixed-layout protocol.

use std::env;
use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use server::network::{Config, Server};
use shared::{read_message, write_message, Message, MessageType};

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(tag: &str) -> SocketAddr {
    let accounts = env::temp_dir().join(format!("awale-it-{}-{}.db", tag, process::id()));
    let _ = std::fs::remove_file(&accounts);
    let games_dir = env::temp_dir().join(format!("awale-it-games-{}-{}", tag, process::id()));

    let server = Server::bind(Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        accounts_file: accounts,
        games_dir,
        max_sessions: 8,
        max_pending: 8,
    })
    .await
    .expect("bind server");
    let addr = server.local_addr().expect("local addr");
    tokio::spawn(server.run());
    addr
}

async fn recv(stream: &mut TcpStream) -> Option<Message> {
    timeout(WAIT, read_message(stream))
        .await
        .expect("timed out waiting for a message")
        .expect("read message")
}

/// Reads messages until one of the wanted type arrives, skipping the
/// broadcasts (player lists and the like) that interleave freely.
async fn recv_of_type(stream: &mut TcpStream, wanted: MessageType) -> Message {
    for _ in 0..32 {
        match recv(stream).await {
            Some(message) if message.msg_type == wanted => return message,
            Some(_) => continue,
            None => break,
        }
    }
    panic!("connection ended before a {:?} message", wanted);
}

async fn send(stream: &mut TcpStream, message: Message) {
    write_message(stream, &message).await.expect("write message");
}

async fn login(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    send(&mut stream, Message::login(name, "pw")).await;
    let reply = recv_of_type(&mut stream, MessageType::LoginSuccess).await;
    assert!(reply.data.contains(name));
    stream
}

/// Sets up a running game, draining both streams past GAME_START and the
/// initial GAME_STATE. Returns the clients and the session id.
async fn start_game(addr: SocketAddr) -> (TcpStream, TcpStream, String) {
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;

    send(&mut alice, Message::challenge("alice", "bob")).await;
    let challenge = recv_of_type(&mut bob, MessageType::Challenge).await;
    assert_eq!(challenge.sender, "alice");

    send(
        &mut bob,
        Message::new(MessageType::ChallengeAccept, "bob", "alice", ""),
    )
    .await;

    let start = recv_of_type(&mut alice, MessageType::GameStart).await;
    let session = start.recipient.clone();
    assert_eq!(start.data, "bob");
    let start = recv_of_type(&mut bob, MessageType::GameStart).await;
    assert_eq!(start.recipient, session);
    assert_eq!(start.data, "alice");

    let state = recv_of_type(&mut alice, MessageType::GameState).await;
    assert!(state.data.contains("Score"));
    recv_of_type(&mut bob, MessageType::GameState).await;

    (alice, bob, session)
}

#[tokio::test]
async fn login_updates_every_player_list() {
    let addr = start_server("login").await;

    let mut alice = login(addr, "alice").await;
    let list = recv_of_type(&mut alice, MessageType::PlayerList).await;
    assert_eq!(list.data, "alice");

    let _bob = login(addr, "bob").await;
    let list = recv_of_type(&mut alice, MessageType::PlayerList).await;
    assert_eq!(list.data, "alice\nbob");
}

#[tokio::test]
async fn duplicate_login_is_rejected_and_closed() {
    let addr = start_server("dup").await;
    let _alice = login(addr, "alice").await;

    let mut imposter = TcpStream::connect(addr).await.expect("connect");
    send(&mut imposter, Message::login("alice", "pw")).await;
    let reply = recv(&mut imposter).await.expect("error reply");
    assert_eq!(reply.msg_type, MessageType::Error);
    assert_eq!(reply.data, "Player already connected");
    // The server hangs up after the rejection.
    assert!(recv(&mut imposter).await.is_none());
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let addr = start_server("secret").await;
    let alice = login(addr, "alice").await;
    drop(alice);

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    send(&mut stream, Message::login("alice", "not-pw")).await;
    let reply = recv(&mut stream).await.expect("error reply");
    assert_eq!(reply.msg_type, MessageType::Error);
    assert_eq!(reply.data, "Wrong secret");
}

#[tokio::test]
async fn message_before_login_closes_the_connection() {
    let addr = start_server("nologin").await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    send(
        &mut stream,
        Message::new(MessageType::ListPlayers, "ghost", "", ""),
    )
    .await;
    let reply = recv(&mut stream).await.expect("error reply");
    assert_eq!(reply.msg_type, MessageType::Error);
    assert!(recv(&mut stream).await.is_none());
}

#[tokio::test]
async fn challenge_accept_starts_a_game() {
    let addr = start_server("game").await;
    let (mut alice, _bob, session) = start_game(addr).await;

    send(
        &mut alice,
        Message::new(MessageType::ListGames, "alice", "", ""),
    )
    .await;
    let listing = recv_of_type(&mut alice, MessageType::GameList).await;
    assert_eq!(listing.data, format!("{}: alice vs bob", session));
}

#[tokio::test]
async fn accept_without_pending_challenge_fails() {
    let addr = start_server("nopending").await;
    let _alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;

    send(
        &mut bob,
        Message::new(MessageType::ChallengeAccept, "bob", "alice", ""),
    )
    .await;
    let reply = recv_of_type(&mut bob, MessageType::Error).await;
    assert_eq!(reply.data, "No pending challenge from that player");
}

#[tokio::test]
async fn give_up_hands_every_seed_to_the_opponent() {
    let addr = start_server("giveup").await;
    let (mut alice, mut bob, session) = start_game(addr).await;

    send(
        &mut alice,
        Message::new(MessageType::GiveUp, "alice", &session, ""),
    )
    .await;

    let over = recv_of_type(&mut bob, MessageType::GameOver).await;
    assert_eq!(over.recipient, session);
    assert!(over.data.contains("Winner: bob"));
    assert!(over.data.contains("48"));
    recv_of_type(&mut alice, MessageType::GameOver).await;

    // The slot is free again.
    send(&mut bob, Message::new(MessageType::ListGames, "bob", "", "")).await;
    let listing = recv_of_type(&mut bob, MessageType::GameList).await;
    assert_eq!(listing.data, "");
}

#[tokio::test]
async fn disconnect_forfeits_the_game() {
    let addr = start_server("forfeit").await;
    let (alice, mut bob, session) = start_game(addr).await;

    drop(alice);

    let over = recv_of_type(&mut bob, MessageType::GameOver).await;
    assert_eq!(over.recipient, session);
    assert!(over.data.contains("Winner: bob"));

    let list = recv_of_type(&mut bob, MessageType::PlayerList).await;
    assert_eq!(list.data, "bob");
}

#[tokio::test]
async fn moves_flow_and_turn_order_is_enforced() {
    let addr = start_server("moves").await;
    let (mut alice, mut bob, session) = start_game(addr).await;

    // Whoever moves first, a move from the wrong side is refused and a
    // move from the right side produces a fresh board for both.
    send(
        &mut alice,
        Message::play_move("alice", &session, 0),
    )
    .await;
    send(&mut bob, Message::play_move("bob", &session, 6)).await;

    // Exactly one of the two owns the turn: one gets GAME_STATE, the
    // other an error. Both see the state broadcast.
    let alice_reply = recv(&mut alice).await.expect("reply");
    let bob_reply = recv(&mut bob).await.expect("reply");
    let kinds = [alice_reply.msg_type, bob_reply.msg_type];
    assert!(kinds.contains(&MessageType::GameState));
    assert!(kinds.contains(&MessageType::Error) || kinds == [MessageType::GameState; 2]);
}

#[tokio::test]
async fn spectating_a_private_game_requires_friendship() {
    let addr = start_server("privacy").await;
    let (mut alice, _bob, session) = start_game(addr).await;
    let mut eve = login(addr, "eve").await;

    send(
        &mut alice,
        Message::new(MessageType::SetPrivate, "alice", "", "on"),
    )
    .await;
    let ack = recv_of_type(&mut alice, MessageType::SetPrivate).await;
    assert!(ack.data.contains("private"));

    send(
        &mut eve,
        Message::new(MessageType::Spectate, "eve", "", &session),
    )
    .await;
    let reply = recv_of_type(&mut eve, MessageType::Error).await;
    assert_eq!(reply.data, "That game is private");

    // Befriending alice opens the game up.
    send(
        &mut eve,
        Message::new(MessageType::AddFriend, "eve", "alice", ""),
    )
    .await;
    let request = recv_of_type(&mut alice, MessageType::FriendRequest).await;
    assert_eq!(request.sender, "eve");
    send(
        &mut alice,
        Message::new(MessageType::FriendRequestAccept, "alice", "eve", ""),
    )
    .await;
    recv_of_type(&mut eve, MessageType::FriendResult).await;

    send(
        &mut eve,
        Message::new(MessageType::Spectate, "eve", "", &session),
    )
    .await;
    recv_of_type(&mut eve, MessageType::Spectate).await;
    let board = recv_of_type(&mut eve, MessageType::GameState).await;
    assert_eq!(board.recipient, session);
}

#[tokio::test]
async fn private_chat_reaches_only_its_target() {
    let addr = start_server("chat").await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;

    send(
        &mut alice,
        Message::private_chat("alice", "bob", "up for a game?"),
    )
    .await;
    let line = recv_of_type(&mut bob, MessageType::PrivateChat).await;
    assert_eq!(line.sender, "alice");
    assert_eq!(line.data, "up for a game?");

    send(
        &mut alice,
        Message::private_chat("alice", "nobody", "hello?"),
    )
    .await;
    let reply = recv_of_type(&mut alice, MessageType::Error).await;
    assert_eq!(reply.data, "Player not found");
}
