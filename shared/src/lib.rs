//! Wire protocol shared by the Awalé server and client.
//!
//! A protocol message is a fixed-size record: a one-byte type tag followed by
//! three NUL-padded text fields (sender, recipient, data) of fixed capacity.
//! The explicit byte layout below is the interoperability contract; nothing is
//! ever sent as raw struct memory. Fields that exceed their capacity are
//! truncated on encode rather than rejected.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 1977;

/// Capacity in bytes of the sender and recipient fields.
pub const NAME_CAPACITY: usize = 64;

/// Capacity in bytes of the data field.
pub const DATA_CAPACITY: usize = 1024;

/// Total size of one encoded message record on the wire.
pub const MESSAGE_SIZE: usize = 1 + 2 * NAME_CAPACITY + DATA_CAPACITY;

/// Message types exchanged between client and server.
///
/// The discriminant doubles as the wire tag, so the numbering is part of the
/// protocol and existing values must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Login = 0,
    LoginSuccess = 1,
    Logout = 2,
    ListPlayers = 3,
    PlayerList = 4,
    ListGames = 5,
    GameList = 6,
    Challenge = 7,
    ChallengeAccept = 8,
    ChallengeRefuse = 9,
    GameStart = 10,
    GameState = 11,
    PlayMove = 12,
    GiveUp = 13,
    GameOver = 14,
    PrivateChat = 15,
    SessionChat = 16,
    ListFriends = 17,
    AddFriend = 18,
    RemoveFriend = 19,
    FriendRequest = 20,
    FriendRequestAccept = 21,
    FriendRequestRefuse = 22,
    FriendResult = 23,
    BioView = 24,
    BioEdit = 25,
    Spectate = 26,
    SetPrivate = 27,
    Error = 28,
}

impl MessageType {
    /// All message types, in tag order. Used by decoding and tests.
    pub const ALL: [MessageType; 29] = [
        MessageType::Login,
        MessageType::LoginSuccess,
        MessageType::Logout,
        MessageType::ListPlayers,
        MessageType::PlayerList,
        MessageType::ListGames,
        MessageType::GameList,
        MessageType::Challenge,
        MessageType::ChallengeAccept,
        MessageType::ChallengeRefuse,
        MessageType::GameStart,
        MessageType::GameState,
        MessageType::PlayMove,
        MessageType::GiveUp,
        MessageType::GameOver,
        MessageType::PrivateChat,
        MessageType::SessionChat,
        MessageType::ListFriends,
        MessageType::AddFriend,
        MessageType::RemoveFriend,
        MessageType::FriendRequest,
        MessageType::FriendRequestAccept,
        MessageType::FriendRequestRefuse,
        MessageType::FriendResult,
        MessageType::BioView,
        MessageType::BioEdit,
        MessageType::Spectate,
        MessageType::SetPrivate,
        MessageType::Error,
    ];

    /// Wire tag for this message type.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolves a wire tag back to a message type.
    pub fn from_tag(tag: u8) -> Option<MessageType> {
        MessageType::ALL.get(tag as usize).copied()
    }
}

/// One protocol message.
///
/// `sender` and `recipient` are player names, a session id, or empty,
/// depending on the message type; gameplay and session-chat messages carry
/// the session id in `recipient` so a client holding several concurrent
/// sessions can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub sender: String,
    pub recipient: String,
    pub data: String,
}

impl Message {
    /// Builds a message, truncating each field to its wire capacity.
    pub fn new(msg_type: MessageType, sender: &str, recipient: &str, data: &str) -> Self {
        Self {
            msg_type,
            sender: truncated(sender, NAME_CAPACITY),
            recipient: truncated(recipient, NAME_CAPACITY),
            data: truncated(data, DATA_CAPACITY),
        }
    }

    /// Server-originated message addressed to `recipient`.
    pub fn server(msg_type: MessageType, recipient: &str, data: &str) -> Self {
        Message::new(msg_type, "server", recipient, data)
    }

    /// Login request; the secret travels in the data field.
    pub fn login(name: &str, secret: &str) -> Self {
        Message::new(MessageType::Login, name, "", secret)
    }

    /// Challenge from one player to another.
    pub fn challenge(from: &str, to: &str) -> Self {
        Message::new(MessageType::Challenge, from, to, "")
    }

    /// Move request for the session in `recipient` (may be empty when the
    /// player holds exactly one session).
    pub fn play_move(player: &str, session: &str, hole: usize) -> Self {
        Message::new(MessageType::PlayMove, player, session, &hole.to_string())
    }

    /// Private chat line to a named player.
    pub fn private_chat(from: &str, to: &str, text: &str) -> Self {
        Message::new(MessageType::PrivateChat, from, to, text)
    }

    /// Chat line to everyone in a session.
    pub fn session_chat(from: &str, session: &str, text: &str) -> Self {
        Message::new(MessageType::SessionChat, from, session, text)
    }

    /// Server error report addressed to `recipient`.
    pub fn error(recipient: &str, reason: &str) -> Self {
        Message::server(MessageType::Error, recipient, reason)
    }

    /// Encodes the message into its fixed wire layout.
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        let mut buf = [0u8; MESSAGE_SIZE];
        buf[0] = self.msg_type.tag();
        write_field(&mut buf[1..1 + NAME_CAPACITY], &self.sender);
        write_field(
            &mut buf[1 + NAME_CAPACITY..1 + 2 * NAME_CAPACITY],
            &self.recipient,
        );
        write_field(&mut buf[1 + 2 * NAME_CAPACITY..], &self.data);
        buf
    }

    /// Decodes one full wire record. Fails on an unknown type tag.
    pub fn decode(buf: &[u8]) -> io::Result<Message> {
        if buf.len() != MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message record must be {} bytes", MESSAGE_SIZE),
            ));
        }

        let msg_type = MessageType::from_tag(buf[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message type tag {}", buf[0]),
            )
        })?;

        Ok(Message {
            msg_type,
            sender: read_field(&buf[1..1 + NAME_CAPACITY]),
            recipient: read_field(&buf[1 + NAME_CAPACITY..1 + 2 * NAME_CAPACITY]),
            data: read_field(&buf[1 + 2 * NAME_CAPACITY..]),
        })
    }
}

/// Copies `value` into `field`, NUL-padding the remainder.
fn write_field(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

/// Reads a NUL-padded field back into a string.
fn read_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Truncates `value` to at most `cap` bytes on a character boundary.
fn truncated(value: &str, cap: usize) -> String {
    if value.len() <= cap {
        return value.to_string();
    }
    let mut end = cap;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Reads one full message record, looping over partial TCP deliveries.
///
/// Returns `Ok(Some(message))` for a complete record, `Ok(None)` when the
/// peer closed the connection before sending any byte of a new record, and
/// `Err` on a transport failure or a close in the middle of a record. Callers
/// treat both `Ok(None)` and `Err` as a disconnect; this is the protocol's
/// authoritative disconnect signal.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MESSAGE_SIZE];
    let mut received = 0;

    while received < MESSAGE_SIZE {
        let n = reader.read(&mut buf[received..]).await?;
        if n == 0 {
            if received == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-message",
            ));
        }
        received += n;
    }

    Message::decode(&buf).map(Some)
}

/// Writes one full message record.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_tag_roundtrip_all_types() {
        for msg_type in MessageType::ALL {
            assert_eq!(MessageType::from_tag(msg_type.tag()), Some(msg_type));
        }
        assert_eq!(MessageType::from_tag(MessageType::ALL.len() as u8), None);
        assert_eq!(MessageType::from_tag(255), None);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let message = Message::new(
            MessageType::PrivateChat,
            "alice",
            "bob",
            "shall we play a game?",
        );

        let encoded = message.encode();
        assert_eq!(encoded.len(), MESSAGE_SIZE);

        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_empty_fields_roundtrip() {
        let message = Message::new(MessageType::ListPlayers, "", "", "");
        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(decoded.sender, "");
        assert_eq!(decoded.recipient, "");
        assert_eq!(decoded.data, "");
    }

    #[test]
    fn test_oversized_fields_are_truncated() {
        let long_name = "x".repeat(200);
        let long_data = "y".repeat(5000);
        let message = Message::new(MessageType::BioEdit, &long_name, &long_name, &long_data);

        assert_eq!(message.sender.len(), NAME_CAPACITY);
        assert_eq!(message.recipient.len(), NAME_CAPACITY);
        assert_eq!(message.data.len(), DATA_CAPACITY);

        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(decoded.sender, message.sender);
        assert_eq!(decoded.data, message.data);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'é' is two bytes in UTF-8; a byte-level cut at the capacity would
        // split the final character.
        let name = "é".repeat(NAME_CAPACITY);
        let message = Message::new(MessageType::Login, &name, "", "");
        assert!(message.sender.len() <= NAME_CAPACITY);
        assert!(message.sender.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut buf = Message::new(MessageType::Login, "a", "", "").encode();
        buf[0] = 200;
        assert!(Message::decode(&buf).is_err());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert!(Message::decode(&[0u8; 16]).is_err());
    }

    #[tokio::test]
    async fn test_read_message_reassembles_fragments() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let message = Message::login("alice", "sesame");
        let encoded = message.encode();

        let writer = tokio::spawn(async move {
            // Dribble the record out in small chunks to mimic TCP
            // fragmentation; the duplex buffer is smaller than the record.
            for chunk in encoded.chunks(100) {
                client.write_all(chunk).await.unwrap();
                client.flush().await.unwrap();
            }
            client
        });

        let received = read_message(&mut server).await.unwrap().unwrap();
        assert_eq!(received, message);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_message_orderly_close() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let result = read_message(&mut server).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_message_close_mid_record_is_error() {
        let (mut client, mut server) = tokio::io::duplex(MESSAGE_SIZE);
        let encoded = Message::login("alice", "").encode();

        tokio::spawn(async move {
            client.write_all(&encoded[..50]).await.unwrap();
            client.flush().await.unwrap();
            // Dropping the writer closes the stream with a partial record
            // outstanding.
        });

        let result = read_message(&mut server).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(2 * MESSAGE_SIZE);
        let first = Message::challenge("alice", "bob");
        let second = Message::play_move("alice", "3", 4);

        write_message(&mut client, &first).await.unwrap();
        write_message(&mut client, &second).await.unwrap();

        assert_eq!(read_message(&mut server).await.unwrap().unwrap(), first);
        assert_eq!(read_message(&mut server).await.unwrap().unwrap(), second);
    }
}
