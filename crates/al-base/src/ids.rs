//! Opaque identifiers for chats and messages.

use uuid::Uuid;

/// Random bytes in a chat id (hex-encoded to twice this length)
const CHAT_ID_BYTES: usize = 20;
/// Random bytes in a message id
const MESSAGE_ID_BYTES: usize = 7;

/// Positions of the version and variant nibbles in a simple-format v4 UUID
const FIXED_NIBBLES: [usize; 2] = [12, 16];

/// Hex of `bytes` random bytes, drawn from as many v4 UUIDs as needed.
fn random_hex(bytes: usize) -> String {
    let mut hex = String::with_capacity(bytes * 2);
    while hex.len() < bytes * 2 {
        let uuid = Uuid::new_v4().simple().to_string();
        hex.extend(uuid.chars().enumerate().filter(|(i, _)| !FIXED_NIBBLES.contains(i)).map(|(_, c)| c));
    }
    hex.truncate(bytes * 2);
    hex
}

pub fn new_chat_id() -> String {
    random_hex(CHAT_ID_BYTES)
}

pub fn new_message_id() -> String {
    random_hex(MESSAGE_ID_BYTES)
}
