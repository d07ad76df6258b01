mod conversation;
mod history;
mod message;

pub use conversation::Conversation;
pub use history::{HistoryEntry, Speaker};
pub use message::{Message, Role, Source, test_helpers};
