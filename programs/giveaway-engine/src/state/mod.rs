pub use drawing::*;
pub use participant::*;
pub use user::*;
pub use winner::*;

pub mod drawing;
pub mod participant;
pub mod user;
pub mod winner;

/// Chat platform user id.
pub type UserId = i64;
/// Chat or channel id. Channels are negative on Telegram.
pub type ChatId = i64;
pub type MessageId = i64;
pub type DrawingId = i64;
