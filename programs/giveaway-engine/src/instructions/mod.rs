pub mod complete_drawing;
pub mod create_drawing;
pub mod credits;
pub mod join_drawing;
pub mod moderation;
pub mod queries;
pub mod register_user;
pub mod select_winners;

pub use complete_drawing::*;
pub use create_drawing::*;
pub use credits::*;
pub use join_drawing::*;
pub use moderation::*;
pub use queries::*;
pub use register_user::*;
pub use select_winners::*;
