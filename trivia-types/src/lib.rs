pub mod errors;
pub mod game;
pub mod messages;
pub mod records;
pub mod view;

pub type GameId = uuid::Uuid;
pub type PlayerId = uuid::Uuid;
pub type QuestionId = uuid::Uuid;

// Re-export all types
pub use errors::*;
pub use game::*;
pub use messages::*;
pub use records::*;
pub use view::*;
