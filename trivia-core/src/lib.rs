pub mod awards;
pub mod coordinator;
pub mod local_turn;
pub mod questions;
pub mod rooms;
pub mod scoring;
pub mod store;

// Re-export main components
pub use awards::*;
pub use coordinator::*;
pub use local_turn::*;
pub use questions::*;
pub use rooms::*;
pub use scoring::*;
pub use store::*;
