pub mod buttons;
pub mod controller;
pub mod key;
pub mod keyboard;
pub mod mouse;
pub mod protocol;
pub mod queue;

pub use controller::{Controller, KeyboardMessage};
pub use keyboard::{ArchieKeyboard, LinkConfig, LinkError, LinkState, LinkStats};
pub use protocol::ModeFlags;
