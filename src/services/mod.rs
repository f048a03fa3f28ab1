pub mod reveal;
pub mod session_bootstrap;
pub mod session_store;

pub use reveal::{RevealController, RevealMode, RevealView};
pub use session_bootstrap::SessionBootstrap;
pub use session_store::SessionStore;
