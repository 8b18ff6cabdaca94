pub mod health;
pub mod ready;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod messages;
pub mod publish;

pub use health::*;
pub use ready::*;
pub use diagnostics::*;
pub use error::*;
pub use events::*;
pub use messages::*;
pub use publish::*;
