pub mod health;
pub mod diagnostics;
pub mod publish;

pub use health::*;
pub use diagnostics::*;
pub use publish::*;
