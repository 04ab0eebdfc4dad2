mod bridge_error;
mod command_error;

pub use bridge_error::BridgeError;
pub use command_error::{CommandError, CommandErrorKind};
