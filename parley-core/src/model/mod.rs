mod error;
mod message;
mod peer;
mod raw;
mod signaling;
mod transaction;

pub use error::MessageError;
pub use message::{Message, Outcome};
pub use peer::PeerId;
pub use raw::RawMessage;
pub use signaling::{CANDIDATES_COMPLETE, Command, CommandKind, IceServerConfig, ResultKind};
pub use transaction::TransactionId;
