mod candidate_buffer;
pub(crate) mod handshake;
mod peer_connection;
mod registry;

pub use candidate_buffer::{CandidateBuffer, is_end_of_candidates};
pub use peer_connection::{PeerConnection, Role};
pub use registry::PeerConnectionRegistry;
