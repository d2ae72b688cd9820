
pub use event_helpers::*;
pub use mock_channel::*;
pub use mock_engine::*;
