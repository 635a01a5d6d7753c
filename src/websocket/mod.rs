//! Real-time relay for HealLink clients.
//!
//! Every websocket gets a short server-assigned id, announced in a welcome
//! message. A client pokes another by sending that id as plain text.

mod protocol;
mod registry;
mod session;

pub use protocol::{ServerMessage, POKE_PAYLOAD};
pub use registry::{
    generate_id, ConnectionRegistry, ConnectionSender, DispatchOutcome, Registration, ID_LEN,
    MAX_ID_ATTEMPTS,
};
pub use session::{websocket_route, RelaySession};
