//! WebSocket Voice Sessions
//!
//! Every connection to `/ws` is one spoken request answered exactly once:
//!
//! - `protocol`: Client frame classification and wire constants.
//! - `session`: Connection lifecycle and the stage machine driving a request.
//! - `sink`: Fans client audio out to the recognizer and the raw log.
//! - `composer`: Sends the JSON answer and its synthesized speech.
//! - `provider`: Speech recognition backends chosen at startup.

mod composer;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod sink;

pub use session::ws_handler;
