//! Process-wide registry of live browser sessions.
//!
//! One [`SessionHandle`] exists per session id; sequential agent runs
//! (initial task plus follow-ups) share it, and the handle's execution lock
//! keeps concurrent runs from interleaving engine calls on the same
//! session.

mod errors;
mod model;
mod state;

pub use errors::RegistryError;
pub use model::SessionHandle;
pub use state::SessionRegistry;
