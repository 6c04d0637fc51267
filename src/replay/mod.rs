//! Local replay store
//!
//! [`LocalStorage`] subscribes to every catalog topic and writes each message
//! into a [`ReplayStore`], keyed by provider, topic and the message's flow id,
//! so tests and tools can read back what went over the bus for one flow.

mod error;
mod recorder;
mod store;

pub use error::{ReplayError, ReplayResult};
pub use recorder::{start_local_storage, LocalStorage, TopicState};
pub use store::ReplayStore;
