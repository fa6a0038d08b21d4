//! Session data model and the in-memory session store.

pub mod model;
pub mod store;

pub use model::*;
pub use store::SessionStore;
