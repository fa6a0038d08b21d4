//! REST surface for the guidance engine.

pub mod routes;

pub use routes::{AppState, api_routes};
