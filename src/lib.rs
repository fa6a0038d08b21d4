//! VisaFlow — adaptive guidance session engine for student work-authorization
//! workflows.

pub mod catalog;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod session;
