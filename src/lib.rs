//! Intake Agent: classify documents, extract fields, propose an action.

pub mod agents;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod server;
pub mod store;
