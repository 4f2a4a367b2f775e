// ABOUTME: Library root for archon-agent, the node-side deployment agent.
// ABOUTME: The binary in main.rs is a thin CLI over Agent.

pub mod agent;
pub mod certs;
pub mod compose;
pub mod config;
pub mod container;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod process;
pub mod proxy;
pub mod runtime;
pub mod site;
pub mod types;

pub use agent::Agent;
pub use error::{Error, ErrorKind, Result};
