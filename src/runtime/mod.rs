// ABOUTME: Container engine access for the agent.
// ABOUTME: Socket detection, the bollard-backed runtime, and the capability traits.

mod bollard;
mod detection;
mod error;
pub mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local, resolve_endpoint};
pub use error::RuntimeError;
pub use traits::*;
pub use types::{RuntimeEndpoint, RuntimeType};
