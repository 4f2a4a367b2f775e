// ABOUTME: Capability traits the agent needs from a container engine.
// ABOUTME: ContainerOps, ImageOps, NetworkOps, LogOps, and RuntimeInfo, plus the ContainerRuntime bundle.

mod container;
mod image;
mod logs;
mod network;
mod runtime_info;
mod shared_types;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogOps, LogOptions, LogSource, LogStream};
pub use network::{NetworkError, NetworkOps};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;

/// Everything site orchestration uses. Implemented for any type with all capabilities.
pub trait ContainerRuntime: ContainerOps + ImageOps + NetworkOps + LogOps {}

impl<T: ContainerOps + ImageOps + NetworkOps + LogOps> ContainerRuntime for T {}
