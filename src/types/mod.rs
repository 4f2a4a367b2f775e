// ABOUTME: Typed identifiers and validated names shared across the agent.
// ABOUTME: Phantom ids keep runtime object kinds apart at compile time.

mod id;
mod image_ref;
mod site_id;
mod site_name;

pub use id::{ContainerId, NetworkId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use site_id::SiteId;
pub use site_name::{RESOURCE_PREFIX, SiteName, SiteNameError};
