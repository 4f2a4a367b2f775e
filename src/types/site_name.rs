// ABOUTME: Validated site names used to derive runtime resource names.
// ABOUTME: A site name becomes part of `archon-<name>` for containers and compose projects.

use std::fmt;
use thiserror::Error;

/// Prefix for every runtime object the agent creates on behalf of a site.
pub const RESOURCE_PREFIX: &str = "archon-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiteNameError {
    #[error("site name is required")]
    Empty,

    #[error("site name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("site name must start with a letter or digit")]
    BadStart,

    #[error("site name must be lowercase")]
    NotLowercase,

    #[error("invalid character in site name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteName(String);

impl SiteName {
    pub fn new(value: &str) -> Result<Self, SiteNameError> {
        let first = value.chars().next().ok_or(SiteNameError::Empty)?;

        if value.len() > 63 {
            return Err(SiteNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(SiteNameError::BadStart);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SiteNameError::InvalidChar(c));
        }

        if value.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(SiteNameError::NotLowercase);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Container name or compose project name for this site.
    pub fn resource_name(&self) -> String {
        format!("{RESOURCE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
