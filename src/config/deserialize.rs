// ABOUTME: Custom serde deserializers for agent config fields.
// ABOUTME: Normalizes engine socket addresses and rejects blank names.

use serde::Deserialize;

/// Accepts `/path/to.sock` or `unix:///path/to.sock`.
pub fn deserialize_socket<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(value) => {
            let value = value.trim();
            if value.starts_with("tcp://") || value.starts_with("http") {
                return Err(serde::de::Error::custom(
                    "only unix sockets are supported for the container engine",
                ));
            }
            let path = value.strip_prefix("unix://").unwrap_or(value);
            if path.is_empty() {
                return Err(serde::de::Error::custom("socket path cannot be empty"));
            }
            Ok(Some(path.to_string()))
        }
    }
}

pub fn deserialize_network_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    if name.trim().is_empty() {
        return Err(serde::de::Error::custom("network name cannot be empty"));
    }
    Ok(name)
}
