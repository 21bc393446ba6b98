//! Request bodies that only exist at the HTTP edge.

use serde::Deserialize;

/// Optional body carrying only the version the client last saw.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct VersionRequest {
    pub expected_version: Option<u64>,
}
