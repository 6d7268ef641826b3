use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Store key of the single checkpoint a delegate resumes from.
pub const FROZEN_STATE_KEY: &str = "frozen_auth_delegate";

/// Connector key written by older clients; always removed on cleanup.
pub const LEGACY_CONNECTOR_KEY: &str = "walletconnect";

/// Schema version of [`FrozenState`]. Bump on any layout change.
pub const FROZEN_STATE_VERSION: u32 = 1;

/// Everything a delegate learned before navigating away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenState {
    pub version: u32,
    pub state: BTreeMap<String, String>,
}

impl FrozenState {
    #[must_use]
    pub fn new(state: BTreeMap<String, String>) -> Self {
        Self {
            version: FROZEN_STATE_VERSION,
            state,
        }
    }

    /// Decode a stored checkpoint, rejecting versions this build does not know.
    pub fn decode(value: Value) -> Result<Self, Error> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or(Error::UnsupportedFrozenState(0))?;
        if version != u64::from(FROZEN_STATE_VERSION) {
            return Err(Error::UnsupportedFrozenState(
                u32::try_from(version).unwrap_or(u32::MAX),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }
}
