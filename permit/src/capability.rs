//! Capability identifiers and host grant results
//!
//! A capability is an opaque string naming a single permission the host can
//! grant or deny. Well-known identifiers are provided as constants so callers
//! don't have to spell them out.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Caller-chosen correlation key tying an ask to its later result
pub type RequestId = i32;

/// A single permission identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    /// Create a capability from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Create a capability from a static identifier (usable in `const`)
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Capability {
    fn from(id: &'static str) -> Self {
        Self::from_static(id)
    }
}

impl From<String> for Capability {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Dangerous permissions as the host platform names them
pub mod well_known {
    use super::Capability;

    pub const READ_CALENDAR: Capability =
        Capability::from_static("android.permission.READ_CALENDAR");
    pub const WRITE_CALENDAR: Capability =
        Capability::from_static("android.permission.WRITE_CALENDAR");
    pub const CAMERA: Capability = Capability::from_static("android.permission.CAMERA");
    pub const READ_CONTACTS: Capability =
        Capability::from_static("android.permission.READ_CONTACTS");
    pub const WRITE_CONTACTS: Capability =
        Capability::from_static("android.permission.WRITE_CONTACTS");
    pub const GET_ACCOUNTS: Capability = Capability::from_static("android.permission.GET_ACCOUNTS");
    pub const ACCESS_FINE_LOCATION: Capability =
        Capability::from_static("android.permission.ACCESS_FINE_LOCATION");
    pub const ACCESS_COARSE_LOCATION: Capability =
        Capability::from_static("android.permission.ACCESS_COARSE_LOCATION");
    pub const RECORD_AUDIO: Capability = Capability::from_static("android.permission.RECORD_AUDIO");
    pub const READ_PHONE_STATE: Capability =
        Capability::from_static("android.permission.READ_PHONE_STATE");
    pub const CALL_PHONE: Capability = Capability::from_static("android.permission.CALL_PHONE");
    pub const BODY_SENSORS: Capability = Capability::from_static("android.permission.BODY_SENSORS");
    pub const SEND_SMS: Capability = Capability::from_static("android.permission.SEND_SMS");
    pub const READ_SMS: Capability = Capability::from_static("android.permission.READ_SMS");
    pub const READ_EXTERNAL_STORAGE: Capability =
        Capability::from_static("android.permission.READ_EXTERNAL_STORAGE");
    pub const WRITE_EXTERNAL_STORAGE: Capability =
        Capability::from_static("android.permission.WRITE_EXTERNAL_STORAGE");
}

/// One entry of the host's grant-result vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantResult {
    Granted,
    NotGranted,
}

impl GrantResult {
    /// Host code for a granted capability
    pub const GRANTED_CODE: i32 = 0;

    /// Map a raw host result code. Anything other than the granted code is a denial.
    pub fn from_code(code: i32) -> Self {
        if code == Self::GRANTED_CODE {
            Self::Granted
        } else {
            if code != -1 {
                tracing::warn!(code, "Unknown grant code, treating as not granted");
            }
            Self::NotGranted
        }
    }

    /// Map a whole vector of raw host result codes
    pub fn from_codes(codes: &[i32]) -> Vec<Self> {
        codes.iter().copied().map(Self::from_code).collect()
    }

    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    /// At least one entry, and every entry granted
    pub fn all_granted(results: &[GrantResult]) -> bool {
        !results.is_empty() && results.iter().all(|r| r.is_granted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_and_owned_capabilities_compare_equal() {
        let owned = Capability::new("android.permission.CAMERA");
        assert_eq!(owned, well_known::CAMERA);
        assert_eq!(well_known::CAMERA.to_string(), "android.permission.CAMERA");
    }

    #[test]
    fn test_grant_codes() {
        assert_eq!(GrantResult::from_code(0), GrantResult::Granted);
        assert_eq!(GrantResult::from_code(-1), GrantResult::NotGranted);
        assert_eq!(GrantResult::from_code(42), GrantResult::NotGranted);
        assert_eq!(
            GrantResult::from_codes(&[0, -1]),
            vec![GrantResult::Granted, GrantResult::NotGranted]
        );
    }

    #[test]
    fn test_all_granted_requires_an_entry() {
        assert!(!GrantResult::all_granted(&[]));
        assert!(GrantResult::all_granted(&[GrantResult::Granted]));
        assert!(!GrantResult::all_granted(&[
            GrantResult::Granted,
            GrantResult::NotGranted
        ]));
    }

    #[test]
    fn test_capability_serializes_as_plain_string() {
        let json = serde_json::to_string(&well_known::RECORD_AUDIO).unwrap();
        assert_eq!(json, "\"android.permission.RECORD_AUDIO\"");

        let back: Capability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, well_known::RECORD_AUDIO);
    }
}
