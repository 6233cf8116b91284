//! Client MAC address validation.
//!
//! A submission's MAC must be validated before anything else happens:
//! no persistence and no controller call is attempted for a bad MAC.

use std::sync::LazyLock;

use regex::Regex;

/// Six hex octets, colon- or hyphen-separated.
const MAC_PATTERN: &str = r"^[0-9A-Fa-f]{2}([:-][0-9A-Fa-f]{2}){5}$";

static MAC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(MAC_PATTERN).expect("valid regex"));

/// Check whether a string is a well-formed MAC address.
pub fn is_valid_mac(mac: &str) -> bool {
    MAC_RE.is_match(mac.trim())
}

/// Normalize a MAC for the controller API: lower-cased, colon-separated.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase().replace('-', ":")
}
