//! Email address extraction from free-form header values.
//!
//! Two entry points:
//! - [`extract_addresses`] scans a header for every plausible `local@domain.tld`.
//! - [`extract_email_address`] splits a single `"Display Name <addr>"` value.
//!
//! Neither function fails: an absent result is the only failure signal.

use std::sync::OnceLock;

use regex::Regex;

/// `local-part@domain.tld`: labels are alphanumeric or hyphen, TLD is at least
/// two letters.
const ADDRESS_PATTERN: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}";

/// `Display Name <addr>` with optional surrounding whitespace.
const ANGLE_PATTERN: &str = r"^\s*(.*?)\s*<([^>]+)>\s*$";

static ADDRESS_RE: OnceLock<Regex> = OnceLock::new();
static ANGLE_RE: OnceLock<Regex> = OnceLock::new();

fn address_re() -> &'static Regex {
    ADDRESS_RE.get_or_init(|| Regex::new(ADDRESS_PATTERN).expect("valid address pattern"))
}

fn angle_re() -> &'static Regex {
    ANGLE_RE.get_or_init(|| Regex::new(ANGLE_PATTERN).expect("valid angle pattern"))
}

/// A parsed email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = Some("Juan García")`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → `display_name = None`, `address = "user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name, if one was given.
    pub display_name: Option<String>,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Parse a single address. Returns `None` when no address can be found.
    pub fn parse(raw: &str) -> Option<Self> {
        let (display_name, address) = extract_email_address(raw);
        address.map(|address| Self {
            display_name,
            address,
        })
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{name} <{}>", self.address),
            None => self.address.clone(),
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Return every plausible address in `raw`, in order of first appearance.
///
/// Duplicates are kept as they appear in the source text.
pub fn extract_addresses(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    address_re()
        .find_iter(raw)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split `"Display Name <addr>"` into `(name, address)`.
///
/// When angle brackets are present, their content is the address and the
/// text before them (trimmed, quotes stripped) is the name. Otherwise the
/// first bare address in the string is returned without a name.
pub fn extract_email_address(raw: &str) -> (Option<String>, Option<String>) {
    if raw.trim().is_empty() {
        return (None, None);
    }

    if let Some(caps) = angle_re().captures(raw) {
        let name = caps
            .get(1)
            .map(|m| strip_quotes(m.as_str()))
            .filter(|n| !n.is_empty());
        let address = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|a| !a.is_empty());
        return (name, address);
    }

    match address_re().find(raw) {
        Some(m) => (None, Some(m.as_str().to_string())),
        None => (None, None),
    }
}

/// Strip surrounding single or double quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
