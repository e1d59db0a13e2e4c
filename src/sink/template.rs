//! Remote schema template: bundled payload and version extraction.

use crate::error::ConfigurationError;
use regex::bytes::Regex;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::OnceLock;

/// Template shipped with the crate and installed on the remote store.
pub const BUNDLED_TEMPLATE: &[u8] = include_bytes!("../../resources/index_template.json");

/// Settings key carrying the schema version inside a template document.
pub const VERSION_KEY: &str = "monitoring.index_format";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let expr = format!(r#"{}"\s*:\s*"?(\d+)"?"#, regex::escape(VERSION_KEY));
        Regex::new(&expr).expect("template version pattern is a valid regex")
    })
}

/// Positive schema version parsed out of a template document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(NonZeroU32);

impl SchemaVersion {
    pub fn new(version: u32) -> Option<Self> {
        NonZeroU32::new(version).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Extract the version from raw template bytes. `None` when the key is
    /// absent, not a number, or not positive.
    pub fn from_template(template: &[u8]) -> Option<Self> {
        raw_version(template)
            .and_then(|v| u32::try_from(v).ok())
            .and_then(Self::new)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Any non-negative version number found in a template, zero included.
fn raw_version(template: &[u8]) -> Option<u64> {
    let captures = version_pattern().captures(template)?;
    let digits = std::str::from_utf8(captures.get(1)?.as_bytes()).ok()?;
    digits.parse().ok()
}

/// A template payload whose version has been validated.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    body: Vec<u8>,
    version: SchemaVersion,
}

impl IndexTemplate {
    /// Validate a template payload; a missing or non-positive version is fatal.
    pub fn from_bytes(body: impl Into<Vec<u8>>) -> Result<Self, ConfigurationError> {
        let body = body.into();
        serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| ConfigurationError::InvalidTemplate(e.to_string()))?;
        let version =
            SchemaVersion::from_template(&body).ok_or(ConfigurationError::MissingSchemaVersion)?;
        Ok(Self { body, version })
    }

    pub fn bundled() -> Result<Self, ConfigurationError> {
        Self::from_bytes(BUNDLED_TEMPLATE)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }
}

/// Outcome of comparing an installed template against the bundled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateDecision {
    /// Installed version is at least the expected one.
    Accept(u64),
    /// Installed template carries no readable version; left as is.
    AcceptUnversioned,
    /// Installed template is older, possibly version zero; upload the bundled one.
    Replace(u64),
}

pub fn compare_installed(installed: &[u8], expected: SchemaVersion) -> TemplateDecision {
    match raw_version(installed) {
        None => TemplateDecision::AcceptUnversioned,
        Some(found) if found >= u64::from(expected.get()) => TemplateDecision::Accept(found),
        Some(found) => TemplateDecision::Replace(found),
    }
}
