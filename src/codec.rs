//! Scannable tool code grammar.
//!
//! Wire format: `tool-<assetTag>-<epochMillis>` where the asset tag matches
//! `[A-Za-z0-9_]+` (case preserved) and the timestamp is a decimal integer.
//! Codes are practically unique per registration event, not cryptographically
//! unique: reusing an asset tag within the same millisecond collides.
//!
//! Decoding is pure syntax validation and never touches storage.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::types::{Error, Result};

/// Prefix shared by every tool code.
pub const CODE_PREFIX: &str = "tool";

#[allow(clippy::expect_used)]
fn asset_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("asset tag pattern compiles"))
}

#[allow(clippy::expect_used)]
fn tool_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^tool-([A-Za-z0-9_]+)-([0-9]+)$").expect("tool code pattern compiles")
    })
}

/// Human-assigned identifier printed on a physical tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetTag(String);

impl AssetTag {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if !asset_tag_regex().is_match(&raw) {
            return Err(Error::validation(format!(
                "asset tag '{}' must match [A-Za-z0-9_]+",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AssetTag {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<AssetTag> for String {
    fn from(tag: AssetTag) -> Self {
        tag.0
    }
}

/// A decoded tool code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCode {
    pub asset_tag: AssetTag,
    /// Issuance time; `None` when the digit run does not fit in a `u64`.
    pub issued_at_ms: Option<u64>,
}

/// Encoder/decoder for scannable tool codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeCodec;

impl CodeCodec {
    /// Encode an asset tag issued at `epoch_millis`.
    pub fn encode(asset_tag: &AssetTag, epoch_millis: u64) -> String {
        format!("{}-{}-{}", CODE_PREFIX, asset_tag.as_str(), epoch_millis)
    }

    /// Encode an asset tag issued at a wall-clock instant.
    ///
    /// Instants before the Unix epoch clamp to zero.
    pub fn encode_at(asset_tag: &AssetTag, issued_at: DateTime<Utc>) -> String {
        let millis = u64::try_from(issued_at.timestamp_millis()).unwrap_or(0);
        Self::encode(asset_tag, millis)
    }

    /// Decode a scanned string into its asset tag.
    pub fn decode(raw: &str) -> Result<AssetTag> {
        Self::decode_full(raw).map(|code| code.asset_tag)
    }

    /// Decode a scanned string, keeping the issuance timestamp.
    pub fn decode_full(raw: &str) -> Result<ToolCode> {
        let caps = tool_code_regex()
            .captures(raw)
            .ok_or_else(|| Error::invalid_format(raw.to_string()))?;

        Ok(ToolCode {
            asset_tag: AssetTag(caps[1].to_string()),
            issued_at_ms: caps[2].parse::<u64>().ok(),
        })
    }
}
