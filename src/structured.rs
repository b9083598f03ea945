//! Lenient decoding of the panel's structured reply.
//!
//! Models asked for JSON often wrap it in prose or code fences. The decode
//! keeps only the span between the first `{` and the last `}`; anything that
//! still fails to decode is replaced by [`fallback_record`] so downstream
//! stages always receive a well-typed record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CouncilError;

/// Keys of the three panel lenses, in display order.
pub const PANEL_KEYS: [&str; 3] = ["legal", "risk", "data"];

const FALLBACK_ANALYSIS: &str =
    "Analysis unavailable: the panel reply could not be decoded. Review this area manually.";

/// Severity flag attached to a finding or a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Ok,
    Warning,
    Critical,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Ok => "🟢",
            Self::Warning => "🟠",
            Self::Critical => "🔴",
        }
    }

    /// Parse the spellings models actually produce: words, colours, emoji.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "🟢" | "ok" | "green" | "low" => Some(Self::Ok),
            "🟠" | "🟡" | "warning" | "orange" | "amber" | "medium" => Some(Self::Warning),
            "🔴" | "critical" | "red" | "high" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Flag::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown flag: {raw:?}")))
    }
}

/// One lens of the panel review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(alias = "analyse")]
    pub analysis: String,
    pub flag: Flag,
}

impl Finding {
    pub fn new(analysis: impl Into<String>, flag: Flag) -> Self {
        Self {
            analysis: analysis.into(),
            flag,
        }
    }
}

/// Mapping of lens name to finding, decoded from model output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredRecord(pub BTreeMap<String, Finding>);

impl StructuredRecord {
    pub fn get(&self, key: &str) -> Option<&Finding> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn flags(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.values().map(|f| f.flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Finding)> {
        self.0.iter()
    }
}

/// Structured reply plus whether it was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Structured {
    pub record: StructuredRecord,
    pub fallback_used: bool,
}

/// Decode the span between the first `{` and the last `}` of `raw`.
pub fn lenient_decode(raw: &str) -> Result<StructuredRecord, CouncilError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(CouncilError::SchemaParse(
            "no brace-delimited payload in reply".to_string(),
        ));
    };
    if end < start {
        return Err(CouncilError::SchemaParse(
            "closing brace precedes opening brace".to_string(),
        ));
    }

    let record: StructuredRecord = serde_json::from_str(&raw[start..=end])
        .map_err(|e| CouncilError::SchemaParse(format!("structured reply: {e}")))?;

    if record.is_empty() {
        return Err(CouncilError::SchemaParse(
            "structured reply has no findings".to_string(),
        ));
    }
    Ok(record)
}

/// Record substituted when the panel reply cannot be decoded.
pub fn fallback_record() -> StructuredRecord {
    StructuredRecord(
        PANEL_KEYS
            .iter()
            .map(|k| (k.to_string(), Finding::new(FALLBACK_ANALYSIS, Flag::Warning)))
            .collect(),
    )
}

/// [`lenient_decode`], degrading to [`fallback_record`] on any failure.
pub fn decode_or_fallback(raw: &str) -> Structured {
    match lenient_decode(raw) {
        Ok(record) => Structured {
            record,
            fallback_used: false,
        },
        Err(e) => {
            tracing::warn!(reason = %e, "structured decode failed, using fallback record");
            Structured {
                record: fallback_record(),
                fallback_used: true,
            }
        }
    }
}
