//! Challenge message codec.
//!
//! The challenge is plain text in the sign-in-with-Ethereum layout so any
//! wallet `personal_sign` can produce the signature:
//!
//! ```text
//! api.anons.lol wants you to sign in with your Ethereum account:
//! 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed
//!
//! Sign in to the governance API as an autonomous agent.
//!
//! URI: https://api.anons.lol/auth
//! Version: 1
//! Agent ID: 42
//! Agent Registry: eip155:8453:0x00256C0D814c455425A0699D5eEE2A7DB7A5519c
//! Chain ID: 8453
//! Nonce: 7Hf2kq9ZpL0aXc3VbN8mQ1rT5yW4uE6i
//! Issued At: 2025-01-01T00:00:00.000Z
//! Expiration Time: 2025-01-01T00:05:00.000Z
//! ```
//!
//! Parsing is purely syntactic: no signature, domain, or expiry checks.

use alloy_primitives::Address;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;

/// How long a challenge stays signable after issuance.
pub const MESSAGE_VALIDITY_SECS: i64 = 300;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const VERSION: &str = "1";

const URI: &str = "URI";
const VERSION_LABEL: &str = "Version";
const AGENT_ID: &str = "Agent ID";
const AGENT_REGISTRY: &str = "Agent Registry";
const CHAIN_ID: &str = "Chain ID";
const NONCE: &str = "Nonce";
const ISSUED_AT: &str = "Issued At";
const EXPIRATION_TIME: &str = "Expiration Time";

const LABELS: [&str; 8] = [
    URI,
    VERSION_LABEL,
    AGENT_ID,
    AGENT_REGISTRY,
    CHAIN_ID,
    NONCE,
    ISSUED_AT,
    EXPIRATION_TIME,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageParseError {
    #[error("missing header line")]
    MissingHeader,

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {0}: {1}")]
    InvalidField(&'static str, String),

    #[error("duplicate {0}")]
    DuplicateField(&'static str),

    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
}

/// Inputs for a new challenge. Expiration is derived, never supplied.
#[derive(Debug, Clone)]
pub struct ChallengeParams {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: Option<String>,
    pub agent_id: Option<u64>,
    pub agent_registry: Option<String>,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: Option<String>,
    pub agent_id: Option<u64>,
    pub agent_registry: Option<String>,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
}

impl ChallengeMessage {
    pub fn new(params: ChallengeParams) -> Self {
        // Timestamps are rendered at millisecond precision; truncate up front
        // so the struct and its text agree.
        let issued_at = truncate_millis(params.issued_at);
        Self {
            domain: params.domain,
            address: params.address,
            statement: params.statement,
            uri: params.uri,
            agent_id: params.agent_id,
            agent_registry: params.agent_registry,
            chain_id: params.chain_id,
            nonce: params.nonce,
            issued_at,
            expiration_time: issued_at + TimeDelta::seconds(MESSAGE_VALIDITY_SECS),
        }
    }

    /// Render the canonical text.
    pub fn build(&self) -> String {
        self.to_string()
    }

    pub fn parse(text: &str) -> Result<Self, MessageParseError> {
        text.parse()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_time
    }
}

fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(label: &'static str, raw: &str) -> Result<DateTime<Utc>, MessageParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MessageParseError::InvalidField(label, e.to_string()))
}

impl fmt::Display for ChallengeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{}", self.domain, HEADER_SUFFIX)?;
        writeln!(f, "{}", self.address.to_checksum(None))?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
            writeln!(f)?;
        }
        if let Some(uri) = &self.uri {
            writeln!(f, "{}: {}", URI, uri)?;
        }
        writeln!(f, "{}: {}", VERSION_LABEL, VERSION)?;
        if let Some(agent_id) = self.agent_id {
            writeln!(f, "{}: {}", AGENT_ID, agent_id)?;
        }
        if let Some(registry) = &self.agent_registry {
            writeln!(f, "{}: {}", AGENT_REGISTRY, registry)?;
        }
        writeln!(f, "{}: {}", CHAIN_ID, self.chain_id)?;
        writeln!(f, "{}: {}", NONCE, self.nonce)?;
        writeln!(f, "{}: {}", ISSUED_AT, format_time(&self.issued_at))?;
        write!(
            f,
            "{}: {}",
            EXPIRATION_TIME,
            format_time(&self.expiration_time)
        )
    }
}

/// Split `"Label: value"` when the label is one we know.
fn split_field(line: &str) -> Option<(&'static str, &str)> {
    let (label, value) = line.split_once(": ")?;
    LABELS
        .iter()
        .find(|known| **known == label)
        .map(|known| (*known, value))
}

fn set_once<'a>(
    slot: &mut Option<&'a str>,
    label: &'static str,
    value: &'a str,
) -> Result<(), MessageParseError> {
    if slot.is_some() {
        return Err(MessageParseError::DuplicateField(label));
    }
    *slot = Some(value);
    Ok(())
}

impl FromStr for ChallengeMessage {
    type Err = MessageParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();

        let domain = lines
            .first()
            .and_then(|l| l.strip_suffix(HEADER_SUFFIX))
            .filter(|d| !d.is_empty())
            .ok_or(MessageParseError::MissingHeader)?
            .to_string();

        let address_line = lines
            .get(1)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .ok_or(MessageParseError::MissingField("address"))?;
        let address = Address::from_str(address_line)
            .map_err(|e| MessageParseError::InvalidField("address", e.to_string()))?;

        let mut rest = lines.get(2..).unwrap_or(&[]);
        if let Some((first, tail)) = rest.split_first() {
            if !first.is_empty() {
                return Err(MessageParseError::UnexpectedLine(first.to_string()));
            }
            rest = tail;
        }

        // Optional statement: a free-text line followed by a blank line.
        let mut statement = None;
        if let Some((first, tail)) = rest.split_first() {
            if split_field(first).is_none() && !first.is_empty() {
                match tail.split_first() {
                    Some((blank, tail)) if blank.is_empty() => {
                        statement = Some(first.to_string());
                        rest = tail;
                    }
                    _ => return Err(MessageParseError::UnexpectedLine(first.to_string())),
                }
            }
        }

        let mut uri = None;
        let mut version = None;
        let mut agent_id = None;
        let mut agent_registry = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;

        for line in rest {
            let (label, value) =
                split_field(line).ok_or_else(|| MessageParseError::UnexpectedLine(line.to_string()))?;
            let slot = match label {
                URI => &mut uri,
                VERSION_LABEL => &mut version,
                AGENT_ID => &mut agent_id,
                AGENT_REGISTRY => &mut agent_registry,
                CHAIN_ID => &mut chain_id,
                NONCE => &mut nonce,
                ISSUED_AT => &mut issued_at,
                _ => &mut expiration_time,
            };
            set_once(slot, label, value)?;
        }

        if let Some(v) = version {
            if v != VERSION {
                return Err(MessageParseError::InvalidField(VERSION_LABEL, v.to_string()));
            }
        }

        let nonce = nonce
            .filter(|n| !n.is_empty())
            .ok_or(MessageParseError::MissingField(NONCE))?
            .to_string();

        let chain_id = chain_id
            .ok_or(MessageParseError::MissingField(CHAIN_ID))?
            .parse::<u64>()
            .map_err(|e| MessageParseError::InvalidField(CHAIN_ID, e.to_string()))?;

        let agent_id = agent_id
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|e| MessageParseError::InvalidField(AGENT_ID, e.to_string()))
            })
            .transpose()?;

        let issued_at = parse_time(
            ISSUED_AT,
            issued_at.ok_or(MessageParseError::MissingField(ISSUED_AT))?,
        )?;
        let expiration_time = parse_time(
            EXPIRATION_TIME,
            expiration_time.ok_or(MessageParseError::MissingField(EXPIRATION_TIME))?,
        )?;

        Ok(Self {
            domain,
            address,
            statement,
            uri: uri.map(str::to_string),
            agent_id,
            agent_registry: agent_registry.map(str::to_string),
            chain_id,
            nonce,
            issued_at,
            expiration_time,
        })
    }
}

/// Fields the legacy login reads from a free-form signed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyClaims {
    pub address: Address,
    pub nonce: String,
}

/// Extract the `Address:` and `Nonce:` lines from a legacy message.
///
/// Anything else in the message is ignored.
pub fn parse_legacy(text: &str) -> Result<LegacyClaims, MessageParseError> {
    let mut address = None;
    let mut nonce = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(raw) = line.strip_prefix("Address: ") {
            let parsed = Address::from_str(raw.trim())
                .map_err(|e| MessageParseError::InvalidField("address", e.to_string()))?;
            address.get_or_insert(parsed);
        } else if let Some(raw) = line.strip_prefix("Nonce: ") {
            nonce.get_or_insert(raw.trim().to_string());
        }
    }

    Ok(LegacyClaims {
        address: address.ok_or(MessageParseError::MissingField("address"))?,
        nonce: nonce
            .filter(|n| !n.is_empty())
            .ok_or(MessageParseError::MissingField(NONCE))?,
    })
}
