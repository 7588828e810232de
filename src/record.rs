//! Configured records: owner name, resource record and health-check settings.

use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::txt::RDataParser;
use std::str::FromStr;
use std::time::Duration;

use crate::config::RecordConfig;
use crate::error::DnsError;

/// TTL used when the record text does not carry one.
pub const DEFAULT_TTL: u32 = 3600;

/// A health-checked record as read from configuration. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ConfiguredRecord {
    /// The resource record served while the check passes.
    pub record: Record,
    /// Check command, binary first.
    pub command: Vec<String>,
    /// Time between checks.
    pub interval: Duration,
    /// Upper bound on a single check run.
    pub timeout: Duration,
}

impl ConfiguredRecord {
    /// Build from a configuration entry.
    pub fn from_config(config: &RecordConfig, default_timeout: Duration) -> Result<Self, DnsError> {
        let name = parse_name(&config.name)?;
        let record = parse_record(name, &config.rr)?;

        let command = config.command.argv();
        if command.is_empty() {
            return Err(DnsError::Config(format!(
                "record {}: command is empty",
                config.name
            )));
        }

        Ok(Self {
            record,
            command,
            interval: Duration::from_secs(config.interval),
            timeout: config
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        })
    }

    /// Owner name of the record.
    pub fn name(&self) -> &Name {
        self.record.name()
    }

    /// Type of the record.
    pub fn record_type(&self) -> RecordType {
        self.record.record_type()
    }
}

/// Parse an owner name; relative names are taken as fully qualified.
pub fn parse_name(name: &str) -> Result<Name, DnsError> {
    let mut parsed = Name::from_ascii(name).map_err(|e| DnsError::record(name, e))?;
    parsed.set_fqdn(true);
    Ok(parsed)
}

/// Parse `[ttl] [class] TYPE RDATA` into a record owned by `name`.
///
/// TTL and class may appear in either order. Only the IN class is accepted.
pub fn parse_record(name: Name, text: &str) -> Result<Record, DnsError> {
    let full = || format!("{} {}", name, text.trim());

    let mut ttl = None;
    let mut class = None;
    let mut rest = text.trim();

    let rtype = loop {
        let (token, tail) =
            next_token(rest).ok_or_else(|| DnsError::record(full(), "missing record type"))?;

        if ttl.is_none() && token.bytes().all(|b| b.is_ascii_digit()) {
            let value = token
                .parse::<u32>()
                .map_err(|e| DnsError::record(full(), format!("invalid TTL: {e}")))?;
            ttl = Some(value);
        } else if class.is_none() && DNSClass::from_str(token).is_ok() {
            class = DNSClass::from_str(token).ok();
        } else {
            let rtype = RecordType::from_str(token)
                .map_err(|_| DnsError::record(full(), format!("unknown record type {token}")))?;
            rest = tail;
            break rtype;
        }

        rest = tail;
    };

    if let Some(class) = class {
        if class != DNSClass::IN {
            return Err(DnsError::record(
                full(),
                format!("class {class} is not supported"),
            ));
        }
    }

    if rest.is_empty() {
        return Err(DnsError::record(full(), "missing record data"));
    }

    let rdata =
        RData::try_from_str(rtype, rest).map_err(|e| DnsError::record(full(), e.to_string()))?;

    let mut record = Record::from_rdata(name, ttl.unwrap_or(DEFAULT_TTL), rdata);
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}

/// Split off the first whitespace-delimited token.
fn next_token(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(end) => Some((&text[..end], text[end..].trim_start())),
        None => Some((text, "")),
    }
}
