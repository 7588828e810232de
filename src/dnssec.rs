//! Per-name response extensions, currently DNSSEC awareness.
//!
//! A name with DNSSEC enabled serves its configured DNSKEY records (as
//! static, always-enabled store entries) and answers queries carrying the
//! EDNS DO bit with an OPT record that has DO set. Records are not signed.

use hickory_proto::op::Edns;
use hickory_proto::rr::{Name, Record, RecordType};
use std::fmt::Debug;

use crate::config::DnssecConfig;
use crate::error::DnsError;
use crate::record::parse_record;

/// UDP payload size advertised in DNSSEC-aware responses.
pub const DNSSEC_MAX_PAYLOAD: u16 = 1220;

/// Capability the responder consults for names that configure one.
pub trait ResponseExtension: Debug + Send + Sync {
    /// EDNS record to attach to a response, given the request's EDNS.
    fn response_edns(&self, request: Option<&Edns>) -> Option<Edns>;
}

/// DNSSEC settings for one owner name.
#[derive(Debug, Clone)]
pub struct DnssecCapability {
    name: Name,
    keys: Vec<Record>,
}

impl DnssecCapability {
    /// Create the capability for `name` with already parsed DNSKEY records.
    pub fn new(name: Name, keys: Vec<Record>) -> Self {
        Self { name, keys }
    }

    /// Build from configuration, parsing each key in `rr` syntax.
    ///
    /// Returns `None` when DNSSEC is not enabled for the name.
    pub fn from_config(name: &Name, config: &DnssecConfig) -> Result<Option<Self>, DnsError> {
        if !config.enabled {
            return Ok(None);
        }

        let keys = config
            .keys
            .iter()
            .map(|text| {
                let record = parse_record(name.clone(), text)?;
                if record.record_type() != RecordType::DNSKEY {
                    return Err(DnsError::record(
                        format!("{name} {text}"),
                        "DNSSEC keys must be DNSKEY records",
                    ));
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self::new(name.clone(), keys)))
    }

    /// Owner name this capability applies to.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// DNSKEY records to serve under the name.
    pub fn keys(&self) -> &[Record] {
        &self.keys
    }
}

impl ResponseExtension for DnssecCapability {
    fn response_edns(&self, request: Option<&Edns>) -> Option<Edns> {
        let request = request?;
        if !request.flags().dnssec_ok {
            return None;
        }

        let mut edns = Edns::new();
        edns.set_version(0);
        edns.set_max_payload(DNSSEC_MAX_PAYLOAD);
        edns.flags_mut().dnssec_ok = true;
        Some(edns)
    }
}
