//! Archival data format for network events
//!
//! These structures are part of the stable output contract: field
//! names must not change.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};

/// Result of a DNS lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalDnsLookupResult {
    pub answers: Vec<ArchivalDnsAnswer>,
    pub engine: String,
    pub failure: Option<String>,
    pub hostname: String,
    pub query_type: String,
    pub resolver_hostname: Option<String>,
    pub resolver_port: Option<String>,
    pub resolver_address: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub t0: f64,
    pub t: f64,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero_id")]
    pub transaction_id: i64,
}

/// A single DNS answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalDnsAnswer {
    pub answer_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6: String,
    pub ttl: Option<u32>,
}

/// Result of a TCP connect attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalTcpConnectResult {
    pub ip: String,
    pub port: u16,
    pub status: ArchivalTcpConnectStatus,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub t0: f64,
    pub t: f64,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero_id")]
    pub transaction_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalTcpConnectStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    pub failure: Option<String>,
    pub success: bool,
}

/// Result of a TLS handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalTlsHandshakeResult {
    pub network: String,
    pub address: String,
    pub cipher_suite: String,
    pub failure: Option<String>,
    pub negotiated_protocol: String,
    pub no_tls_verify: bool,
    #[serde(deserialize_with = "binary::deserialize")]
    pub peer_certificates: Vec<ArchivalBinaryData>,
    pub server_name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub t0: f64,
    pub t: f64,
    pub tags: Vec<String>,
    pub tls_version: String,
    #[serde(default, skip_serializing_if = "is_zero_id")]
    pub transaction_id: i64,
}

/// Bytes serialized as `{"data": "<base64>", "format": "base64"}`, or
/// `null` when empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchivalBinaryData(pub Vec<u8>);

#[derive(Serialize, Deserialize)]
struct BinaryDataRepr {
    data: String,
    format: String,
}

impl Serialize for ArchivalBinaryData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            return serializer.serialize_none();
        }
        BinaryDataRepr {
            data: STANDARD.encode(&self.0),
            format: "base64".to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArchivalBinaryData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Some(repr) = Option::<BinaryDataRepr>::deserialize(deserializer)? else {
            return Ok(Self::default());
        };
        if repr.format != "base64" {
            return Err(serde::de::Error::custom(format!(
                "invalid binary data format: '{}'",
                repr.format
            )));
        }
        STANDARD
            .decode(repr.data)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

mod binary {
    use super::ArchivalBinaryData;
    use serde::{Deserialize, Deserializer};

    /// The peer certificate list is `null` when no certificates were seen.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ArchivalBinaryData>, D::Error> {
        Ok(Option::<Vec<ArchivalBinaryData>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_id(v: &i64) -> bool {
    *v == 0
}
