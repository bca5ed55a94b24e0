//! Request/response body shapes (§6). Framing (magic/flags/status/id/len)
//! is `rpc-transport`'s job; this module only owns what goes inside the
//! body once the wire header says "two-way, non-event".

use std::collections::BTreeMap;

/// Request body (two-way, non-event) per §6: service path/version, method
/// name, parameter type descriptors, positional arguments, attachments.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RequestBody {
    pub rpc_version: String,
    pub service_path: String,
    pub service_version: String,
    pub method_name: String,
    pub parameter_types: Vec<String>,
    pub arguments: Vec<serde_json::Value>,
    pub attachments: BTreeMap<String, String>,
}

/// Response body per §6: `RESPONSE_WITH_EXCEPTION(0)`, `RESPONSE_VALUE(1)`,
/// or `RESPONSE_NULL_VALUE(2)`; attachments always travel alongside rather
/// than being modeled as the separate 3/4/5 variants, since this
/// reimplementation has exactly one wire serialization and no need to
/// economize on an attachments-absent variant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum ResponseBody {
    Value {
        value: serde_json::Value,
        attachments: BTreeMap<String, String>,
    },
    NullValue {
        attachments: BTreeMap<String, String>,
    },
    Exception {
        exception: serde_json::Value,
        attachments: BTreeMap<String, String>,
    },
    /// No provider is exported for the request's service key on this
    /// connection (§6 wire status `SERVICE_NOT_FOUND`). Kept distinct from
    /// `Exception` so the exchange server can report the more specific
    /// status code rather than folding it into `ServiceError`.
    NotFound {
        message: String,
        attachments: BTreeMap<String, String>,
    },
}

impl ResponseBody {
    pub fn attachments(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Value { attachments, .. }
            | Self::NullValue { attachments }
            | Self::Exception { attachments, .. }
            | Self::NotFound { attachments, .. } => attachments,
        }
    }
}

pub const SERIALIZATION_JSON: u8 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_body_round_trips_through_json() {
        let body = ResponseBody::Value {
            value: serde_json::json!("hello x"),
            attachments: BTreeMap::new(),
        };
        let bytes = serde_json::to_vec(&body).unwrap();
        let decoded: ResponseBody = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(decoded, ResponseBody::Value { .. }));
    }
}
