use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Field inside an ingress TLS entry that holds the certificate id.
pub const TLS_CERT_FIELD: &str = "scaleCert";

/// Application (chart release or app) as listed by the appliance.
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

impl Service {
    /// `config.ixCertificates`, when it is set to something non-empty.
    pub fn certificate_refs(&self) -> Option<&Value> {
        self.config.get("ixCertificates").filter(|refs| is_truthy(refs))
    }

    pub fn uses_certificates(&self) -> bool {
        self.certificate_refs().is_some()
    }

    /// Entries of `config.ingress.main.tls`; empty when any level is missing.
    pub fn main_tls_entries(&self) -> &[Value] {
        self.config
            .pointer("/ingress/main/tls")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Update payload pointing every main ingress TLS entry at `certificate_id`.
    ///
    /// Returns `None` when the service has no main ingress TLS entries. Only the
    /// ingress section is sent; other ingress entries are passed through as-is.
    pub fn repoint_payload(&self, certificate_id: i64) -> Option<Value> {
        if self.main_tls_entries().is_empty() {
            return None;
        }

        let mut ingress = self
            .config
            .get("ingress")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let tls = ingress.pointer_mut("/main/tls").and_then(Value::as_array_mut)?;
        for entry in tls.iter_mut() {
            if let Value::Object(fields) = entry {
                fields.insert(TLS_CERT_FIELD.to_string(), json!(certificate_id));
            }
        }

        Some(json!({ "values": { "ingress": ingress } }))
    }
}

/// Services whose config declares a certificate dependency.
pub fn certificate_dependents(services: Vec<Service>) -> Vec<Service> {
    services
        .into_iter()
        .filter(Service::uses_certificates)
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
