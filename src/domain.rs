#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved cache key holding the service-discovery endpoint map.
pub const DISCOVERY_KEY: &str = "consul";

pub const SSM_TAG: &str = "$ssm";
pub const KMS_TAG: &str = "$kms";

/// A flat v1 bundle: property name to value, keyed in the cache by
/// `<account>/<region>/<service>`.
pub type PropertyBundle = BTreeMap<String, PropertyValue>;

/// Healthy endpoint addresses per discovered service.
pub type EndpointMap = BTreeMap<String, Vec<String>>;

/// One node of a property tree.
///
/// Variant order matters: serde tries untagged variants top to bottom, so
/// `Null` must precede the scalars and `Int` must precede `Float` for a
/// fraction-free number to stay integral.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// True when this node is a mapping whose sole key is a recognised
    /// secret tag. Such nodes are replaced wholesale during injection.
    pub fn is_secret_stanza(&self) -> bool {
        self.stanza_tag().is_some()
    }

    pub fn stanza_tag(&self) -> Option<&'static str> {
        let PropertyValue::Map(entries) = self else {
            return None;
        };
        if entries.len() != 1 {
            return None;
        }
        if entries.contains_key(SSM_TAG) {
            Some(SSM_TAG)
        } else if entries.contains_key(KMS_TAG) {
            Some(KMS_TAG)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Scalar rendering used by the single-property and conqueso endpoints.
    /// Floats keep their minimal decimal form (`1.5`, not `1.500000`);
    /// compound values have no line form and yield `None`.
    pub fn render_scalar(&self) -> Option<String> {
        match self {
            PropertyValue::String(value) => Some(value.clone()),
            PropertyValue::Int(value) => Some(value.to_string()),
            PropertyValue::Float(value) => Some(value.to_string()),
            PropertyValue::Bool(value) => Some(value.to_string()),
            PropertyValue::Null | PropertyValue::List(_) | PropertyValue::Map(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::List(_) => "list",
            PropertyValue::Map(_) => "map",
        }
    }
}

impl From<PropertyValue> for serde_json::Value {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => serde_json::Value::Null,
            PropertyValue::Bool(inner) => serde_json::Value::Bool(inner),
            PropertyValue::Int(inner) => serde_json::Value::from(inner),
            PropertyValue::Float(inner) => serde_json::Number::from_f64(inner)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::String(inner) => serde_json::Value::String(inner),
            PropertyValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            PropertyValue::Map(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, entry)| (key, entry.into()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Null,
            serde_json::Value::Bool(inner) => PropertyValue::Bool(inner),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(int) => PropertyValue::Int(int),
                None => PropertyValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(inner) => PropertyValue::String(inner),
            serde_json::Value::Array(items) => {
                PropertyValue::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => PropertyValue::Map(
                entries
                    .into_iter()
                    .map(|(key, entry)| (key, entry.into()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_roundtrip_keeps_shapes_distinct() {
        let raw = json!({
            "empty-map": {},
            "empty-list": [],
            "nothing": null,
            "count": 3,
            "ratio": 1.5,
        });
        let parsed: PropertyValue = serde_json::from_value(raw.clone()).expect("parse");

        let PropertyValue::Map(entries) = &parsed else {
            panic!("expected map");
        };
        assert_eq!(entries["empty-map"], PropertyValue::Map(BTreeMap::new()));
        assert_eq!(entries["empty-list"], PropertyValue::List(Vec::new()));
        assert_eq!(entries["nothing"], PropertyValue::Null);
        assert_eq!(entries["count"], PropertyValue::Int(3));
        assert_eq!(entries["ratio"], PropertyValue::Float(1.5));

        let back = serde_json::to_value(&parsed).expect("serialise");
        assert_eq!(back, raw);
    }

    #[test]
    fn stanza_recognition_requires_a_sole_tag_key() {
        let stanza: PropertyValue = serde_json::from_value(json!({
            "$ssm": {"region": "us-east-1", "encrypted": "x"}
        }))
        .expect("parse");
        assert_eq!(stanza.stanza_tag(), Some(SSM_TAG));

        let not_a_stanza: PropertyValue = serde_json::from_value(json!({
            "$ssm": {"region": "us-east-1"},
            "other": 1
        }))
        .expect("parse");
        assert!(!not_a_stanza.is_secret_stanza());

        let kms: PropertyValue = serde_json::from_value(json!({
            "$kms": {"region": "us-east-1", "encrypted": "x"}
        }))
        .expect("parse");
        assert_eq!(kms.stanza_tag(), Some(KMS_TAG));
    }

    #[test]
    fn scalar_rendering_matches_wire_format() {
        assert_eq!(
            PropertyValue::String("x".into()).render_scalar().as_deref(),
            Some("x")
        );
        assert_eq!(PropertyValue::Int(1).render_scalar().as_deref(), Some("1"));
        assert_eq!(
            PropertyValue::Float(1.5).render_scalar().as_deref(),
            Some("1.5")
        );
        assert_eq!(
            PropertyValue::Bool(true).render_scalar().as_deref(),
            Some("true")
        );
        assert!(PropertyValue::Null.render_scalar().is_none());
        assert!(PropertyValue::List(vec![]).render_scalar().is_none());
    }
}
