// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Payload = Map<String, Value>;

/// Satu event trading yang sedang ditulis; tidak disimpan di memori setelahnya.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingEvent {
    pub event_type: String,
    pub payload: Payload,
    pub collection: String,
    pub timestamp: DateTime<Utc>,
}

impl TradingEvent {
    /// Timestamp always comes from the logger's clock, never from the caller.
    pub(crate) fn stamped(event_type: &str, payload: Payload, collection: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
            collection: collection.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Record yang dikirim ke backend (field `timestamp` tetap bertipe waktu).
    pub fn to_record(&self) -> Record {
        Record {
            fields: vec![
                ("event_type".to_string(), FieldValue::Json(Value::String(self.event_type.clone()))),
                ("payload".to_string(), FieldValue::Json(Value::Object(self.payload.clone()))),
                ("collection".to_string(), FieldValue::Json(Value::String(self.collection.clone()))),
                ("timestamp".to_string(), FieldValue::Timestamp(self.timestamp)),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Timestamp(DateTime<Utc>),
}

/// Backend-neutral document: ordered top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.get("timestamp") {
            Some(FieldValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    /// Plain JSON view; timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (k, v) in &self.fields {
            let v = match v {
                FieldValue::Json(j) => j.clone(),
                FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            };
            obj.insert(k.clone(), v);
        }
        Value::Object(obj)
    }
}
