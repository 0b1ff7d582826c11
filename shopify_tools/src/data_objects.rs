use serde::{Deserialize, Serialize};

/// A key/value pair attached to an order. Ticket references are stored here under the `ticketNumber` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CustomAttribute {
    pub key: String,
    pub value: Option<String>,
}

impl CustomAttribute {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self { key: key.into(), value: Some(value.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSettings {
    pub name: String,
    pub taxes_included: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserError {
    pub field: Option<Vec<String>>,
    pub message: String,
}

impl UserError {
    pub fn join(errors: &[UserError]) -> String {
        errors
            .iter()
            .map(|e| match &e.field {
                Some(f) => format!("{}: {}", f.join("."), e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<String>>()
            .join(", ")
    }
}
