use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cursor state of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// `{data, pagination?}`: the only response shape consumers should rely on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl NormalizedResponse {
    /// Items of a list response; a single object yields itself.
    pub fn items(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.pagination
            .as_ref()
            .filter(|p| p.has_more)
            .and_then(|p| p.next_cursor.as_deref())
    }

    /// Deserializes `data` into a concrete type.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// Normalizes a raw payload. `null` maps to `None`.
pub fn parse_api_response(raw: &Value) -> Option<NormalizedResponse> {
    if raw.is_null() {
        return None;
    }

    if let Some(results) = raw.get("results").filter(|r| r.is_array()) {
        let has_more = raw.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let next_cursor = raw
            .get("next_cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_owned);
        return Some(NormalizedResponse {
            data: results.clone(),
            pagination: Some(Pagination {
                has_more,
                next_cursor,
            }),
        });
    }

    Some(NormalizedResponse {
        data: raw.clone(),
        pagination: None,
    })
}
