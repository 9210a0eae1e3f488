use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::response::NormalizedResponse;

/// Title used when an object carries no readable title.
pub const UNTITLED: &str = "Untitled";

/// A remote page: its identifier plus a display title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    /// The object as the API returned it.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl Page {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            raw: Value::Null,
        }
    }

    /// `None` when the object has no string `id`.
    pub fn from_value(object: &Value) -> Option<Self> {
        let id = object.get("id")?.as_str()?;
        Some(Self {
            id: id.to_string(),
            title: extract_title(object),
            raw: object.clone(),
        })
    }
}

/// A remote workspace container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub title: String,
}

impl Workspace {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    pub fn from_value(object: &Value) -> Option<Self> {
        let id = object.get("id")?.as_str()?;
        let title = object
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| extract_title(object));
        Some(Self::new(id, title))
    }
}

/// Workspaces visible to the credential behind a `users/me` response.
///
/// A list payload contributes its `workspace` objects. A bot user contributes
/// the workspace it was installed in.
pub fn workspaces_from_user(response: &NormalizedResponse) -> Vec<Workspace> {
    match &response.data {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.get("object").and_then(Value::as_str) == Some("workspace"))
            .filter_map(Workspace::from_value)
            .collect(),
        user => {
            let Some(bot) = user.get("bot") else {
                return Vec::new();
            };
            let Some(name) = bot.get("workspace_name").and_then(Value::as_str) else {
                return Vec::new();
            };
            let id = bot
                .get("workspace_id")
                .or_else(|| user.get("id"))
                .and_then(Value::as_str)
                .unwrap_or(name);
            let title = if name.is_empty() { UNTITLED } else { name };
            vec![Workspace::new(id, title)]
        }
    }
}

/// Concatenated plain text of an object's title property, or [`UNTITLED`].
///
/// Looks at `properties.title` first, then at any property typed `title`
/// (database rows name theirs freely).
pub fn extract_title(object: &Value) -> String {
    let properties = object.get("properties");
    let runs = properties
        .and_then(|p| p.get("title"))
        .and_then(|t| t.get("title"))
        .and_then(Value::as_array)
        .or_else(|| {
            properties
                .and_then(Value::as_object)?
                .values()
                .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))?
                .get("title")?
                .as_array()
        });

    let title: String = runs
        .map(|runs| runs.iter().map(run_text).collect())
        .unwrap_or_default();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn run_text(run: &Value) -> &str {
    run.get("plain_text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .or_else(|| run.pointer("/text/content").and_then(Value::as_str))
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_joins_plain_text_runs() {
        let page = json!({
            "id": "p1",
            "properties": {"title": {"title": [
                {"plain_text": "Weekly "},
                {"text": {"content": "notes"}}
            ]}}
        });
        assert_eq!(Page::from_value(&page).unwrap().title, "Weekly notes");
    }

    #[test]
    fn database_rows_use_their_title_typed_property() {
        let row = json!({
            "id": "r1",
            "properties": {
                "Status": {"type": "select"},
                "Name": {"type": "title", "title": [{"plain_text": "Row"}]}
            }
        });
        assert_eq!(extract_title(&row), "Row");
    }

    #[test]
    fn missing_or_malformed_titles_become_untitled() {
        assert_eq!(extract_title(&json!({"id": "x"})), UNTITLED);
        assert_eq!(
            extract_title(&json!({"properties": {"title": {"title": "oops"}}})),
            UNTITLED
        );
        assert_eq!(
            extract_title(&json!({"properties": {"title": {"title": []}}})),
            UNTITLED
        );
    }

    #[test]
    fn objects_without_id_are_skipped() {
        assert_eq!(Page::from_value(&json!({"title": "x"})), None);
    }

    #[test]
    fn bot_user_yields_its_workspace() {
        let response = NormalizedResponse {
            data: json!({
                "object": "user",
                "id": "bot-1",
                "type": "bot",
                "bot": {"owner": {"type": "workspace", "workspace": true}, "workspace_name": "Acme"}
            }),
            pagination: None,
        };
        assert_eq!(
            workspaces_from_user(&response),
            vec![Workspace::new("bot-1", "Acme")]
        );
    }

    #[test]
    fn list_payload_keeps_only_workspace_objects() {
        let response = NormalizedResponse {
            data: json!([
                {"object": "workspace", "id": "w1", "name": "One"},
                {"object": "page", "id": "p1"}
            ]),
            pagination: None,
        };
        assert_eq!(
            workspaces_from_user(&response),
            vec![Workspace::new("w1", "One")]
        );
    }

    #[test]
    fn person_user_has_no_workspaces() {
        let response = NormalizedResponse {
            data: json!({"object": "user", "id": "u1", "type": "person"}),
            pagination: None,
        };
        assert!(workspaces_from_user(&response).is_empty());
    }
}
