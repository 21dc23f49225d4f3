//! Bird encyclopedia entries.
//!
//! The source document is produced by an external content generator and is
//! not trusted: it is read as untyped JSON and every entry is checked before
//! it reaches a client.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncyclopediaError {
    #[error("encyclopedia io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encyclopedia is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encyclopedia must be a JSON array")]
    NotAnArray,
    #[error("encyclopedia entry {index}: {reason}")]
    Entry { index: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncyclopediaEntry {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Encyclopedia {
    entries: Vec<EncyclopediaEntry>,
}

impl Encyclopedia {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EncyclopediaError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, EncyclopediaError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EncyclopediaError> {
        let Value::Array(raw) = value else {
            return Err(EncyclopediaError::NotAnArray);
        };
        let entries = raw
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                parse_entry(&entry)
                    .map_err(|reason| EncyclopediaError::Entry { index, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[EncyclopediaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(entry: &Value) -> Result<EncyclopediaEntry, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| "expected an object".to_string())?;
    let name = required_text(object.get("name"), "name")?;
    let description = required_text(object.get("description"), "description")?;
    let image = match object.get("image") {
        None | Some(Value::Null) => default_image(&name),
        Some(Value::String(path)) if !path.trim().is_empty() => path.trim().to_string(),
        Some(_) => return Err("image must be a non-empty string".into()),
    };
    Ok(EncyclopediaEntry {
        name,
        description,
        image,
    })
}

fn required_text(value: Option<&Value>, field: &str) -> Result<String, String> {
    match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(format!("missing or empty `{field}`")),
    }
}

fn default_image(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("images/birds/{slug}.png")
}
