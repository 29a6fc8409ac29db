//! The per-request input: which template and which values.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One proposal to render.
///
/// JSON uses the camelCase names of the form submission:
///
/// ```json
/// { "templateId": "SD-RESOLV", "formData": { "AC": "Maria", "VALORPROPOSTA": "R$ 1.000,00" } }
/// ```
///
/// Numbers and booleans in `formData` are accepted and kept as their JSON
/// text; `null` becomes an empty value. Nested arrays or objects are
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub template_id: String,
    #[serde(default, deserialize_with = "scalar_map")]
    pub form_data: BTreeMap<String, String>,
}

impl RenderRequest {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            form_data: BTreeMap::new(),
        }
    }

    /// Add one field value.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_data.insert(key.into(), value.into());
        self
    }

    /// Add several field values; later values replace earlier ones.
    pub fn fields<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.form_data
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(serde::de::Error::custom(format!(
                        "formData.{key} must be a string"
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}
