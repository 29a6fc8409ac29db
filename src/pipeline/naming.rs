//! Attachment file names for generated proposals.

use crate::catalog::TemplateDescriptor;
use crate::pipeline::template::FieldMap;
use chrono::{DateTime, Utc};

/// `proposta_<case>_<name>_<date>.<ext>` when the template names its
/// file-naming fields and at least one of them has a value, otherwise
/// `proposta_<id>_<UTC timestamp>.<ext>`.
pub fn attachment_filename(
    template: &TemplateDescriptor,
    fields: &FieldMap,
    extension: &str,
    now: DateTime<Utc>,
) -> String {
    if let Some(names) = &template.file_name_fields {
        let parts: Vec<String> = [&names.case_number, &names.name, &names.date]
            .into_iter()
            .filter_map(|key| fields.get(key.as_str()))
            .map(|v| file_name_part(v))
            .filter(|p| !p.is_empty())
            .collect();
        if !parts.is_empty() {
            return format!("proposta_{}.{extension}", parts.join("_"));
        }
    }
    format!(
        "proposta_{}_{}.{extension}",
        template.id,
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    )
}

/// Keep `[A-Za-z0-9_-]`; `/` becomes `-` so dates stay readable.
fn file_name_part(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '-' => c,
            '/' => '-',
            _ => '_',
        })
        .collect()
}
