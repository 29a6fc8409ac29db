//! Cleaning and format validation of submitted field values.
//!
//! Every value goes through the same cleanup before it can reach a
//! document: tag-like sequences and control characters are stripped, the
//! value is capped at a maximum number of characters and then trimmed.
//! Format checks run afterwards, per field kind, and all failures are
//! collected so the caller sees every bad field at once.

use crate::catalog::{FieldKind, FieldSpec, TemplateDescriptor};
use crate::error::{FieldViolation, RenderError, ViolationKind};
use crate::pipeline::template::FieldMap;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// C0 controls except tab, LF and CR, plus DEL.
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").unwrap());

static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(R\$\s?)?\d{1,3}(\.\d{3})*(,\d{2})?$").unwrap());

/// Default cap on the length of a single value, in characters.
pub const DEFAULT_MAX_CHARS: usize = 500;

/// A cleaned value and whether it had to be shortened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub value: String,
    pub truncated: bool,
}

/// Clean one raw value.
pub fn sanitize(raw: &str, max_chars: usize) -> Sanitized {
    let without_tags = TAG_RE.replace_all(raw, "");
    let cleaned = CONTROL_RE.replace_all(&without_tags, "");

    let (capped, truncated) = match cleaned.char_indices().nth(max_chars) {
        Some((cut, _)) => (&cleaned[..cut], true),
        None => (&cleaned[..], false),
    };

    Sanitized {
        value: capped.trim().to_string(),
        truncated,
    }
}

/// `dd/mm/yy` or `dd/mm/yyyy` naming a real calendar day. Two-digit years
/// are read as 20YY.
pub fn is_valid_date(value: &str) -> bool {
    parse_date(value).is_some()
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(value)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year_digits = &caps[3];
    let mut year: i32 = year_digits.parse().ok()?;
    if year_digits.len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `R$ 1.234,56`, `1.234,56`, `1234`, with or without the symbol.
pub fn is_valid_currency(value: &str) -> bool {
    CURRENCY_RE.is_match(value)
}

/// Format problem with an already-sanitised value, if any.
///
/// Calculated fields and empty values are never checked.
pub fn check(field: &FieldSpec, value: &str) -> Option<ViolationKind> {
    if field.calculated || value.is_empty() {
        return None;
    }
    match field.kind {
        FieldKind::Date if !is_valid_date(value) => Some(ViolationKind::InvalidDate),
        FieldKind::Currency | FieldKind::CurrencyRaw if !is_valid_currency(value) => {
            Some(ViolationKind::InvalidCurrency)
        }
        _ => None,
    }
}

/// Sanitise and validate the submitted values for every declared field.
///
/// Undeclared keys in `form_data` are dropped. Declared keys that were not
/// submitted come back as empty strings.
pub fn sanitize_fields(
    template: &TemplateDescriptor,
    form_data: &BTreeMap<String, String>,
    max_chars: usize,
) -> Result<FieldMap, RenderError> {
    let mut fields = FieldMap::new();
    let mut violations = Vec::new();

    for decl in &template.fields {
        let raw = form_data.get(&decl.key).map(String::as_str).unwrap_or("");
        let Sanitized { value, truncated } = sanitize(raw, max_chars);
        if truncated {
            warn!(
                "Field '{}' exceeded {} characters and was truncated",
                decl.key, max_chars
            );
        }
        if let Some(problem) = check(decl, &value) {
            violations.push(FieldViolation {
                key: decl.key.clone(),
                label: decl.label.clone(),
                problem,
            });
        }
        fields.insert(decl.key.clone(), value);
    }

    let ignored = form_data
        .keys()
        .filter(|k| template.field(k).is_none())
        .count();
    if ignored > 0 {
        debug!("Ignored {} undeclared field(s)", ignored);
    }

    if violations.is_empty() {
        Ok(fields)
    } else {
        Err(RenderError::Validation { violations })
    }
}
