//! Auto-filled dates and calculated currency fields.
//!
//! Both steps only ever fill blanks: a value the caller typed is kept as is,
//! even for calculated fields.

use crate::catalog::{FieldKind, Formula, TemplateDescriptor};
use crate::currency::{format_brl, format_brl_raw, parse_brl, percent_of};
use crate::pipeline::template::FieldMap;
use chrono::NaiveDate;
use tracing::debug;

/// `dd/mm/yyyy`, the form the date fields are validated against.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Put `today` into every empty auto-fill date field. Returns how many
/// fields were filled.
pub fn auto_fill_dates(template: &TemplateDescriptor, fields: &mut FieldMap, today: NaiveDate) -> usize {
    let stamp = format_date(today);
    let mut filled = 0;
    for decl in template.fields.iter().filter(|f| f.auto_fill && f.kind == FieldKind::Date) {
        let slot = fields.entry(decl.key.clone()).or_default();
        if slot.is_empty() {
            *slot = stamp.clone();
            filled += 1;
        }
    }
    if filled > 0 {
        debug!("Auto-filled {} date field(s) with {}", filled, stamp);
    }
    filled
}

/// Evaluate formulas for empty calculated fields, in declaration order so
/// later formulas see earlier results. Returns how many fields were set.
///
/// A formula whose inputs are blank or not valid amounts leaves its field
/// empty.
pub fn derive_calculated(template: &TemplateDescriptor, fields: &mut FieldMap) -> usize {
    let mut derived = 0;
    for decl in &template.fields {
        let Some(formula) = decl.formula.as_ref().filter(|_| decl.calculated) else {
            continue;
        };
        if fields.get(&decl.key).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        match evaluate(formula, fields) {
            Some(cents) => {
                let value = match decl.kind {
                    FieldKind::Currency => format_brl(cents),
                    _ => format_brl_raw(cents),
                };
                fields.insert(decl.key.clone(), value);
                derived += 1;
            }
            None => debug!("Left calculated field '{}' empty: inputs missing", decl.key),
        }
    }
    derived
}

fn evaluate(formula: &Formula, fields: &FieldMap) -> Option<i64> {
    let amount = |key: &str| fields.get(key).and_then(|v| parse_brl(v));
    match formula {
        Formula::Difference {
            minuend,
            subtrahend,
        } => amount(minuend)?.checked_sub(amount(subtrahend)?),
        Formula::Percentage { of, percent } => percent_of(amount(of)?, *percent),
    }
}
