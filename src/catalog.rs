//! Template catalog: which templates exist and which fields each one takes.
//!
//! The catalog is read-only configuration. It is either the built-in set
//! ([`Catalog::builtin`]) or loaded from JSON, and is validated once on load
//! so the request path can trust it:
//!
//! * template ids match `^[A-Za-z0-9-]+$`, the same allow-list applied to
//!   incoming ids;
//! * template files are bare file names, never paths;
//! * field keys are unique per template and match `^[A-Za-z0-9_]+$`, which is
//!   exactly what the placeholder scanners accept inside `{{ }}`;
//! * formulas only reference fields declared in the same template.
//!
//! JSON layout (field attributes follow the form definitions they came
//! from, hence `type` and `autoFill`):
//!
//! ```json
//! {
//!   "templates": [
//!     {
//!       "id": "SD-RESOLV",
//!       "file": "MODELOA.ODT",
//!       "fields": [
//!         { "key": "DATA", "label": "Data", "type": "date", "autoFill": true },
//!         { "key": "TOTAL", "label": "Total", "type": "currency", "calculated": true,
//!           "formula": { "difference": { "minuend": "VALORPROPOSTA",
//!                                        "subtrahend": "VALORINTERMEDIACAO" } } }
//!       ],
//!       "fileNameFields": { "caseNumber": "PROCESSONUMERO", "name": "AC", "date": "DATA" }
//!     }
//!   ]
//! }
//! ```

use crate::error::RenderError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

static TEMPLATE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());

static FIELD_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// `true` when `id` is safe to use for a catalog lookup.
///
/// This is the path-traversal guard: nothing derived from an id that fails
/// this check may reach the filesystem.
pub fn is_valid_template_id(id: &str) -> bool {
    TEMPLATE_ID_RE.is_match(id)
}

/// Semantic type of a field; drives format validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Date,
    /// Brazilian currency with symbol, e.g. `R$ 1.234,56`.
    Currency,
    /// Brazilian currency without symbol, e.g. `1.234,56`.
    CurrencyRaw,
    Percentage,
}

/// How a calculated field is derived from other fields of its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// `minuend - subtrahend`
    Difference { minuend: String, subtrahend: String },
    /// `percent`% of `of`, rounded half-up to the cent.
    Percentage { of: String, percent: u32 },
}

impl Formula {
    fn inputs(&self) -> Vec<&str> {
        match self {
            Formula::Difference {
                minuend,
                subtrahend,
            } => vec![minuend.as_str(), subtrahend.as_str()],
            Formula::Percentage { of, .. } => vec![of.as_str()],
        }
    }
}

/// One placeholder in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Value is computed rather than typed; skips format validation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub calculated: bool,
    /// Empty dates are filled with the reference date.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_fill: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
}

impl FieldSpec {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            calculated: false,
            auto_fill: false,
            formula: None,
        }
    }

    pub fn auto_filled(mut self) -> Self {
        self.auto_fill = true;
        self
    }

    pub fn calculated(mut self, formula: Formula) -> Self {
        self.calculated = true;
        self.formula = Some(formula);
        self
    }
}

/// Fields whose values make up the attachment file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameFields {
    pub case_number: String,
    pub name: String,
    pub date: String,
}

/// A template and its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDescriptor {
    pub id: String,
    /// File name under the templates directory.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_fields: Option<FileNameFields>,
}

impl TemplateDescriptor {
    /// Path of the backing file under `templates_dir`.
    pub fn path_in(&self, templates_dir: &Path) -> PathBuf {
        templates_dir.join(&self.file)
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    fn validate(&self) -> Result<(), RenderError> {
        let invalid = |msg: String| Err(RenderError::InvalidConfig(msg));

        if !is_valid_template_id(&self.id) {
            return invalid(format!("template id {:?} must match [A-Za-z0-9-]+", self.id));
        }
        let file = Path::new(&self.file);
        if self.file.is_empty()
            || file.file_name().map(|n| n != file.as_os_str()).unwrap_or(true)
            || self.file.contains(['/', '\\'])
        {
            return invalid(format!(
                "template '{}': file {:?} must be a bare file name",
                self.id, self.file
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !FIELD_KEY_RE.is_match(&field.key) {
                return invalid(format!(
                    "template '{}': field key {:?} must match [A-Za-z0-9_]+",
                    self.id, field.key
                ));
            }
            if !seen.insert(field.key.as_str()) {
                return invalid(format!(
                    "template '{}': duplicate field key '{}'",
                    self.id, field.key
                ));
            }
        }

        for field in &self.fields {
            if let Some(formula) = &field.formula {
                if let Some(missing) = formula.inputs().into_iter().find(|k| !seen.contains(k)) {
                    return invalid(format!(
                        "template '{}': formula for '{}' references unknown field '{}'",
                        self.id, field.key, missing
                    ));
                }
            }
        }

        if let Some(names) = &self.file_name_fields {
            for key in [&names.case_number, &names.name, &names.date] {
                if !seen.contains(key.as_str()) {
                    return invalid(format!(
                        "template '{}': file name field '{}' is not declared",
                        self.id, key
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    templates: Vec<TemplateDescriptor>,
}

/// The set of known templates, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: BTreeMap<String, TemplateDescriptor>,
}

impl Catalog {
    /// Build a catalog, validating every descriptor.
    pub fn new(templates: Vec<TemplateDescriptor>) -> Result<Self, RenderError> {
        let mut map = BTreeMap::new();
        for t in templates {
            t.validate()?;
            if map.contains_key(&t.id) {
                return Err(RenderError::InvalidConfig(format!(
                    "duplicate template id '{}'",
                    t.id
                )));
            }
            map.insert(t.id.clone(), t);
        }
        Ok(Self { templates: map })
    }

    /// Parse a JSON catalog (see the module docs for the layout).
    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| RenderError::InvalidConfig(format!("catalog JSON: {e}")))?;
        Self::new(file.templates)
    }

    /// Read and parse a JSON catalog file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RenderError::InvalidConfig(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// The proposal templates shipped with the service.
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates()
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&TemplateDescriptor> {
        self.templates.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateDescriptor> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn builtin_templates() -> Vec<TemplateDescriptor> {
    use FieldKind::{Currency, Date, Text};

    let diff = |a: &str, b: &str| Formula::Difference {
        minuend: a.into(),
        subtrahend: b.into(),
    };
    let pct = |of: &str, percent| Formula::Percentage {
        of: of.into(),
        percent,
    };

    vec![
        TemplateDescriptor {
            id: "RPBANK".into(),
            file: "modeloB.odt".into(),
            description: Some("RPBANK proposal with automatic split calculation".into()),
            fields: vec![
                FieldSpec::new("DATA", "Data", Date).auto_filled(),
                FieldSpec::new("AC", "A/C (Aos Cuidados)", Text),
                FieldSpec::new("REQUERENTE", "Requerente", Text),
                FieldSpec::new("NUMEROPROCESSO", "Número do Processo", Text),
                FieldSpec::new("VALORLIQUIDO", "Valor Líquido", Currency),
                FieldSpec::new("VALORPROPOSTA", "Valor da Proposta", Currency),
                FieldSpec::new("TAXAINTERMEDIACAO", "Taxa de Intermediação", Currency),
                FieldSpec::new("TOTAL", "Valor Total", Currency)
                    .calculated(diff("VALORPROPOSTA", "TAXAINTERMEDIACAO")),
                FieldSpec::new("INTERMEDIACAO", "Intermediação (10%)", Currency)
                    .calculated(pct("TOTAL", 10)),
                FieldSpec::new("PARCERIA", "Parceria (8%)", Currency)
                    .calculated(pct("INTERMEDIACAO", 80)),
                FieldSpec::new("ESCRITORIO", "Escritório (2%)", Currency)
                    .calculated(pct("INTERMEDIACAO", 20)),
            ],
            file_name_fields: Some(FileNameFields {
                case_number: "NUMEROPROCESSO".into(),
                name: "AC".into(),
                date: "DATA".into(),
            }),
        },
        TemplateDescriptor {
            id: "SD-RESOLV".into(),
            file: "MODELOA.ODT".into(),
            description: Some("Simplified SD-RESOLV proposal".into()),
            fields: vec![
                FieldSpec::new("DATA", "Data", Date).auto_filled(),
                FieldSpec::new("AC", "A/C (Aos Cuidados)", Text),
                FieldSpec::new("PROCESSONUMERO", "Número do Processo", Text),
                FieldSpec::new("VALORLIQUIDO", "Valor Líquido", Currency),
                FieldSpec::new("VALORPROPOSTA", "Valor Proposta", Currency),
                FieldSpec::new("VALORINTERMEDIACAO", "Valor de Intermediação", Currency),
                FieldSpec::new("TOTAL", "Total", Currency)
                    .calculated(diff("VALORPROPOSTA", "VALORINTERMEDIACAO")),
            ],
            file_name_fields: Some(FileNameFields {
                case_number: "PROCESSONUMERO".into(),
                name: "AC".into(),
                date: "DATA".into(),
            }),
        },
    ]
}
