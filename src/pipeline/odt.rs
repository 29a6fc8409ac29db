//! OpenDocument text filler.
//!
//! Body text of an ODT lives in `content.xml`. LibreOffice keeps a typed
//! `{{KEY}}` inside a single text span unless the author restyles part of
//! it, so a plain text scan over the part is enough here; DOCX needs the
//! run-aware engine in [`super::docx`].

use crate::error::RenderError;
use crate::pipeline::archive;
use crate::pipeline::template::{DocumentKind, FieldMap, Filler};
use crate::pipeline::xml;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

pub const CONTENT_PART: &str = "content.xml";

/// `{{KEY}}` with optional whitespace inside the braces. Any key without
/// braces, markup or whitespace is a placeholder, so `{{NOME-CLIENTE}}` or
/// `{{CPF.CNPJ}}` never leak into the output even though no field can
/// carry such a key.
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}<>\s]+)\s*\}\}").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct OdtFiller;

impl Filler for OdtFiller {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Odt
    }

    fn fill(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError> {
        archive::rewrite_parts(
            template,
            CONTENT_PART,
            |name| name == CONTENT_PART,
            |_, xml| Ok(substitute(&xml, fields)),
        )
    }
}

/// Replace every placeholder in `text` in a single pass.
///
/// Replacement text is never rescanned, so a value that itself looks like
/// `{{OTHER}}` is inserted literally.
pub(crate) fn substitute(text: &str, fields: &FieldMap) -> String {
    let mut hits = 0usize;
    let out = PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
        hits += 1;
        fields
            .get(&caps[1])
            .map(|v| xml::escape(v).into_owned())
            .unwrap_or_default()
    });
    debug!("Substituted {} placeholder(s)", hits);
    out.into_owned()
}
