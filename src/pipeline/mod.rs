//! Pipeline stages for template filling and PDF conversion.
//!
//! Each submodule implements one step; [`crate::generate`] strings them
//! together.
//!
//! ## Data Flow
//!
//! ```text
//! form data ──▶ sanitize ──▶ derive ──▶ template ──▶ odt / docx ──▶ soffice
//! (raw)         (clean +     (dates,    (read file,  (fill XML      (headless
//!                validate)    formulas)   pick kind)   in the ZIP)    LibreOffice)
//! ```
//!
//! 1. [`sanitize`]: strip markup and control characters, cap length,
//!    check date and currency formats
//! 2. [`derive`]  : fill blank auto-fill dates and calculated amounts
//! 3. [`template`]: template storage access and the [`template::Filler`]
//!    trait, selected by file extension
//! 4. [`odt`] / [`docx`]: placeholder substitution, on top of the shared
//!    [`archive`] rewrite and [`xml`] escaping
//! 5. [`soffice`] : isolated temp files, subprocess with timeout, cleanup
//! 6. [`naming`]  : attachment file name

pub mod archive;
pub mod derive;
pub mod docx;
pub mod naming;
pub mod odt;
pub mod sanitize;
pub mod soffice;
pub mod template;
pub mod xml;
