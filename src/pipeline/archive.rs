//! ZIP package rewriting shared by the ODT and DOCX fillers.
//!
//! Office documents are ZIP archives of XML parts plus media. Filling only
//! touches a handful of XML parts, so every other entry is copied with
//! [`ZipWriter::raw_copy_file`]: the compressed bytes and local header pass
//! through untouched, entry order is kept (ODT requires the stored
//! `mimetype` entry to stay first), and nothing is recompressed.
//!
//! Rewritten parts keep their original compression method, timestamp and
//! permissions. Entries without a usable timestamp get the ZIP epoch rather
//! than the wall clock, so filling the same template with the same values
//! always yields byte-identical output.

use crate::error::RenderError;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Upper bound on the initial buffer for one part. The declared size comes
/// from the archive header and is not trusted.
const MAX_PREALLOC: u64 = 16 << 20;

fn prealloc(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

fn zip_err(context: &'static str) -> impl Fn(ZipError) -> RenderError {
    move |e| RenderError::format(format!("{context}: {e}"))
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, RenderError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(zip_err("not a readable ZIP package"))
}

/// Read one part of the package as UTF-8 text.
pub fn read_part(bytes: &[u8], name: &str) -> Result<String, RenderError> {
    let mut archive = open(bytes)?;
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => RenderError::format(format!("invalid document: {name} not found")),
        other => RenderError::format(format!("cannot open {name}: {other}")),
    })?;
    let mut raw = Vec::with_capacity(prealloc(entry.size()));
    entry
        .read_to_end(&mut raw)
        .map_err(|e| RenderError::format(format!("cannot decompress {name}: {e}")))?;
    String::from_utf8(raw).map_err(|_| RenderError::format(format!("{name} is not valid UTF-8")))
}

/// Rebuild the package, passing every part accepted by `select` through
/// `transform`. Fails when `required` is absent from the package.
///
/// Returns the new package bytes.
pub fn rewrite_parts<S, T>(
    template: &[u8],
    required: &str,
    mut select: S,
    mut transform: T,
) -> Result<Vec<u8>, RenderError>
where
    S: FnMut(&str) -> bool,
    T: FnMut(&str, String) -> Result<String, RenderError>,
{
    let mut archive = open(template)?;
    if !archive.file_names().any(|n| n == required) {
        return Err(RenderError::format(format!(
            "invalid document: {required} not found"
        )));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(template.len() + 4096)));

    for index in 0..archive.len() {
        let name = archive
            .by_index_raw(index)
            .map_err(zip_err("cannot read entry header"))?
            .name()
            .to_string();

        if !select(&name) {
            let entry = archive
                .by_index_raw(index)
                .map_err(zip_err("cannot read entry"))?;
            writer
                .raw_copy_file(entry)
                .map_err(zip_err("cannot copy entry"))?;
            continue;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(zip_err("cannot open XML part"))?;
        let mut options = SimpleFileOptions::default()
            .compression_method(entry.compression())
            .last_modified_time(entry.last_modified().unwrap_or_default());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }
        let mut raw = Vec::with_capacity(prealloc(entry.size()));
        entry
            .read_to_end(&mut raw)
            .map_err(|e| RenderError::format(format!("cannot decompress {name}: {e}")))?;
        drop(entry);

        let text = String::from_utf8(raw)
            .map_err(|_| RenderError::format(format!("{name} is not valid UTF-8")))?;
        let filled = transform(&name, text)?;
        debug!("Rewrote part {} ({} bytes)", name, filled.len());

        writer
            .start_file(name.as_str(), options)
            .map_err(zip_err("cannot start rewritten part"))?;
        writer
            .write_all(filled.as_bytes())
            .map_err(|e| RenderError::format(format!("cannot write {name}: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(zip_err("cannot finalise package"))?;
    Ok(cursor.into_inner())
}
