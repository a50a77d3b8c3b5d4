//! Template expansion for shader sources.
//!
//! `generate` is pure; `generate_file` adds the filesystem step (read the
//! template, write the `_Generated` sibling).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::error::ComputeError;
use super::markup::TagSet;

/// Inserted between the template's stem and extension.
pub const GENERATED_SUFFIX: &str = "_Generated";

/// Applies every tag to one line, in insertion order.
///
/// Each tag replaces all literal occurrences of its placeholder before the
/// next tag is considered, so a value that spells out a later tag's
/// placeholder is itself substituted.
pub fn substitute_line(line: &str, tags: &TagSet) -> String {
    let mut out = line.to_string();
    for tag in tags {
        let placeholder = tag.placeholder();
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, tag.value());
        }
    }
    out
}

/// Expands a whole template. Lines are processed independently and every
/// output line is terminated with `\n`.
pub fn generate(template: &str, tags: &TagSet) -> String {
    let mut out = String::with_capacity(template.len());
    for line in template.lines() {
        out.push_str(&substitute_line(line, tags));
        out.push('\n');
    }
    out
}

/// `dir/Globe.wgsl` -> `dir/Globe_Generated.wgsl`.
pub fn generated_path(template: &Path) -> Result<PathBuf, ComputeError> {
    let stem = template.file_stem().ok_or_else(|| {
        ComputeError::invalid(format!(
            "shader template `{}` has no file name",
            template.display()
        ))
    })?;

    let mut name = OsString::from(stem);
    name.push(GENERATED_SUFFIX);
    if let Some(ext) = template.extension() {
        name.push(".");
        name.push(ext);
    }

    Ok(template.with_file_name(name))
}

/// Reads `template`, expands `tags` and writes the result next to it.
///
/// Any previous artifact is overwritten. The output is staged in a
/// `.partial` sibling and renamed into place, so a failed write never leaves
/// a truncated artifact under the final name.
pub fn generate_file(template: &Path, tags: &TagSet) -> Result<PathBuf, ComputeError> {
    let out_path = generated_path(template)?;

    let source =
        std::fs::read_to_string(template).map_err(|e| ComputeError::io(template, e))?;
    let generated = generate(&source, tags);

    let mut staging = out_path.clone().into_os_string();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    if let Err(e) = std::fs::write(&staging, generated) {
        let _ = std::fs::remove_file(&staging);
        return Err(ComputeError::io(&out_path, e));
    }
    if let Err(e) = std::fs::rename(&staging, &out_path) {
        let _ = std::fs::remove_file(&staging);
        return Err(ComputeError::io(&out_path, e));
    }

    log::debug!(
        "generated `{}` from `{}` ({} tags)",
        out_path.display(),
        template.display(),
        tags.len()
    );

    Ok(out_path)
}
