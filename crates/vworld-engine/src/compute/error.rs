use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the compute core.
///
/// Every variant propagates synchronously out of [`ComputeShader::dispatch`].
/// None of them leaves a half-initialized shader behind: after an `Io` or
/// `ShaderCompilation` error the shader is still uninitialized and the next
/// dispatch retries the whole initialization.
///
/// [`ComputeShader::dispatch`]: super::ComputeShader::dispatch
#[derive(Debug, Error)]
pub enum ComputeError {
    /// A required construction parameter was missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The template could not be read or the generated source could not be written.
    #[error("shader source i/o failed for `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler rejected the generated source. `diagnostics` is the
    /// compiler output, verbatim.
    #[error("failed to compile `{entry_point}` from `{}`:\n{diagnostics}", path.display())]
    ShaderCompilation {
        path: PathBuf,
        entry_point: String,
        diagnostics: String,
    },

    /// The device refused to issue the dispatch (no kernel bound, missing view, ...).
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl ComputeError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
