#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "BLING-ERR-PARSE";
pub const ERR_UNSUPPORTED_PATTERN: &str = "BLING-ERR-PATTERN";
pub const ERR_MISSING_HANDLER: &str = "BLING-ERR-HANDLER";
pub const ERR_EXPORT_DETECTION: &str = "BLING-ERR-EXPORTS";
pub const ERR_TEMPLATE: &str = "BLING-ERR-TEMPLATE";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "Only modules that parse cleanly are rewritten.",
        ERR_UNSUPPORTED_PATTERN => {
            "Every declarator pattern is a plain binding, an object pattern or an array pattern."
        }
        ERR_MISSING_HANDLER => "Every serverFn$() call carries the function it extracts.",
        ERR_EXPORT_DETECTION => {
            "Placeholder modules expose exactly the export names of the module they replace."
        }
        ERR_TEMPLATE => "Generated statements are valid JavaScript.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Fatal conditions of a single module compile.
///
/// There is no recoverable path: the tree is rewritten in place, so any of these
/// leaves it in an intermediate state and the caller must discard the module.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("unsupported destructuring shape `{shape}` at offset {offset}")]
    UnsupportedPatternShape { shape: &'static str, offset: u32 },

    #[error("serverFn$() call at offset {offset} has no function argument")]
    MissingHandler { offset: u32 },

    #[error("could not detect the exports of {file}: {reason}")]
    ExportDetection { file: String, reason: String },

    #[error("generated code `{source_text}` failed to parse: {message}")]
    Template { source_text: String, message: String },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Parse { .. } => ERR_PARSE,
            CompileError::UnsupportedPatternShape { .. } => ERR_UNSUPPORTED_PATTERN,
            CompileError::MissingHandler { .. } => ERR_MISSING_HANDLER,
            CompileError::ExportDetection { .. } => ERR_EXPORT_DETECTION,
            CompileError::Template { .. } => ERR_TEMPLATE,
        }
    }

    pub fn guarantee(&self) -> &'static str {
        get_guarantee(self.code())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable form of a [`CompileError`] for JSON and N-API consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn new(error: &CompileError, file: Option<&str>) -> Self {
        Diagnostic {
            code: error.code().to_string(),
            message: error.to_string(),
            guarantee: error.guarantee().to_string(),
            file: file.map(str::to_string),
        }
    }
}
