//! Error type shared by the whole engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::front::Diagnostic;
use crate::pipeline::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or template annotations. Raised before any target runs.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse configuration {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{unit}`: {message}")]
    Parse { unit: String, message: String },

    #[error("template `{template}` declares no type named `{template}`")]
    TemplateNotFound { template: String },

    /// Fatal diagnostics at a checkpoint. `partial` is the tree text at the time of the abort.
    #[error("{} unexpected diagnostic(s) after {stage}", diagnostics.len())]
    Rejected {
        stage: Stage,
        diagnostics: Vec<Diagnostic>,
        partial: String,
    },

    #[error("fixpoint `{pass}` did not converge after {iterations} iterations")]
    NoFixpoint { pass: &'static str, iterations: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
