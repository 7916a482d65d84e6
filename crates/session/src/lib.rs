pub mod interpreter;
pub mod optim;
pub mod train;

use std::borrow::Cow;

use thiserror::Error;
use tinyflow_core::graph::GraphError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Errors arised from sorting the graph.
    #[error("Graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Shape mismatch in {op}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{op} expects rank {expected}, got shape {actual:?}")]
    Rank {
        op: &'static str,
        expected: usize,
        actual: Vec<usize>,
    },

    #[error("Ndarray: {0}")]
    Ndarray(#[from] ndarray::ShapeError),

    #[error("{op} takes {expected} inputs, got {actual}")]
    Arity {
        op: &'static str,
        expected: String,
        actual: usize,
    },

    #[error("Empty batch fed to {0}")]
    EmptyBatch(String),

    #[error("No value for {0}")]
    MissingValue(String),

    #[error("No gradient of {node} w.r.t. {wrt}")]
    MissingGradient { node: String, wrt: String },

    /// General error messages.
    #[error("Something went wrong: {0}")]
    Message(Cow<'static, str>),
}
