//! Validation errors.
//!
//! These surface synchronously from element constructors and from
//! [`Circuit::compile`](crate::circuit::Circuit::compile); numerical failures
//! are never reported through this type.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A parameter that must be strictly positive was not.
    #[error("{element}: parameter {param} must be > 0, got {value}")]
    NonPositiveParameter {
        element: String,
        param: &'static str,
        value: f64,
    },

    /// A parameter was NaN or infinite.
    #[error("{element}: parameter {param} is not finite")]
    NonFiniteParameter { element: String, param: &'static str },

    /// A coupling coefficient outside (0, 1].
    #[error("{element}: coupling coefficient must lie in (0, 1], got {value}")]
    InvalidCoupling { element: String, value: f64 },

    /// Both terminals of a two-terminal element name the same node.
    #[error("{element}: terminals short the same node {node:?}")]
    SelfShort { element: String, node: String },

    /// Two elements share a name.
    #[error("duplicate element name {name:?}")]
    DuplicateName { name: String },

    /// A coupling or controlled source references an element that does not
    /// exist or has the wrong kind.
    #[error("{element}: unknown controlling element {reference:?}")]
    UnknownReference { element: String, reference: String },

    /// The referenced controlling element carries no branch current.
    #[error("{element}: controlling element {reference:?} has no branch current")]
    NoBranchCurrent { element: String, reference: String },

    /// Transformer coupling matrix does not match the winding count.
    #[error("{element}: coupling matrix is {rows}x{cols}, expected {expected}x{expected}")]
    CouplingMatrixShape {
        element: String,
        rows: usize,
        cols: usize,
        expected: usize,
    },

    /// A PWL waveform with fewer than one point, or unsorted times.
    #[error("{element}: PWL points must be non-empty with strictly increasing times")]
    InvalidPwl { element: String },

    /// Element with the wrong number of windings (transformer needs >= 2).
    #[error("{element}: transformer needs at least two windings, got {count}")]
    TooFewWindings { element: String, count: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
