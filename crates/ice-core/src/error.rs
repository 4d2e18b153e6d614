//! Error types for the thermal simulator.
//!
//! Every fallible operation in the crate returns [`IceError`]. Callers that
//! still speak the integer result-code convention of the network clients can
//! map any error to its negative code with [`IceError::code`].

use thiserror::Error;

use crate::solver::SolverError;

/// Result type alias using [`IceError`].
pub type Result<T> = std::result::Result<T, IceError>;

/// Unified error type for model construction, queries and solves.
#[derive(Error, Debug)]
pub enum IceError {
    // ============ Lookup Errors ============
    /// No stack element carries this id
    #[error("Unknown stack element '{id}'")]
    UnknownStackElement { id: String },

    /// The stack element exists but is not a die with a floorplan
    #[error("Stack element '{id}' is not a die")]
    NotADie { id: String },

    /// The die has no floorplan element to summarise
    #[error("Die '{id}' has an empty floorplan")]
    EmptyFloorplan { id: String },

    /// The die floorplan has no element with this id
    #[error("Unknown floorplan element '{element}' in die '{die}'")]
    UnknownFloorplanElement { die: String, element: String },

    /// The stack element is not a channel, or the outlet does not exist
    #[error("Stack element '{id}' has no channel outlet {outlet}")]
    NoSuchChannelOutlet { id: String, outlet: usize },

    /// Cell coordinates outside the grid
    #[error("Cell (layer {layer}, row {row}, column {column}) is outside the grid")]
    CellOutOfRange {
        layer: usize,
        row: usize,
        column: usize,
    },

    // ============ Configuration Errors ============
    /// Floorplan element snapped onto no grid cell
    #[error("Floorplan element '{element}' covers no grid cell")]
    EmptyFloorplanElement { element: String },

    /// Floorplan element extends past the chip footprint
    #[error("Floorplan element '{element}' is outside the chip area")]
    FloorplanElementOutOfChip { element: String },

    /// Two elements of the same floorplan intersect
    #[error("Floorplan elements '{first}' and '{second}' overlap")]
    OverlappingFloorplanElements { first: String, second: String },

    /// Any other inconsistency in the stack description
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Power vector does not match the number of floorplan elements
    #[error("Expected {expected} power values, got {found}")]
    PowerValueCount { expected: usize, found: usize },

    // ============ Numerical Errors ============
    /// Failure reported by the sparse linear solver
    #[error("Linear solver failure: {0}")]
    Solver(#[from] SolverError),

    // ============ Internal Errors ============
    /// A construction bug, never caused by user input
    #[error("Internal consistency error: {message}")]
    Internal { message: String },

    // ============ I/O Errors ============
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed stack description: {0}")]
    Json(#[from] serde_json::Error),
}

impl IceError {
    /// Create an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        IceError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an internal consistency error.
    pub fn internal(message: impl Into<String>) -> Self {
        IceError::Internal {
            message: message.into(),
        }
    }

    /// Negative result code matching the legacy client protocol.
    pub fn code(&self) -> i32 {
        match self {
            IceError::UnknownStackElement { .. } => -1,
            IceError::NotADie { .. } | IceError::EmptyFloorplan { .. } => -2,
            IceError::UnknownFloorplanElement { .. } => -3,
            IceError::NoSuchChannelOutlet { .. } | IceError::CellOutOfRange { .. } => -4,
            IceError::EmptyFloorplanElement { .. }
            | IceError::FloorplanElementOutOfChip { .. }
            | IceError::OverlappingFloorplanElements { .. } => -5,
            IceError::InvalidConfig { .. } | IceError::Json(_) => -6,
            IceError::PowerValueCount { .. } => -7,
            IceError::Solver(_) => -10,
            IceError::Internal { .. } => -20,
            IceError::Io(_) => -30,
        }
    }

    /// True for errors that indicate a bug rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, IceError::Internal { .. })
    }
}
