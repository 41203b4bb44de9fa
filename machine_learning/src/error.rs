use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    UnknownParam {
        id: usize,
        len: usize,
    },
    InvalidInput(&'static str),
    MissingForward(&'static str),
    UnscaleTwice,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "invalid tensor shape: {e}"),
            MlErr::UnknownParam { id, len } => write!(
                f,
                "parameter {id} is not registered, the store holds {len} tensors"
            ),
            MlErr::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlErr::MissingForward(layer) => {
                write!(f, "backward called on {layer} without a previous forward pass")
            }
            MlErr::UnscaleTwice => write!(
                f,
                "gradients were already unscaled since the last scaler update"
            ),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
