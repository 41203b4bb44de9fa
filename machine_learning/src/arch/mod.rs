pub mod layers;
pub mod loss;
mod model;
mod module;

pub use model::Model;
pub use module::{LayerKind, NORM_LAYERS, Submodule};
