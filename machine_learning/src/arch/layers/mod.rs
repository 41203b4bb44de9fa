mod linear;
mod norm;
mod pool;
mod silu;

pub use linear::Linear;
pub use norm::BatchNorm1d;
pub use pool::GlobalAvgPool;
pub use silu::Silu;
