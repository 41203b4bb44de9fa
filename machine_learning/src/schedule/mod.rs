mod lambda;
mod warmup;

pub use lambda::{LambdaLr, LrLambda};
pub use warmup::{Warmup, WarmupConfig, interp};
