mod clip;
mod groups;
mod optimizer;
mod sgd;

pub use clip::clip_grad_norm;
pub use groups::{GroupRole, GroupedParams, group_model_params, group_params};
pub use optimizer::{Optimizer, ParamGroup};
pub use sgd::{Sgd, SgdConfig};
