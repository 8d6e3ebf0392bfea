//! Command executors, one module per verb group.

pub mod deploy;
pub mod images;
pub mod kubeconfig;
pub mod status;
