//! # RustCPN
//!
//! 着色 Petri 网执行引擎：加载网定义，计算可激发迁移，原子地发生迁移（含异步的
//! 提议/提交/撤销流程），并通过 MDP 适配层供策略驱动。
pub mod config;
pub mod expr;
pub mod mdp;
pub mod net;
pub mod options;
pub mod runner;

pub use config::EngineConfig;
pub use net::{BuildError, Color, NetDefinition};
pub use runner::{FireError, FireResult, PendingFire, Runner, Step};
