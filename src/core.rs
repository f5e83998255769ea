//! # Core Module / 核心模块
//!
//! This module contains the orchestration engine: matrix definition and
//! expansion, environment provisioning, installation, test execution, and
//! result aggregation.
//!
//! 此模块包含编排引擎：矩阵定义与展开、环境准备、安装、测试执行以及结果汇总。

pub mod aggregator;
pub mod config;
pub mod error;
pub mod execution;
pub mod install;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod provision;
pub mod test_runner;

// Re-exports
pub use aggregator::{Aggregator, Report};
pub use config::MatrixDefinition;
pub use execution::Pipeline;
pub use models::{MatrixEntry, Outcome, OverallStatus};
pub use orchestrator::run_matrix;
