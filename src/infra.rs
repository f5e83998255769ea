//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the orchestrator:
//! command execution, container runtime invocations, and file system
//! operations.
//!
//! 此模块为编排器提供基础设施服务：命令执行、容器运行时调用以及文件系统操作。

pub mod command;
pub mod container;
pub mod fs;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
