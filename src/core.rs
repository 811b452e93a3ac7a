//! # Core Module / 核心模块
//!
//! This module contains the core functionality of Stagehand,
//! including data models, configuration, matrix resolution and stage execution.
//!
//! 此模块包含 Stagehand 的核心功能，
//! 包括数据模型、配置、矩阵解析和阶段执行逻辑。

pub mod models;
pub mod config;
pub mod matrix;
pub mod stage;
pub mod suite;
pub mod fixture;
pub mod plugins;
pub mod docs;

// Re-exports
pub use models::{StageResult, StageStatus};
pub use config::Pipeline;
pub use stage::execute_stage;
