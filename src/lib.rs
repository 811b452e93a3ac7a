//! # Stagehand Library / Stagehand 库
//!
//! This library provides the core functionality for the Stagehand tool,
//! a configuration-driven CI stage orchestrator that runs partitioned test
//! suites, fixtures and consistency checks across a matrix of runtime versions.
//!
//! 此库为 Stagehand 工具提供核心功能，
//! 这是一个配置驱动的 CI 阶段编排器，可在运行时版本矩阵上
//! 运行分区测试套件、夹具和一致性检查。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration, data models and the stage execution engine
//! - `infra` - Infrastructure services like process capture and file system operations
//! - `reporting` - Run result reporting and visualization
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置、数据模型和阶段执行引擎
//! - `infra` - 基础设施服务，如进程捕获和文件系统操作
//! - `reporting` - 运行结果报告和可视化
//! - `cli` - 命令行接口和命令

pub mod core;
pub mod infra;
pub mod reporting;
pub mod cli;

// Re-export commonly used items
pub use core::models;
pub use core::config;
pub use core::stage;

/// Build metadata generated by `build.rs`.
pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/version.rs"));
}

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// This function detects the user's system locale and sets the appropriate
/// language for the application's user interface. It attempts to match the full
/// locale (e.g., "zh-CN"), then just the language code (e.g., "en"), and
/// finally falls back to the default language ("en").
pub fn init() {
    // Detect system locale and set it for i18n.
    // Fallback to "en" if detection fails.
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    // Try to match the full locale first (e.g., "zh-CN")
    // Then try to match the language part only (e.g., "en" from "en-US")
    // Finally, fall back to "en"
    let lang = if available_locales.contains(&locale.as_str()) {
        &locale
    } else {
        locale
            .split('-')
            .next()
            .filter(|lang_code| available_locales.contains(lang_code))
            .unwrap_or("en")
    };

    rust_i18n::set_locale(lang);
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
