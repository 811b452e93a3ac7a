//! # Reporting Module / 报告模块
//!
//! This module handles the generation and display of run reports in multiple
//! formats. It provides functionality for printing colorful, formatted
//! summaries to the console, writing machine-readable JSON reports and
//! creating styled HTML reports, all with internationalization support.
//!
//! 此模块处理多种格式的运行报告生成和显示。
//! 它提供在控制台打印彩色格式化摘要、写出机器可读 JSON 报告
//! 以及创建样式化 HTML 报告的功能，支持国际化。

pub mod console;
pub mod json;
pub mod html;

// Re-export common reporting functions
pub use console::{print_entry_summary, print_run_summary, print_unexpected_failure_details};
pub use html::generate_html_report;
pub use json::write_json_report;
