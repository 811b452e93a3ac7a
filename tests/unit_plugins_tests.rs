//! # Plugin Probe Parsing Unit Tests / 插件探测解析单元测试
//!
//! This module contains unit tests for the probe output parser of the
//! `plugins.rs` module, which accepts plugin names either as plain strings
//! or as objects with a `name` field.
//!
//! 此模块包含 `plugins.rs` 模块探测输出解析器的单元测试，
//! 解析器接受纯字符串或带 `name` 字段对象形式的插件名称。

use stagehand::core::plugins::parse_active_plugins;

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn test_parses_an_array_of_names() {
        let names = parse_active_plugins(r#"["auth", "metrics"]"#).unwrap();
        assert_eq!(names, vec!["auth", "metrics"]);
    }

    #[test]
    fn test_parses_an_array_of_objects() {
        let stdout = r#"[{"name": "auth", "version": "1.2.0"}, {"name": "metrics"}]"#;
        let names = parse_active_plugins(stdout).unwrap();
        assert_eq!(names, vec!["auth", "metrics"]);
    }

    #[test]
    fn test_parses_mixed_entries() {
        let stdout = r#"["auth", {"name": "metrics"}]"#;
        let names = parse_active_plugins(stdout).unwrap();
        assert_eq!(names, vec!["auth", "metrics"]);
    }

    #[test]
    fn test_parses_an_empty_array() {
        let names = parse_active_plugins("[]").unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        let names = parse_active_plugins("\n  [\"auth\"]\n").unwrap();
        assert_eq!(names, vec!["auth"]);
    }
}

#[cfg(test)]
mod parse_error_tests {
    use super::*;

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = parse_active_plugins("not json").unwrap_err();
        assert!(err.contains("probe output is not valid JSON"));
    }

    #[test]
    fn test_non_array_output_is_rejected() {
        let err = parse_active_plugins(r#"{"plugins": []}"#).unwrap_err();
        assert_eq!(err, "probe output is not a JSON array");
    }

    #[test]
    fn test_object_without_name_is_rejected() {
        let err = parse_active_plugins(r#"[{"version": "1.0"}]"#).unwrap_err();
        assert!(err.contains("probe entry has no 'name' field"));
    }

    #[test]
    fn test_numeric_entry_is_rejected() {
        let err = parse_active_plugins("[42]").unwrap_err();
        assert!(err.contains("unexpected probe entry: 42"));
    }
}
