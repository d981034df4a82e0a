//! Permission Controller
//!
//! Stateless evaluation of per-request rules against the static security
//! policy: operation-mode permission, character-entropy bounds, and the
//! forbidden-keyword blacklist. All three checks are pure functions of the
//! input and the immutable configuration.

use crate::config::Config;
use crate::topology::is_separator;
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluates security-policy rules for one request
#[derive(Clone)]
pub struct PermissionController {
    config: Arc<Config>,
}

impl PermissionController {
    pub fn new(config: Arc<Config>) -> Self {
        PermissionController { config }
    }

    /// Whether `operation` is permitted under the configured mode
    ///
    /// `read_only` permits exactly `SELECT`; `read_write` permits anything;
    /// any other mode consults the allowed-operations list. All comparisons
    /// are case-insensitive.
    pub fn check_operation_permission(&self, operation: &str) -> bool {
        match self.config.security.mode.as_str() {
            "read_only" => operation.eq_ignore_ascii_case("SELECT"),
            "read_write" => true,
            _ => self
                .config
                .security
                .allowed_operations
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(operation)),
        }
    }

    /// Whether the input's character entropy falls inside the configured bounds
    pub fn check_semantic_safety(&self, input: &str) -> bool {
        let entropy = calculate_entropy(input);
        let validation = &self.config.security.input_validation;
        entropy >= validation.min_entropy && entropy <= validation.max_entropy
    }

    /// First forbidden keyword found in the input, searched case-insensitively
    /// as a substring, in configured order
    pub fn check_forbidden_keywords<'a>(&'a self, input: &str) -> Option<&'a str> {
        let lower_input = input.to_lowercase();
        self.config
            .security
            .forbidden_keywords
            .iter()
            .find(|keyword| lower_input.contains(&keyword.to_lowercase()))
            .map(String::as_str)
    }
}

/// Shannon entropy (base 2) over the multiset of non-separator characters
///
/// Position is ignored; only character counts matter. Empty or
/// separator-only input yields 0.
pub fn calculate_entropy(input: &str) -> f32 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    let mut total: u32 = 0;

    for ch in input.chars() {
        if is_separator(ch) {
            continue;
        }
        *counts.entry(ch).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return 0.0;
    }

    let total = total as f32;
    let mut entropy = 0.0f32;
    for count in counts.values() {
        let p = *count as f32 / total;
        entropy -= p * p.log2();
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with(mode: &str, allowed: &[&str]) -> PermissionController {
        let mut config = Config::default();
        config.security.mode = mode.to_string();
        config.security.allowed_operations = allowed.iter().map(|s| s.to_string()).collect();
        PermissionController::new(Arc::new(config))
    }

    #[test]
    fn read_only_permits_only_select() {
        let ctrl = controller_with("read_only", &["SELECT"]);
        assert!(ctrl.check_operation_permission("SELECT"));
        assert!(ctrl.check_operation_permission("select"));
        assert!(!ctrl.check_operation_permission("UPDATE"));
        assert!(!ctrl.check_operation_permission("DROP"));
    }

    #[test]
    fn read_write_permits_anything() {
        let ctrl = controller_with("read_write", &[]);
        assert!(ctrl.check_operation_permission("DELETE"));
        assert!(ctrl.check_operation_permission("whatever"));
    }

    #[test]
    fn restricted_mode_consults_allowed_list() {
        let ctrl = controller_with("restricted", &["SELECT", "SHOW"]);
        assert!(ctrl.check_operation_permission("show"));
        assert!(!ctrl.check_operation_permission("INSERT"));
    }

    #[test]
    fn entropy_of_uniform_pair_is_one_bit() {
        // "aabb" has two symbols at p=0.5 each
        let entropy = calculate_entropy("aabb");
        assert!((entropy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn entropy_ignores_separators_and_position() {
        assert_eq!(calculate_entropy("ab ab"), calculate_entropy("aabb"));
        assert_eq!(calculate_entropy("a,b.a!b"), calculate_entropy("abab"));
    }

    #[test]
    fn entropy_ignores_fullwidth_punctuation() {
        assert_eq!(calculate_entropy("ab，ab。"), calculate_entropy("abab"));
    }

    #[test]
    fn entropy_of_empty_or_blank_input_is_zero() {
        assert_eq!(calculate_entropy(""), 0.0);
        assert_eq!(calculate_entropy("   \t\n"), 0.0);
        assert_eq!(calculate_entropy("...!!!"), 0.0);
    }

    #[test]
    fn single_repeated_character_has_zero_entropy() {
        assert_eq!(calculate_entropy("aaaaaaaa"), 0.0);
    }

    #[test]
    fn forbidden_keyword_matches_substring_case_insensitively() {
        let ctrl = controller_with("read_only", &["SELECT"]);
        assert_eq!(ctrl.check_forbidden_keywords("please drop table users"), Some("DROP"));
        assert_eq!(ctrl.check_forbidden_keywords("select name from t"), None);
    }

    #[test]
    fn forbidden_keyword_returns_first_in_configured_order() {
        let mut config = Config::default();
        config.security.forbidden_keywords =
            vec!["TRUNCATE".to_string(), "DROP".to_string()];
        let ctrl = PermissionController::new(Arc::new(config));
        // Input contains both; configured order wins
        assert_eq!(
            ctrl.check_forbidden_keywords("drop then truncate"),
            Some("TRUNCATE")
        );
    }

    #[test]
    fn multibyte_text_entropy_is_finite_and_positive() {
        let entropy = calculate_entropy("2025年北京销售额超过100万的客户");
        assert!(entropy > 0.5 && entropy < 6.0, "entropy was {entropy}");
    }
}
