//! Keyword predicate evaluated per rule.

use messenger_core::rule::{MatchOperator, MatchType, Rule};
use messenger_core::text::normalize;
use regex::RegexBuilder;
use tracing::debug;

/// `true` when `input` satisfies the rule's keywords. A rule without
/// keywords is a catch-all.
pub fn keywords_match(rule: &Rule, input: &str) -> bool {
    let keywords: Vec<&str> = rule
        .keywords
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !k.trim().is_empty())
        .collect();
    if keywords.is_empty() {
        return true;
    }

    let check = |keyword: &str| match rule.match_type {
        MatchType::Regex => regex_matches(rule, keyword, input),
        _ => {
            let haystack = normalize(input, rule.case_sensitive, rule.normalize_accents);
            let needle = normalize(keyword, rule.case_sensitive, rule.normalize_accents);
            match rule.match_type {
                MatchType::Contains => haystack.contains(&needle),
                MatchType::Exact => haystack == needle,
                MatchType::StartsWith => haystack.starts_with(&needle),
                MatchType::Regex => false,
            }
        }
    };

    match rule.match_operator {
        MatchOperator::Any => keywords.into_iter().any(check),
        MatchOperator::All => keywords.into_iter().all(check),
    }
}

/// Patterns are compiled as written; only the input is accent-folded.
/// Invalid patterns never match.
fn regex_matches(rule: &Rule, pattern: &str, input: &str) -> bool {
    let re = match RegexBuilder::new(pattern)
        .case_insensitive(!rule.case_sensitive)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            debug!(rule_id = %rule.id, pattern, error = %e, "Invalid keyword pattern");
            return false;
        }
    };
    let haystack = normalize(input, true, rule.normalize_accents);
    re.is_match(&haystack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use messenger_core::rule::Trigger;
    use uuid::Uuid;

    fn rule(match_type: MatchType, op: MatchOperator, keywords: &[&str]) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            name: "r".into(),
            active: true,
            priority: 0,
            cooldown_secs: 0,
            match_type,
            match_operator: op,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            case_sensitive: false,
            normalize_accents: true,
            trigger: Trigger::AnyMessage,
            page_ids: vec![],
            actions: vec![],
            flow: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_contains_any_with_accent_folding() {
        let r = rule(MatchType::Contains, MatchOperator::Any, &["preço", "valor"]);
        assert!(keywords_match(&r, "qual o preço?"));
        assert!(keywords_match(&r, "QUAL O PRECO"));
        assert!(keywords_match(&r, "e o valor?"));
        assert!(!keywords_match(&r, "bom dia"));
    }

    #[test]
    fn test_accent_sensitive_rule() {
        let mut r = rule(MatchType::Contains, MatchOperator::Any, &["preço"]);
        r.normalize_accents = false;
        assert!(!keywords_match(&r, "qual o preco?"));
        assert!(keywords_match(&r, "qual o PREÇO?"));
    }

    #[test]
    fn test_exact_and_starts_with() {
        let exact = rule(MatchType::Exact, MatchOperator::Any, &["oi"]);
        assert!(keywords_match(&exact, "  Oi "));
        assert!(!keywords_match(&exact, "oi tudo bem"));

        let prefix = rule(MatchType::StartsWith, MatchOperator::Any, &["quero"]);
        assert!(keywords_match(&prefix, "Quero comprar"));
        assert!(!keywords_match(&prefix, "eu quero"));
    }

    #[test]
    fn test_all_operator_requires_every_keyword() {
        let r = rule(MatchType::Contains, MatchOperator::All, &["frete", "sp"]);
        assert!(keywords_match(&r, "frete para SP?"));
        assert!(!keywords_match(&r, "frete para RJ?"));
    }

    #[test]
    fn test_case_sensitive_rule() {
        let mut r = rule(MatchType::Contains, MatchOperator::Any, &["PIX"]);
        r.case_sensitive = true;
        assert!(keywords_match(&r, "aceita PIX?"));
        assert!(!keywords_match(&r, "aceita pix?"));
    }

    #[test]
    fn test_regex_and_invalid_pattern_fails_closed() {
        let r = rule(MatchType::Regex, MatchOperator::Any, &[r"^pedido\s+\d+$"]);
        assert!(keywords_match(&r, "Pedido 123"));
        assert!(!keywords_match(&r, "pedido abc"));

        let broken = rule(MatchType::Regex, MatchOperator::Any, &["(unclosed"]);
        assert!(!keywords_match(&broken, "(unclosed"));
    }

    #[test]
    fn test_empty_keywords_are_catch_all() {
        let r = rule(MatchType::Exact, MatchOperator::All, &[]);
        assert!(keywords_match(&r, "anything"));
        let blank = rule(MatchType::Exact, MatchOperator::All, &["  "]);
        assert!(keywords_match(&blank, ""));
    }

    #[test]
    fn test_repeated_normalization_does_not_change_result() {
        let r = rule(MatchType::Contains, MatchOperator::Any, &["Promoção"]);
        let input = "Tem PROMOÇÃO hoje?";
        let once = normalize(input, false, true);
        let twice = normalize(&once, false, true);
        assert_eq!(keywords_match(&r, input), keywords_match(&r, &once));
        assert_eq!(keywords_match(&r, &once), keywords_match(&r, &twice));
    }
}
