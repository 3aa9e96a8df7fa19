//! Keyword-based intent classification.
//!
//! Maps a free-text utterance to the [`Target`] that should handle it. The
//! decision is driven entirely by [`ROUTING_RULES`]: an ordered table of
//! `(target, keywords)` pairs evaluated top to bottom. The first rule with
//! any keyword contained in the lowercased input wins; when nothing matches
//! the request goes to [`Target::Orchestrator`].
//!
//! Keywords overlap between rules (e.g. `"last"` for knowledge and
//! `"last week"` for database), so order decides. A message mentioning both
//! an upload and `"last"` routes to the collector.
//!
//! ```rust
//! use agent_console::classify::classify;
//! use agent_console::target::Target;
//!
//! assert_eq!(classify("Transform BestBuy data to Walmart format"), Target::Transformer);
//! assert_eq!(classify("good morning"), Target::Orchestrator);
//! ```

use serde::Serialize;

use crate::target::Target;

/// Ordered routing table. Earlier rules take priority.
pub const ROUTING_RULES: &[(Target, &[&str])] = &[
    (
        Target::Collector,
        &[
            "upload",
            "scrape",
            "collect",
            "file",
            "attachment",
            "download",
            "extract data",
        ],
    ),
    (
        Target::Knowledge,
        &[
            "knowledge",
            "document",
            "search",
            "find",
            "what were",
            "last",
            "process for",
            "how to",
            "procedure",
            "incorporated",
            "added to",
        ],
    ),
    (
        Target::Database,
        &[
            "how many",
            "sold",
            "database",
            "analytics",
            "report",
            "count",
            "statistics",
            "backup",
            "last week",
            "last month",
        ],
    ),
    (
        Target::Transformer,
        &[
            "transform",
            "convert",
            "bestbuy",
            "walmart",
            "format",
            "mapping",
            "template",
        ],
    ),
];

/// Target used when no rule matches.
pub const FALLBACK: Target = Target::Orchestrator;

/// Result of [`explain`]: the chosen target and the keyword that selected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub target: Target,
    /// `None` when the fallback was used.
    pub matched_keyword: Option<&'static str>,
}

/// Route `text` to a target.
pub fn classify(text: &str) -> Target {
    explain(text).target
}

/// Route `text` and report which keyword fired.
///
/// Within a rule, keywords are tried in table order, so the reported keyword
/// is the first one listed that occurs in the input.
pub fn explain(text: &str) -> Classification {
    let normalized = text.to_lowercase();

    for (target, keywords) in ROUTING_RULES {
        if let Some(keyword) = keywords.iter().find(|k| normalized.contains(**k)) {
            return Classification {
                target: *target,
                matched_keyword: Some(*keyword),
            };
        }
    }

    Classification {
        target: FALLBACK,
        matched_keyword: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_beats_every_later_rule() {
        assert_eq!(
            classify("please upload and search this document"),
            Target::Collector
        );
        assert_eq!(classify("upload the last report"), Target::Collector);
        assert_eq!(classify("convert this file to walmart format"), Target::Collector);
    }

    #[test]
    fn test_sales_question_routes_to_database() {
        assert_eq!(classify("How many laptops were sold?"), Target::Database);
        assert_eq!(classify("run a backup now"), Target::Database);
        assert_eq!(classify("monthly analytics please"), Target::Database);
    }

    #[test]
    fn test_sales_question_mentioning_last_routes_to_knowledge() {
        let c = explain("How many laptops were sold last week?");
        assert_eq!(c.target, Target::Knowledge);
        assert_eq!(c.matched_keyword, Some("last"));
    }

    #[test]
    fn test_last_week_goes_to_knowledge_first() {
        // "last" is a knowledge keyword and is checked before "last week".
        let c = explain("what happened last month");
        assert_eq!(c.target, Target::Knowledge);
        assert_eq!(c.matched_keyword, Some("last"));
    }

    #[test]
    fn test_transformer_rule() {
        assert_eq!(
            classify("Transform BestBuy data to Walmart format"),
            Target::Transformer
        );
        assert_eq!(classify("show me the mapping"), Target::Transformer);
    }

    #[test]
    fn test_knowledge_rule() {
        assert_eq!(
            classify("What is the process for onboarding a vendor?"),
            Target::Knowledge
        );
        assert_eq!(classify("how to reset a password"), Target::Knowledge);
    }

    #[test]
    fn test_fallback() {
        assert_eq!(classify(""), Target::Orchestrator);
        assert_eq!(classify("hello there"), Target::Orchestrator);
        assert_eq!(explain("status?").matched_keyword, None);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("UPLOAD FILE"), classify("upload file"));
        assert_eq!(classify("KnOwLeDgE"), Target::Knowledge);
    }

    #[test]
    fn test_substring_match_inside_words() {
        // "profile" contains "file".
        assert_eq!(classify("update my profile"), Target::Collector);
    }

    #[test]
    fn test_synthetic_upload_text_lands_on_collector() {
        assert_eq!(classify("upload file report.pdf"), Target::Collector);
    }

    #[test]
    fn test_rule_table_order() {
        let order: Vec<Target> = ROUTING_RULES.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            order,
            vec![
                Target::Collector,
                Target::Knowledge,
                Target::Database,
                Target::Transformer
            ]
        );
        assert!(ROUTING_RULES.iter().all(|(_, k)| k
            .iter()
            .all(|kw| kw.to_lowercase() == *kw)));
    }
}
