//! Tool search strategies.
//!
//! The default strategy ranks tools by how well their tags and description
//! words overlap with the query. Ties keep the repository's insertion order.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use utcp_types::{Tool, UtcpError};

use crate::repository::ToolRepository;

const DEFAULT_DESCRIPTION_WEIGHT: f64 = 1.0;
const DEFAULT_TAG_WEIGHT: f64 = 3.0;
const MIN_DESCRIPTION_WORD_LEN: usize = 3;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word regex should compile"));

/// Ranks repository tools against a free-text query.
#[async_trait::async_trait]
pub trait ToolSearchStrategy: Send + Sync {
    /// Returns at most `limit` tools (all when `limit` is 0), best match first.
    ///
    /// When `any_of_tags_required` is given, only tools carrying at least one
    /// of those tags (case-insensitive) are considered.
    async fn search_tools(
        &self,
        repository: &dyn ToolRepository,
        query: &str,
        limit: usize,
        any_of_tags_required: Option<&[String]>,
    ) -> Result<Vec<Tool>, UtcpError>;
}

/// Scores tags and description words that overlap with the query.
#[derive(Debug, Clone, Copy)]
pub struct TagAndDescriptionWordMatchStrategy {
    pub description_weight: f64,
    pub tag_weight: f64,
}

impl Default for TagAndDescriptionWordMatchStrategy {
    fn default() -> Self {
        Self {
            description_weight: DEFAULT_DESCRIPTION_WEIGHT,
            tag_weight: DEFAULT_TAG_WEIGHT,
        }
    }
}

impl TagAndDescriptionWordMatchStrategy {
    pub fn new(description_weight: f64, tag_weight: f64) -> Self {
        Self {
            description_weight,
            tag_weight,
        }
    }

    /// Ranks an already-fetched tool list.
    pub fn rank(&self, tools: Vec<Tool>, query: &str, limit: usize, any_of_tags_required: Option<&[String]>) -> Vec<Tool> {
        let query_lower = query.to_lowercase();
        let query_words = tokenize_words(&query_lower);

        let required_tags: Option<HashSet<String>> = any_of_tags_required
            .filter(|tags| !tags.is_empty())
            .map(|tags| tags.iter().map(|tag| tag.to_lowercase()).collect());

        let mut scored: Vec<(f64, Tool)> = tools
            .into_iter()
            .filter(|tool| match &required_tags {
                Some(required) => tool.tags.iter().any(|tag| required.contains(&tag.to_lowercase())),
                None => true,
            })
            .map(|tool| (self.score(&tool, &query_lower, &query_words), tool))
            .collect();

        // `sort_by` is stable, so equal scores keep insertion order.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        let take = if limit == 0 { scored.len() } else { limit };
        scored.into_iter().take(take).map(|(_, tool)| tool).collect()
    }

    fn score(&self, tool: &Tool, query_lower: &str, query_words: &HashSet<String>) -> f64 {
        let mut score = 0.0;

        for tag in &tool.tags {
            let tag_lower = tag.to_lowercase();
            if query_lower.contains(&tag_lower) || !tokenize_words(&tag_lower).is_disjoint(query_words) {
                score += self.tag_weight;
            }
        }

        let description_words = tokenize_words(&tool.description.to_lowercase());
        score += description_words
            .iter()
            .filter(|word| word.chars().count() >= MIN_DESCRIPTION_WORD_LEN && query_words.contains(*word))
            .count() as f64
            * self.description_weight;

        score
    }
}

#[async_trait::async_trait]
impl ToolSearchStrategy for TagAndDescriptionWordMatchStrategy {
    async fn search_tools(
        &self,
        repository: &dyn ToolRepository,
        query: &str,
        limit: usize,
        any_of_tags_required: Option<&[String]>,
    ) -> Result<Vec<Tool>, UtcpError> {
        let tools = repository.get_tools().await?;
        Ok(self.rank(tools, query, limit, any_of_tags_required))
    }
}

fn tokenize_words(text: &str) -> HashSet<String> {
    WORD_PATTERN.find_iter(text).map(|word| word.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemToolRepository;
    use utcp_types::{CallTemplate, Manual, TextCallTemplate};

    fn template() -> CallTemplate {
        CallTemplate::Text(TextCallTemplate {
            name: "local".into(),
            auth: None,
            file_path: None,
            encoding_name: None,
            chunk_size_bytes: 0,
            ensure_under_root: true,
        })
    }

    fn tool(name: &str, description: &str, tags: &[&str]) -> Tool {
        Tool::new(name, description, template()).with_tags(tags.iter().copied())
    }

    async fn repository_with(tools: Vec<Tool>) -> InMemToolRepository {
        let repository = InMemToolRepository::new();
        repository.save_manual(template(), Manual::new(tools)).await.expect("save");
        repository
    }

    #[tokio::test]
    async fn test_weather_query_ranks_weather_tool_first() {
        let repository = repository_with(vec![
            tool("local.add", "Add two numbers", &["math", "calculator"]),
            tool("local.weather", "Get current weather by city", &["weather", "forecast"]),
        ])
        .await;

        let results = TagAndDescriptionWordMatchStrategy::default()
            .search_tools(&repository, "weather in city", 0, None)
            .await
            .expect("search");
        assert_eq!(results[0].name, "local.weather");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_tag_filter_ignores_query_text() {
        let repository = repository_with(vec![
            tool("local.xy", "matches the query text exactly", &["x", "y"]),
            tool("local.z", "unrelated", &["Z"]),
        ])
        .await;

        let required = vec!["z".to_string()];
        let results = TagAndDescriptionWordMatchStrategy::default()
            .search_tools(&repository, "matches the query text exactly", 0, Some(&required))
            .await
            .expect("search");
        let names: Vec<&str> = results.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["local.z"]);
    }

    #[test]
    fn test_limit_and_stable_ties() {
        let strategy = TagAndDescriptionWordMatchStrategy::default();
        let tools = vec![
            tool("a", "first", &[]),
            tool("b", "second", &[]),
            tool("c", "third", &[]),
        ];

        let ranked = strategy.rank(tools.clone(), "nothing matches", 2, None);
        let names: Vec<&str> = ranked.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let all = strategy.rank(tools, "nothing matches", 0, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_multi_word_tag_matches_on_shared_word() {
        let strategy = TagAndDescriptionWordMatchStrategy::default();
        let ranked = strategy.rank(
            vec![tool("plain", "nothing", &[]), tool("tagged", "nothing", &["file system"])],
            "list system files",
            0,
            None,
        );
        assert_eq!(ranked[0].name, "tagged");
    }

    #[test]
    fn test_short_description_words_do_not_score() {
        let strategy = TagAndDescriptionWordMatchStrategy::default();
        let ranked = strategy.rank(
            vec![tool("short", "go to it", &[]), tool("long", "fetch records", &[])],
            "go to it fetch",
            0,
            None,
        );
        assert_eq!(ranked[0].name, "long");
    }
}
