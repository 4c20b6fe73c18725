// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolOutput};

/// Web search through the DuckDuckGo Instant Answer API — no key needed.
pub struct SearchWebTool;

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web using DuckDuckGo (no API key required). \
         Returns the topic summary, direct answer, and related results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolOutput {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        if query.is_empty() {
            return ToolOutput::err("No query provided.");
        }

        debug!(query = %query, "search_web tool");

        match duckduckgo_search(query).await {
            Ok(results) => ToolOutput::ok(results),
            Err(e) => ToolOutput::err(format!("Failed to search: {e}")),
        }
    }
}

async fn duckduckgo_search(query: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("tether-gateway/0.3")
        .build()
        .map_err(|e| e.to_string())?;

    let resp = client
        .get("https://api.duckduckgo.com/")
        .query(&[("q", query), ("format", "json"), ("no_redirect", "1")])
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !resp.status().is_success() {
        return Err(format!("search endpoint returned HTTP {}", resp.status()));
    }

    let data: Value = resp.json().await.map_err(|e| e.to_string())?;
    Ok(extract_results(&data))
}

/// Pull the useful fields out of an instant-answer payload.
fn extract_results(data: &Value) -> String {
    let mut results: Vec<String> = Vec::new();

    if let Some(abstract_text) = data["AbstractText"].as_str() {
        if !abstract_text.is_empty() {
            results.push(format!("**Summary**: {}", strip_html(abstract_text)));
        }
    }
    if let Some(answer) = data["Answer"].as_str() {
        if !answer.is_empty() {
            results.push(format!("**Answer**: {}", strip_html(answer)));
        }
    }
    if let Some(topics) = data["RelatedTopics"].as_array() {
        for topic in topics.iter().take(3) {
            if let Some(text) = topic["Text"].as_str() {
                results.push(format!("- {}", strip_html(text)));
            } else if let Some(subtopics) = topic["Topics"].as_array() {
                for sub in subtopics.iter().take(2) {
                    if let Some(text) = sub["Text"].as_str() {
                        results.push(format!("- {}", strip_html(text)));
                    }
                }
            }
        }
    }

    if results.is_empty() {
        "No results found.".to_string()
    } else {
        results.join("\n")
    }
}

/// Instant-answer fields occasionally embed markup; strip the tags.
fn strip_html(s: &str) -> String {
    let re = regex::Regex::new(r"<[^>]*>").expect("static pattern");
    re.replace_all(s, "").into_owned()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_query_is_error() {
        let out = SearchWebTool.execute(&json!({})).await;
        assert!(out.is_error);
        assert!(out.output.contains("No query provided"));
    }

    #[tokio::test]
    async fn empty_query_is_error() {
        let out = SearchWebTool.execute(&json!({"query": ""})).await;
        assert!(out.is_error);
    }

    #[test]
    fn extract_prefers_summary_and_answer() {
        let data = json!({
            "AbstractText": "Rust is a systems language.",
            "Answer": "42",
            "RelatedTopics": [
                { "Text": "Rust (programming language)" },
                { "Topics": [ { "Text": "Cargo" }, { "Text": "Crates.io" }, { "Text": "dropped" } ] }
            ]
        });
        let out = extract_results(&data);
        assert!(out.contains("**Summary**: Rust is a systems language."));
        assert!(out.contains("**Answer**: 42"));
        assert!(out.contains("- Rust (programming language)"));
        assert!(out.contains("- Cargo"));
        assert!(out.contains("- Crates.io"));
        assert!(!out.contains("dropped"), "only 2 subtopics kept: {out}");
    }

    #[test]
    fn extract_with_no_fields_reports_no_results() {
        assert_eq!(extract_results(&json!({})), "No results found.");
    }

    #[test]
    fn related_topics_limited_to_three() {
        let data = json!({
            "RelatedTopics": [
                { "Text": "one" }, { "Text": "two" },
                { "Text": "three" }, { "Text": "four" }
            ]
        });
        let out = extract_results(&data);
        assert!(out.contains("three"));
        assert!(!out.contains("four"));
    }

    #[test]
    fn html_tags_are_stripped() {
        assert_eq!(strip_html("a <b>bold</b> claim"), "a bold claim");
        assert_eq!(strip_html("no tags"), "no tags");
    }
}
