//! PubMed search tool for biomedical literature.
//!
//! Queries NCBI E-utilities (`esearch` for ids, then `esummary` for article
//! metadata) and hands the model a plain-text digest of the hits.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::PubmedConfig;
use crate::error::{OncoError, Result};
use crate::tool::Tool;

pub const NO_RESULTS: &str = "No good PubMed Result was found";

const USER_AGENT: &str = concat!("oncoally/", env!("CARGO_PKG_VERSION"));

/// Tool for searching PubMed for biomedical literature
pub struct PubmedSearchTool {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl PubmedSearchTool {
    pub fn new() -> Self {
        Self::from_config(&PubmedConfig::default())
    }

    pub fn from_config(cfg: &PubmedConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            max_results: cfg.max_results.max(1),
        }
    }

    async fn get_json(&self, url: &str, stage: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| OncoError::Protocol(format!("PubMed {stage} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(OncoError::Protocol(format!(
                "PubMed {stage} returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| OncoError::Protocol(format!("Failed to parse {stage} response: {e}")))
    }

    pub async fn search(&self, query: &str) -> Result<String> {
        let search_url = format!(
            "{}/esearch.fcgi?db=pubmed&term={}&retmax={}&retmode=json&sort=relevance",
            self.base_url,
            urlencoding::encode(query),
            self.max_results
        );
        let search_json = self.get_json(&search_url, "search").await?;

        let ids: Vec<String> = search_json["esearchresult"]["idlist"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        if ids.is_empty() {
            tracing::debug!(query, "pubmed search returned no ids");
            return Ok(NO_RESULTS.to_string());
        }

        let summary_url = format!(
            "{}/esummary.fcgi?db=pubmed&id={}&retmode=json",
            self.base_url,
            ids.join(",")
        );
        let summary_json = self.get_json(&summary_url, "summary").await?;

        tracing::debug!(query, hits = ids.len(), "pubmed search completed");
        Ok(render_summaries(&ids, &summary_json))
    }
}

impl Default for PubmedSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Format `esummary` records, in search-rank order, as text blocks.
pub fn render_summaries(ids: &[String], summary: &Value) -> String {
    let Some(records) = summary["result"].as_object() else {
        return NO_RESULTS.to_string();
    };

    let blocks: Vec<String> = ids
        .iter()
        .filter_map(|id| records.get(id.as_str()).map(|article| (id, article)))
        .map(|(id, article)| {
            let authors: Vec<&str> = article["authors"]
                .as_array()
                .map(|arr| arr.iter().filter_map(|a| a["name"].as_str()).collect())
                .unwrap_or_default();
            format!(
                "Published: {}\nTitle: {}\nAuthors: {}\nJournal: {}\nURL: https://pubmed.ncbi.nlm.nih.gov/{}/",
                article["pubdate"].as_str().unwrap_or("unknown"),
                article["title"].as_str().unwrap_or(""),
                if authors.is_empty() {
                    "n/a".to_string()
                } else {
                    authors.join(", ")
                },
                article["fulljournalname"]
                    .as_str()
                    .or_else(|| article["source"].as_str())
                    .unwrap_or(""),
                id
            )
        })
        .collect();

    if blocks.is_empty() {
        NO_RESULTS.to_string()
    } else {
        blocks.join("\n\n")
    }
}

#[async_trait]
impl Tool for PubmedSearchTool {
    fn name(&self) -> &str {
        "pubmed_search"
    }

    fn description(&self) -> &str {
        "Search PubMed for biomedical and life science literature. Input is a free-text \
         search query; returns publication date, title, authors, journal and link for the \
         most relevant articles."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for biomedical papers"
                }
            },
            "required": ["query"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let query = input["query"]
            .as_str()
            .or_else(|| input.as_str())
            .ok_or_else(|| OncoError::Protocol("missing 'query' parameter".into()))?;

        self.search(query).await.map(Value::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_metadata() {
        let tool = PubmedSearchTool::new();
        assert_eq!(tool.name(), "pubmed_search");
        assert_eq!(tool.max_results, 3);
        assert_eq!(tool.parameters().unwrap()["required"], json!(["query"]));
    }

    #[test]
    fn renders_in_rank_order() {
        let summary = json!({
            "result": {
                "uids": ["222", "111"],
                "111": {
                    "title": "Tumor mutational burden and immunotherapy",
                    "pubdate": "2023 Jan",
                    "fulljournalname": "Journal of Thoracic Oncology",
                    "authors": [{"name": "Doe J"}, {"name": "Roe R"}]
                },
                "222": {
                    "title": "PD-L1 negative NSCLC outcomes",
                    "pubdate": "2024 Mar",
                    "source": "Lancet Oncol",
                    "authors": []
                }
            }
        });

        let text = render_summaries(&["222".to_string(), "111".to_string()], &summary);
        let blocks: Vec<&str> = text.split("\n\n").collect();

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("Published: 2024 Mar\nTitle: PD-L1 negative NSCLC outcomes"));
        assert!(blocks[0].contains("Authors: n/a"));
        assert!(blocks[0].contains("Journal: Lancet Oncol"));
        assert!(blocks[1].contains("Authors: Doe J, Roe R"));
        assert!(blocks[1].ends_with("URL: https://pubmed.ncbi.nlm.nih.gov/111/"));
    }

    #[test]
    fn missing_records_fall_back_to_no_result() {
        assert_eq!(render_summaries(&["1".to_string()], &json!({})), NO_RESULTS);
        assert_eq!(
            render_summaries(&["1".to_string()], &json!({"result": {"2": {}}})),
            NO_RESULTS
        );
    }

    #[tokio::test]
    async fn rejects_input_without_query() {
        let tool = PubmedSearchTool::new();
        let err = tool.call(json!({"term": 3})).await.unwrap_err();
        assert!(err.to_string().contains("missing 'query'"));
    }
}
