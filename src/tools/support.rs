use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{ json, Value };

use super::{ definition, parse_args, string_parameter, to_json, Tool, ToolError, ToolRegistry };
use crate::commerce::TieredLookup;
use crate::llm::chat::ToolDefinition;

const SEARCH_LIMIT: usize = 3;

pub const SUPPORT_TOOL_NAMES: [&str; 3] = ["searchArticles", "getArticle", "getArticlesByCategory"];

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleArgs {
    article_id: String,
}

#[derive(Deserialize)]
struct CategoryArgs {
    category: String,
}

pub struct SearchArticles(TieredLookup);
pub struct GetArticle(TieredLookup);
pub struct GetArticlesByCategory(TieredLookup);

pub fn register_support_tools(registry: &mut ToolRegistry, lookup: TieredLookup) {
    registry.register(SearchArticles(lookup.clone()));
    registry.register(GetArticle(lookup.clone()));
    registry.register(GetArticlesByCategory(lookup));
}

#[async_trait]
impl Tool for SearchArticles {
    fn definition(&self) -> ToolDefinition {
        definition(
            "searchArticles",
            "Search for help center articles based on a query. Use this to find relevant information for user questions about policies, returns, shipping, etc.",
            string_parameter("query", "The search query for support articles")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(input)?;
        to_json(self.0.search_articles(&args.query, SEARCH_LIMIT).await.value)
    }
}

#[async_trait]
impl Tool for GetArticle {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getArticle",
            "Get the full content of a specific help article by ID",
            string_parameter("articleId", "The ID of the article to retrieve")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: ArticleArgs = parse_args(input)?;
        match self.0.article(&args.article_id).await {
            Some(found) => to_json(found.value),
            None => Ok(json!({ "error": "Article not found." })),
        }
    }
}

#[async_trait]
impl Tool for GetArticlesByCategory {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getArticlesByCategory",
            "List help articles in a specific category",
            string_parameter("category", "The category to filter by (e.g., \"billing\", \"shipping\", \"account\")")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: CategoryArgs = parse_args(input)?;
        let articles = self.0.articles_in_category(&args.category).await.value;
        if articles.is_empty() {
            return Ok(json!({ "message": format!("No articles found in category \"{}\".", args.category) }));
        }
        let summaries: Vec<Value> = articles
            .into_iter()
            .map(|a| json!({ "id": a.id, "title": a.title, "category": a.category }))
            .collect();
        Ok(Value::Array(summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::{ Article, FallbackCatalog, InMemoryCommerceStore };
    use crate::llm::chat::ToolCall;
    use std::sync::Arc;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall { id: "s".into(), name: name.into(), arguments }
    }

    async fn registry(store: InMemoryCommerceStore) -> ToolRegistry {
        let lookup = TieredLookup::new(Arc::new(store), Arc::new(FallbackCatalog::builtin()));
        let mut registry = ToolRegistry::new();
        register_support_tools(&mut registry, lookup);
        registry
    }

    #[tokio::test]
    async fn search_caps_results_at_three() {
        let store = InMemoryCommerceStore::new();
        for i in 0..5 {
            store.insert_article(Article {
                id: format!("a{}", i),
                title: format!("Shipping guide {}", i),
                content: "Details".into(),
                category: "orders".into(),
                tags: vec![],
            }).await;
        }
        let registry = registry(store).await;
        let result = registry.invoke(&call("searchArticles", json!({"query": "shipping"}))).await.unwrap();
        assert_eq!(result.as_array().unwrap().len(), 3);
        assert_eq!(result[0]["id"], "a0");
    }

    #[tokio::test]
    async fn falls_back_to_catalog_articles() {
        let registry = registry(InMemoryCommerceStore::new()).await;
        let result = registry.invoke(&call("getArticle", json!({"articleId": "fallback_003"}))).await.unwrap();
        assert_eq!(result["title"], "Payment Methods");

        let missing = registry.invoke(&call("getArticle", json!({"articleId": "nope"}))).await.unwrap();
        assert_eq!(missing["error"], "Article not found.");
    }

    #[tokio::test]
    async fn category_listing_returns_summaries() {
        let registry = registry(InMemoryCommerceStore::new()).await;
        let result = registry.invoke(&call("getArticlesByCategory", json!({"category": "billing"}))).await.unwrap();
        let list = result.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].get("content").is_none());

        let empty = registry.invoke(&call("getArticlesByCategory", json!({"category": "account"}))).await.unwrap();
        assert!(empty["message"].as_str().unwrap().contains("account"));
    }
}
