pub mod fallback;
pub mod memory;

pub use fallback::{ FallbackCatalog, Found, Tier, TieredLookup };
pub use memory::InMemoryCommerceStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::history::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub items: Vec<OrderItem>,
    pub delivery_status: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn contains_product(&self, product_name: &str) -> bool {
        let needle = product_name.to_lowercase();
        self.items.iter().any(|item| item.name.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Pending,
    Refunded,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Refunded => "refunded",
            InvoiceStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    None,
    Requested,
    Processing,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::None => "none",
            RefundStatus::Requested => "requested",
            RefundStatus::Processing => "processing",
            RefundStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_number: String,
    /// `None` for catalog entries that are visible to every user.
    pub user_id: Option<String>,
    pub amount: f64,
    pub status: InvoiceStatus,
    pub payment_method: Option<String>,
    pub refund_status: RefundStatus,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn visible_to(&self, user_id: &str) -> bool {
        self.user_id.as_deref().map_or(true, |owner| owner == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Article {
    /// Case-insensitive match on title, body, or any tag.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.title.to_lowercase().contains(&q) ||
            self.content.to_lowercase().contains(&q) ||
            self.tags.iter().any(|t| t.to_lowercase().contains(&q))
    }
}

/// Primary source of order, invoice and help-center data.
///
/// Order and invoice lookups are scoped to the owning user; implementations
/// must never return another user's records.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    async fn find_order(&self, user_id: &str, order_number: &str) -> Result<Option<Order>, StoreError>;
    /// Newest first.
    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError>;
    async fn update_order_status(
        &self,
        user_id: &str,
        order_number: &str,
        status: OrderStatus
    ) -> Result<(), StoreError>;

    async fn find_invoice(&self, user_id: &str, invoice_number: &str) -> Result<Option<Invoice>, StoreError>;
    /// Newest first.
    async fn invoices_for_user(&self, user_id: &str) -> Result<Vec<Invoice>, StoreError>;
    async fn set_refund_status(
        &self,
        user_id: &str,
        invoice_number: &str,
        status: RefundStatus
    ) -> Result<(), StoreError>;

    async fn search_articles(&self, query: &str, limit: usize) -> Result<Vec<Article>, StoreError>;
    async fn find_article(&self, article_id: &str) -> Result<Option<Article>, StoreError>;
    async fn articles_in_category(&self, category: &str) -> Result<Vec<Article>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_and_processing_orders_cancel() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(OrderStatus::Processing.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn article_matches_tags_case_insensitively() {
        let article = Article {
            id: "a1".into(),
            title: "Payment Methods".into(),
            content: "We accept cards.".into(),
            category: "billing".into(),
            tags: vec!["PayPal".into()],
        };
        assert!(article.matches("paypal"));
        assert!(article.matches("PAYMENT"));
        assert!(!article.matches("shipping"));
    }
}
