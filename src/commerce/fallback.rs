use chrono::{ DateTime, TimeZone, Utc };
use log::warn;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ Article, CommerceStore, Invoice, InvoiceItem, InvoiceStatus, RefundStatus };
use crate::history::StoreError;

/// Where a tiered lookup found its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Found<T> {
    pub value: T,
    pub tier: Tier,
}

impl<T> Found<T> {
    fn primary(value: T) -> Self {
        Self { value, tier: Tier::Primary }
    }

    fn fallback(value: T) -> Self {
        Self { value, tier: Tier::Fallback }
    }
}

/// Built-in invoices and help articles served when the primary store has nothing.
pub struct FallbackCatalog {
    invoices: RwLock<Vec<Invoice>>,
    articles: Vec<Article>,
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap_or_else(Utc::now)
}

fn catalog_invoice(
    number: &str,
    amount: f64,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
    description: &str,
    payment_method: &str
) -> Invoice {
    Invoice {
        invoice_number: number.to_string(),
        user_id: Some("user_123".to_string()),
        amount,
        status,
        payment_method: Some(payment_method.to_string()),
        refund_status: RefundStatus::None,
        items: vec![InvoiceItem {
            description: description.to_string(),
            quantity: 1,
            price: amount,
        }],
        created_at,
        due_date: Some(created_at + chrono::Duration::days(14)),
    }
}

fn catalog_article(id: &str, title: &str, category: &str, tags: &[&str], content: &str) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        category: category.to_string(),
        tags: tags
            .iter()
            .map(|t| t.to_string())
            .collect(),
    }
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackCatalog {
    pub fn new(invoices: Vec<Invoice>, articles: Vec<Article>) -> Self {
        Self {
            invoices: RwLock::new(invoices),
            articles,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn builtin() -> Self {
        let invoices = vec![
            catalog_invoice(
                "INV-2024-001",
                120.5,
                InvoiceStatus::Paid,
                utc(2024, 1, 15, 10, 0),
                "Annual Subscription",
                "Visa ending 4242"
            ),
            catalog_invoice(
                "INV-2024-002",
                45.0,
                InvoiceStatus::Paid,
                utc(2024, 2, 10, 14, 30),
                "Support Add-on",
                "Visa ending 4242"
            ),
            catalog_invoice(
                "INV-2024-003",
                250.0,
                InvoiceStatus::Pending,
                utc(2024, 3, 5, 9, 15),
                "Enterprise License",
                "Mastercard ending 8888"
            )
        ];

        let articles = vec![
            catalog_article(
                "fallback_001",
                "Return & Refund Policy",
                "billing",
                &["refund", "return", "policy", "money back"],
                "We offer a 30-day return policy for most items. To initiate a return:\n\
                 1. Contact support within 30 days of delivery\n\
                 2. Provide your order number and reason for return\n\
                 3. We'll send you a return label via email\n\
                 4. Ship the item back using our prepaid label\n\
                 5. Refunds are processed within 5-7 business days after we receive the item\n\n\
                 Items must be in original condition with tags attached."
            ),
            catalog_article(
                "fallback_002",
                "Shipping Information",
                "orders",
                &["shipping", "delivery", "time", "cost"],
                "Standard shipping takes 5-7 business days. Express shipping takes 2-3 business days. \
                 Free shipping is available on orders over $100. International shipping may take up to 14 days depending on customs."
            ),
            catalog_article(
                "fallback_003",
                "Payment Methods",
                "billing",
                &["payment", "card", "paypal", "apple pay"],
                "We accept Visa, Mastercard, American Express, PayPal, and Apple Pay. We do not accept cash on delivery."
            ),
            catalog_article(
                "fallback_004",
                "How to Track Order",
                "orders",
                &["track", "tracking", "where is my order"],
                "Log in to your account and go to \"My Orders\". Click on the order to view its tracking status and number."
            )
        ];

        Self::new(invoices, articles)
    }

    pub async fn invoice(&self, user_id: &str, invoice_number: &str) -> Option<Invoice> {
        self.invoices
            .read().await
            .iter()
            .find(|i| i.invoice_number == invoice_number && i.visible_to(user_id))
            .cloned()
    }

    /// Newest first.
    pub async fn invoices(&self, user_id: &str) -> Vec<Invoice> {
        let mut found: Vec<Invoice> = self.invoices
            .read().await
            .iter()
            .filter(|i| i.visible_to(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub async fn set_refund_status(&self, invoice_number: &str, status: RefundStatus) -> bool {
        let mut invoices = self.invoices.write().await;
        match invoices.iter_mut().find(|i| i.invoice_number == invoice_number) {
            Some(invoice) => {
                invoice.refund_status = status;
                true
            }
            None => false,
        }
    }

    pub fn search_articles(&self, query: &str, limit: usize) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| a.matches(query))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn article(&self, article_id: &str) -> Option<Article> {
        self.articles
            .iter()
            .find(|a| a.id == article_id)
            .cloned()
    }

    pub fn articles_in_category(&self, category: &str) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| a.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }
}

/// Two-tier read path: the primary store first, then the static catalog.
///
/// A primary-store failure is logged and treated as a miss so the catalog
/// can still answer.
#[derive(Clone)]
pub struct TieredLookup {
    primary: Arc<dyn CommerceStore>,
    fallback: Arc<FallbackCatalog>,
}

impl TieredLookup {
    pub fn new(primary: Arc<dyn CommerceStore>, fallback: Arc<FallbackCatalog>) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &Arc<dyn CommerceStore> {
        &self.primary
    }

    fn primary_miss<T: Default>(result: Result<T, StoreError>, what: &str) -> T {
        result.unwrap_or_else(|e| {
            warn!("Primary store failed for {}, using fallback: {}", what, e);
            T::default()
        })
    }

    pub async fn invoice(&self, user_id: &str, invoice_number: &str) -> Option<Found<Invoice>> {
        let primary = Self::primary_miss(self.primary.find_invoice(user_id, invoice_number).await, "invoice");
        if let Some(invoice) = primary {
            return Some(Found::primary(invoice));
        }
        self.fallback.invoice(user_id, invoice_number).await.map(Found::fallback)
    }

    pub async fn invoices(&self, user_id: &str) -> Found<Vec<Invoice>> {
        let primary = Self::primary_miss(self.primary.invoices_for_user(user_id).await, "invoice list");
        if !primary.is_empty() {
            return Found::primary(primary);
        }
        Found::fallback(self.fallback.invoices(user_id).await)
    }

    pub async fn last_invoice(&self, user_id: &str) -> Option<Found<Invoice>> {
        let Found { value, tier } = self.invoices(user_id).await;
        value.into_iter().next().map(|invoice| Found { value: invoice, tier })
    }

    /// Writes the refund status to whichever tier the invoice was read from.
    pub async fn set_refund_status(
        &self,
        user_id: &str,
        invoice: &Found<Invoice>,
        status: RefundStatus
    ) -> Result<(), StoreError> {
        match invoice.tier {
            Tier::Primary => {
                self.primary.set_refund_status(user_id, &invoice.value.invoice_number, status).await
            }
            Tier::Fallback => {
                if self.fallback.set_refund_status(&invoice.value.invoice_number, status).await {
                    Ok(())
                } else {
                    Err(StoreError::NotFound(format!("invoice {}", invoice.value.invoice_number)))
                }
            }
        }
    }

    pub async fn search_articles(&self, query: &str, limit: usize) -> Found<Vec<Article>> {
        let primary = Self::primary_miss(self.primary.search_articles(query, limit).await, "article search");
        if !primary.is_empty() {
            return Found::primary(primary);
        }
        Found::fallback(self.fallback.search_articles(query, limit))
    }

    pub async fn article(&self, article_id: &str) -> Option<Found<Article>> {
        let primary = Self::primary_miss(self.primary.find_article(article_id).await, "article");
        if let Some(article) = primary {
            return Some(Found::primary(article));
        }
        self.fallback.article(article_id).map(Found::fallback)
    }

    pub async fn articles_in_category(&self, category: &str) -> Found<Vec<Article>> {
        let primary = Self::primary_miss(self.primary.articles_in_category(category).await, "article category");
        if !primary.is_empty() {
            return Found::primary(primary);
        }
        Found::fallback(self.fallback.articles_in_category(category))
    }
}
