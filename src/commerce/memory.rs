use async_trait::async_trait;
use chrono::{ Duration, Utc };
use tokio::sync::RwLock;

use super::{
    Article,
    CommerceStore,
    Invoice,
    InvoiceItem,
    InvoiceStatus,
    Order,
    OrderItem,
    OrderStatus,
    RefundStatus,
};
use crate::history::StoreError;

/// Process-local commerce data, seeded at startup or by tests.
#[derive(Default)]
pub struct InMemoryCommerceStore {
    orders: RwLock<Vec<Order>>,
    invoices: RwLock<Vec<Invoice>>,
    articles: RwLock<Vec<Article>>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.orders.write().await.push(order);
    }

    pub async fn insert_invoice(&self, invoice: Invoice) {
        self.invoices.write().await.push(invoice);
    }

    pub async fn insert_article(&self, article: Article) {
        self.articles.write().await.push(article);
    }

    /// A handful of orders and invoices for `user_id`, covering each status
    /// the agents distinguish.
    pub async fn seed_demo(&self, user_id: &str) {
        let now = Utc::now();
        let order = |number: &str, status: OrderStatus, items: Vec<OrderItem>, delivery: &str, tracking: Option<&str>, age_days: i64| {
            let created_at = now - Duration::days(age_days);
            Order {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                order_number: number.to_string(),
                status,
                total_amount: items.iter().map(|i| i.price * (i.quantity as f64)).sum(),
                items,
                delivery_status: Some(delivery.to_string()),
                tracking_number: tracking.map(str::to_string),
                created_at,
                updated_at: created_at,
            }
        };
        let item = |name: &str, quantity: u32, price: f64| OrderItem {
            name: name.to_string(),
            quantity,
            price,
        };

        let orders = vec![
            order("ORD-2025-001", OrderStatus::Delivered, vec![item("Wireless Headphones", 1, 149.99)], "Delivered", Some("TRK1234567890"), 40),
            order(
                "ORD-2025-002",
                OrderStatus::Shipped,
                vec![item("USB-C Cable", 2, 19.99), item("Phone Case", 1, 49.99)],
                "In transit",
                Some("TRK9876543210"),
                6
            ),
            order("ORD-2025-003", OrderStatus::Processing, vec![item("Mechanical Keyboard", 1, 299.99)], "Order is being prepared", None, 2),
            order("ORD-2025-004", OrderStatus::Pending, vec![item("Gaming Laptop", 1, 1299.0)], "Order received", None, 0)
        ];

        let invoice = |number: &str, amount: f64, status: InvoiceStatus, description: &str, age_days: i64| {
            let created_at = now - Duration::days(age_days);
            Invoice {
                invoice_number: number.to_string(),
                user_id: Some(user_id.to_string()),
                amount,
                status,
                payment_method: Some("Credit Card (•••• 4242)".to_string()),
                refund_status: RefundStatus::None,
                items: vec![InvoiceItem {
                    description: description.to_string(),
                    quantity: 1,
                    price: amount,
                }],
                created_at,
                due_date: Some(created_at + Duration::days(7)),
            }
        };

        let invoices = vec![
            invoice("INV-2025-001", 149.99, InvoiceStatus::Paid, "Wireless Headphones", 40),
            invoice("INV-2025-003", 299.99, InvoiceStatus::Paid, "Mechanical Keyboard", 2),
            invoice("INV-2025-004", 1299.0, InvoiceStatus::Pending, "Gaming Laptop", 0)
        ];

        self.orders.write().await.extend(orders);
        self.invoices.write().await.extend(invoices);
    }
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    async fn find_order(&self, user_id: &str, order_number: &str) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(
            orders
                .iter()
                .find(|o| o.order_number == order_number && o.user_id == user_id)
                .cloned()
        )
    }

    async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let mut found: Vec<Order> = self.orders
            .read().await
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_order_status(
        &self,
        user_id: &str,
        order_number: &str,
        status: OrderStatus
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.order_number == order_number && o.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_number)))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn find_invoice(&self, user_id: &str, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        let invoices = self.invoices.read().await;
        Ok(
            invoices
                .iter()
                .find(|i| i.invoice_number == invoice_number && i.user_id.as_deref() == Some(user_id))
                .cloned()
        )
    }

    async fn invoices_for_user(&self, user_id: &str) -> Result<Vec<Invoice>, StoreError> {
        let mut found: Vec<Invoice> = self.invoices
            .read().await
            .iter()
            .filter(|i| i.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn set_refund_status(
        &self,
        user_id: &str,
        invoice_number: &str,
        status: RefundStatus
    ) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .iter_mut()
            .find(|i| i.invoice_number == invoice_number && i.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| StoreError::NotFound(format!("invoice {}", invoice_number)))?;
        invoice.refund_status = status;
        Ok(())
    }

    async fn search_articles(&self, query: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(
            self.articles
                .read().await
                .iter()
                .filter(|a| a.matches(query))
                .take(limit)
                .cloned()
                .collect()
        )
    }

    async fn find_article(&self, article_id: &str) -> Result<Option<Article>, StoreError> {
        Ok(
            self.articles
                .read().await
                .iter()
                .find(|a| a.id == article_id)
                .cloned()
        )
    }

    async fn articles_in_category(&self, category: &str) -> Result<Vec<Article>, StoreError> {
        Ok(
            self.articles
                .read().await
                .iter()
                .filter(|a| a.category.eq_ignore_ascii_case(category))
                .cloned()
                .collect()
        )
    }
}
