use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{ json, Value };
use std::sync::Arc;

use super::{
    definition,
    no_parameters,
    parse_args,
    string_parameter,
    to_json,
    Tool,
    ToolError,
    ToolRegistry,
};
use crate::commerce::{ CommerceStore, OrderStatus };
use crate::llm::chat::ToolDefinition;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNumberArgs {
    order_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNameArgs {
    product_name: String,
}

/// Shared state for every order tool: the data source and the caller.
#[derive(Clone)]
struct Scope {
    store: Arc<dyn CommerceStore>,
    user_id: String,
}

pub struct GetOrderById(Scope);
pub struct GetOrdersByUser(Scope);
pub struct GetLatestOrder(Scope);
pub struct GetDeliveryStatus(Scope);
pub struct CancelOrder(Scope);
pub struct GetOrderByProductName(Scope);

pub const ORDER_TOOL_NAMES: [&str; 6] = [
    "getOrderById",
    "getOrdersByUser",
    "getLatestOrder",
    "getDeliveryStatus",
    "cancelOrder",
    "getOrderByProductName",
];

pub fn register_order_tools(registry: &mut ToolRegistry, store: Arc<dyn CommerceStore>, user_id: &str) {
    let scope = Scope { store, user_id: user_id.to_string() };
    registry.register(GetOrderById(scope.clone()));
    registry.register(GetOrdersByUser(scope.clone()));
    registry.register(GetLatestOrder(scope.clone()));
    registry.register(GetDeliveryStatus(scope.clone()));
    registry.register(CancelOrder(scope.clone()));
    registry.register(GetOrderByProductName(scope));
}

fn no_orders() -> Value {
    json!({ "message": "No orders found for your account." })
}

#[async_trait]
impl Tool for GetOrderById {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getOrderById",
            "Get details of a specific order by its order number (e.g. ORD-2024-8891)",
            string_parameter("orderNumber", "The order number to look up")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: OrderNumberArgs = parse_args(input)?;
        match self.0.store.find_order(&self.0.user_id, &args.order_number).await? {
            Some(order) => to_json(order),
            None =>
                Ok(
                    json!({
                        "error": format!("Order {} not found. Please check the order number and try again.", args.order_number)
                    })
                ),
        }
    }
}

#[async_trait]
impl Tool for GetOrdersByUser {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getOrdersByUser",
            "Get all orders for the current user. Returns a list of orders sorted by most recent first.",
            no_parameters()
        )
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let orders = self.0.store.orders_for_user(&self.0.user_id).await?;
        if orders.is_empty() {
            return Ok(no_orders());
        }
        to_json(orders)
    }
}

#[async_trait]
impl Tool for GetLatestOrder {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getLatestOrder",
            "Get the most recent order for the current user. Use this when the user asks about \"my order\" or \"latest order\" without specifying an order number.",
            no_parameters()
        )
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let orders = self.0.store.orders_for_user(&self.0.user_id).await?;
        match orders.into_iter().next() {
            Some(order) => to_json(order),
            None => Ok(no_orders()),
        }
    }
}

#[async_trait]
impl Tool for GetDeliveryStatus {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getDeliveryStatus",
            "Get the delivery/shipping status and tracking info for a specific order",
            string_parameter("orderNumber", "The order number")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: OrderNumberArgs = parse_args(input)?;
        let order = match self.0.store.find_order(&self.0.user_id, &args.order_number).await? {
            Some(o) => o,
            None => {
                return Ok(json!({ "error": format!("Order {} not found.", args.order_number) }));
            }
        };
        Ok(
            json!({
                "orderNumber": order.order_number,
                "status": order.status,
                "deliveryStatus": order.delivery_status.unwrap_or_else(|| "Not available".into()),
                "trackingNumber": order.tracking_number.unwrap_or_else(|| "Not available".into()),
            })
        )
    }
}

#[async_trait]
impl Tool for CancelOrder {
    fn definition(&self) -> ToolDefinition {
        definition(
            "cancelOrder",
            "Cancel an order. Only orders with status \"pending\" or \"processing\" can be cancelled. Orders that are already shipped, delivered, or cancelled cannot be cancelled.",
            string_parameter("orderNumber", "The order number to cancel")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: OrderNumberArgs = parse_args(input)?;
        let number = args.order_number;
        let order = match self.0.store.find_order(&self.0.user_id, &number).await? {
            Some(o) => o,
            None => {
                return Ok(json!({ "error": format!("Order {} not found.", number) }));
            }
        };

        if order.status == OrderStatus::Cancelled {
            return Ok(json!({ "message": format!("Order {} has already been cancelled.", number) }));
        }
        if !order.status.is_cancellable() {
            return Ok(
                json!({
                    "error": format!(
                        "Order {} has status \"{}\" and cannot be cancelled. A human agent may need to assist with this. Please contact support for further assistance with returns/refunds.",
                        number,
                        order.status.as_str()
                    ),
                    "needsHumanAssistance": true,
                })
            );
        }

        self.0.store.update_order_status(&self.0.user_id, &number, OrderStatus::Cancelled).await?;

        Ok(
            json!({
                "message": format!("Order {} has been successfully cancelled.", number),
                "orderNumber": order.order_number,
                "previousStatus": order.status,
                "newStatus": OrderStatus::Cancelled,
                "items": order.items,
                "totalAmount": order.total_amount,
            })
        )
    }
}

#[async_trait]
impl Tool for GetOrderByProductName {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getOrderByProductName",
            "Search for orders containing a specific product name. Use this when the user mentions a product name instead of an order number.",
            string_parameter("productName", "The product name to search for")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: ProductNameArgs = parse_args(input)?;
        let matching: Vec<_> = self.0.store
            .orders_for_user(&self.0.user_id).await?
            .into_iter()
            .filter(|o| o.contains_product(&args.product_name))
            .collect();

        if matching.is_empty() {
            return Ok(json!({ "message": format!("No orders found containing \"{}\".", args.product_name) }));
        }
        to_json(matching)
    }
}
