//! Order-side inputs handed over by the order lifecycle
//!
//! These are boundary views, not owned records: the order service persists
//! orders, the settlement side only reads them and writes back the commission
//! snapshot on each item.

use ledger_core::{BankDetails, OrderId, OrderItemId, VendorId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalog product referenced by an order item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID
    pub id: u64,
    /// Display name
    pub name: String,
    /// Commission category
    pub category: Option<String>,
    /// Selling vendor
    pub vendor_id: Option<VendorId>,
}

/// One line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Item ID
    pub id: OrderItemId,
    /// Product, if it still resolves
    pub product: Option<Product>,
    /// Name at order time
    pub product_name: String,
    /// Price per unit
    pub unit_price: Decimal,
    /// Units ordered
    pub quantity: u32,
    /// Commission percentage snapshot (0 for fixed rules)
    pub commission_rate: Decimal,
    /// Commission charged on this line
    pub commission_amount: Decimal,
}

impl OrderItem {
    /// New item without commission snapshot
    pub fn new(
        id: OrderItemId,
        product: Option<Product>,
        unit_price: Decimal,
        quantity: u32,
    ) -> Self {
        let product_name = product
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        Self {
            id,
            product,
            product_name,
            unit_price,
            quantity,
            commission_rate: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
        }
    }

    /// unit price × quantity
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Selling vendor, when both product and vendor resolve
    pub fn vendor_id(&self) -> Option<VendorId> {
        self.product.as_ref().and_then(|p| p.vendor_id)
    }

    /// Product category
    pub fn category(&self) -> Option<&str> {
        self.product.as_ref().and_then(|p| p.category.as_deref())
    }
}

/// Customer order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: OrderId,
    /// Human-facing order number, used in idempotency keys
    pub order_number: String,
    /// Line items
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Find an item by ID
    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

/// Payee data read at payout time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    /// Vendor ID
    pub id: VendorId,
    /// Shop name
    pub shop_name: String,
    /// Current bank details
    pub bank_details: BankDetails,
}
