use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Order aggregate.
///
/// Created exactly once from a cart at checkout. Items and totals are frozen
/// at creation; afterwards only the status, payment fields, notes and
/// tracking number move, via the transitions in [`OrderStatus`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub order_number: String,

    pub user_id: Uuid,
    pub status: OrderStatus,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub grand_total: Decimal,
    pub payment_provider: String,
    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,
    #[sea_orm(nullable)]
    pub payment_charge_id: Option<String>,
    #[sea_orm(nullable)]
    pub payment_transaction_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub payment_amount: Decimal,
    pub shipping_method: String,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,
    #[sea_orm(column_type = "Json", nullable)]
    pub billing_address: Option<Json>,
    #[sea_orm(column_type = "Json")]
    pub contact_info: Json,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Whether the order can move from `self` to `target`.
    ///
    /// Forward path: pending → processing → shipped → delivered → refunded.
    /// Any pre-delivered state may be cancelled. Cancelled and refunded are
    /// terminal; delivered only branches to refunded.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
                | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state carried on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Postal address stored as JSON on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct Address {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Address line is required"))]
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    pub region: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2, message = "Country code must be 2 characters"))]
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Buyer contact details stored as JSON on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct ContactInfo {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
