use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product entity.
///
/// Stock lives directly on the product and is only ever mutated through
/// conditional updates (see `services::catalog`). Variant groups are stored
/// as an embedded JSON document; resolving a selected option to a concrete
/// price and SKU is a pure lookup over that document.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub currency: String,
    pub stock: i32,
    pub status: ProductStatus,
    #[sea_orm(column_type = "Json")]
    pub variants: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Product status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "archived")]
    Archived,
}

/// A named variant dimension ("Size", "Color") with its selectable options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantGroup {
    pub name: String,
    pub options: Vec<VariantOption>,
}

/// One selectable option within a variant group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOption {
    pub name: String,
    #[serde(default)]
    pub price_adjustment: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_suffix: Option<String>,
}

/// A variant selection resolved against the product document: the effective
/// unit price and SKU frozen into cart lines and order snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVariant {
    pub variant_key: Option<String>,
    pub unit_price: Decimal,
    pub sku: String,
}

impl Model {
    /// Parses the embedded variant document.
    pub fn variant_groups(&self) -> Vec<VariantGroup> {
        serde_json::from_value(self.variants.clone()).unwrap_or_default()
    }

    /// Resolves a variant key of the form `"<group>:<option>"` to a concrete
    /// unit price and SKU. `None` selects the base product.
    pub fn resolve_variant(&self, variant_key: Option<&str>) -> Option<ResolvedVariant> {
        let Some(key) = variant_key else {
            return Some(ResolvedVariant {
                variant_key: None,
                unit_price: self.price,
                sku: self.sku.clone(),
            });
        };

        let (group_name, option_name) = key.split_once(':')?;
        let groups = self.variant_groups();
        let option = groups
            .iter()
            .find(|group| group.name == group_name)?
            .options
            .iter()
            .find(|option| option.name == option_name)?
            .clone();

        let sku = match &option.sku_suffix {
            Some(suffix) => format!("{}{}", self.sku, suffix),
            None => self.sku.clone(),
        };

        Some(ResolvedVariant {
            variant_key: Some(key.to_string()),
            unit_price: self.price + option.price_adjustment,
            sku,
        })
    }

    /// Whether the product is purchasable at all.
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product_with_variants() -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Canvas Tote".to_string(),
            sku: "TOTE-01".to_string(),
            slug: "canvas-tote".to_string(),
            description: "A tote bag".to_string(),
            price: dec!(25.00),
            currency: "USD".to_string(),
            stock: 10,
            status: ProductStatus::Active,
            variants: serde_json::json!([
                {
                    "name": "Size",
                    "options": [
                        {"name": "Small", "price_adjustment": "0", "sku_suffix": "-S"},
                        {"name": "Large", "price_adjustment": "4.50", "sku_suffix": "-L"}
                    ]
                }
            ]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn base_product_resolves_without_key() {
        let product = product_with_variants();
        let resolved = product.resolve_variant(None).unwrap();
        assert_eq!(resolved.unit_price, dec!(25.00));
        assert_eq!(resolved.sku, "TOTE-01");
        assert!(resolved.variant_key.is_none());
    }

    #[test]
    fn variant_key_applies_adjustment_and_suffix() {
        let product = product_with_variants();
        let resolved = product.resolve_variant(Some("Size:Large")).unwrap();
        assert_eq!(resolved.unit_price, dec!(29.50));
        assert_eq!(resolved.sku, "TOTE-01-L");
        assert_eq!(resolved.variant_key.as_deref(), Some("Size:Large"));
    }

    #[test]
    fn unknown_option_resolves_to_none() {
        let product = product_with_variants();
        assert!(product.resolve_variant(Some("Size:Gigantic")).is_none());
        assert!(product.resolve_variant(Some("Color:Red")).is_none());
        assert!(product.resolve_variant(Some("malformed")).is_none());
    }

    #[test]
    fn product_without_variant_doc_still_resolves_base() {
        let mut product = product_with_variants();
        product.variants = serde_json::json!([]);
        assert!(product.resolve_variant(None).is_some());
        assert!(product.resolve_variant(Some("Size:Small")).is_none());
    }
}
