use serde::Deserialize;

/// One page of a category listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    #[serde(default)]
    pub total_products: i64,

    #[serde(default)]
    pub products: Vec<ListingItem>,

    #[serde(default)]
    pub adult_content: bool,
}

/// A product as it appears on a listing page
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingItem {
    #[serde(rename = "productId")]
    pub portal_id: i64,

    pub title: String,

    /// Portal id of the category the portal files the product under
    #[serde(rename = "categoryId", default)]
    pub portal_category_id: Option<i64>,

    #[serde(default)]
    pub rating: f64,
}

/// Full product detail as served by the product endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(rename = "id")]
    pub portal_id: i64,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: Option<CategoryRef>,

    #[serde(default)]
    pub seller: Option<Seller>,

    #[serde(default)]
    pub orders_amount: i64,

    #[serde(default)]
    pub reviews_amount: i64,

    #[serde(default)]
    pub total_available_amount: i64,

    #[serde(default)]
    pub rating: f64,

    #[serde(default)]
    pub characteristics: Vec<Characteristic>,

    #[serde(default)]
    pub sku_list: Vec<Sku>,
}

/// Category reference embedded in a product detail
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRef {
    #[serde(rename = "id")]
    pub portal_id: i64,
    pub title: String,
}

/// Seller snapshot taken at crawl time; folded into the product row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Seller {
    #[serde(rename = "id")]
    pub portal_id: i64,
    pub title: String,
    #[serde(default)]
    pub orders: i64,
    #[serde(default)]
    pub reviews: i64,
    #[serde(default)]
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Characteristic {
    pub title: String,
    #[serde(default)]
    pub values: Vec<CharValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CharValue {
    pub title: String,
    pub value: String,
}

/// A stock keeping unit of a product
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    #[serde(default)]
    pub available_amount: i64,

    #[serde(default)]
    pub full_price: f64,

    #[serde(default)]
    pub purchase_price: f64,

    /// Positions into the product's characteristics and their values
    #[serde(default)]
    pub characteristics: Vec<SkuCharRef>,
}

/// Position of a characteristic value within `ProductDetail::characteristics`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuCharRef {
    pub char_index: i64,
    pub value_index: i64,
}

impl SkuCharRef {
    /// The reference as list positions, or None when either index is negative
    pub fn position(&self) -> Option<(usize, usize)> {
        let char_index = usize::try_from(self.char_index).ok()?;
        let value_index = usize::try_from(self.value_index).ok()?;
        Some((char_index, value_index))
    }
}
