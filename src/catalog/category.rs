use serde::Deserialize;

/// A node of the remote category tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    /// Portal id of the category
    #[serde(rename = "id")]
    pub portal_id: i64,

    pub title: String,

    /// Remote estimate of the number of products in the category
    #[serde(default)]
    pub product_amount: i64,

    #[serde(default)]
    pub children: Vec<CategoryNode>,
}
