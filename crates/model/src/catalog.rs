use serde::{Deserialize, Serialize};

/// Product — позиция каталога, цены в пайсах.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    /// Undiscounted listed price.
    pub mrp: i64,
    pub stock: i32,
}

/// CartLine — строка корзины, как её присылает клиент.
///
/// Prices are deliberately absent: the client never tells the server what anything costs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i32,
}
