//! Content fingerprint of a fully loaded product
//!
//! The fingerprint is an MD5 digest over the product's mutable content. Two
//! crawls that produce the same fingerprint saw the same product state, so
//! the later one carries no new information.
//!
//! List order is part of the content: characteristics, values and SKUs are
//! digested in the order the portal returned them.

use crate::catalog::ProductDetail;
use md5::{Digest, Md5};
use std::fmt::Write;

/// Computes the hex-encoded content fingerprint of a product
pub fn fingerprint(product: &ProductDetail) -> String {
    let digest_input = fingerprint_input(product);
    hex::encode(Md5::digest(digest_input.as_bytes()))
}

/// Builds the delimited string that is hashed
fn fingerprint_input(product: &ProductDetail) -> String {
    let mut details = String::new();

    for characteristic in &product.characteristics {
        details.push_str("character:");
        details.push_str(&characteristic.title);
        if characteristic.values.is_empty() {
            continue;
        }
        details.push('|');
        for value in &characteristic.values {
            details.push_str("char_value:");
            details.push_str(&value.title);
            details.push('|');
            details.push_str(&value.value);
        }
        details.push('|');
    }

    if !product.sku_list.is_empty() {
        details.push_str("skuList:");
        for sku in &product.sku_list {
            // Writing into a String cannot fail
            let _ = write!(
                details,
                "{};{:.2};{:.2}|",
                sku.available_amount, sku.full_price, sku.purchase_price
            );
        }
    }

    format!(
        "id:{}|descr:{}|rating:{:.2}|orders:{}|avail:{}|sku:{}",
        product.portal_id,
        product.description.as_deref().unwrap_or_default(),
        product.rating,
        product.orders_amount,
        product.total_available_amount,
        details
    )
}
