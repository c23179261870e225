//! Catalog domain model
//!
//! In-memory shapes of the remote catalog as decoded from the portal:
//! - `CategoryNode`: one node of the remote category tree, owning its children
//! - `ListingItem`: a lightweight product entry from a category listing page
//! - `ProductDetail`: the full product graph (characteristics, values, SKUs)
//!
//! These values own portal ids only. Local ids are assigned by the store when
//! they are persisted.

mod category;
mod fingerprinter;
mod product;

pub use category::CategoryNode;
pub use fingerprinter::fingerprint;
pub use product::{
    CategoryRef, CharValue, Characteristic, ListingItem, ListingPage, ProductDetail, Seller, Sku,
    SkuCharRef,
};
