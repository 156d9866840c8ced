//! `atelier-catalog` — catalog product types consumed by the publish engine.
//!
//! Catalog CRUD itself lives outside this core; only the identifier and the
//! data handed to the catalog sink are modeled here.

pub mod product;

pub use product::{ProductDraft, ProductId, ProductRecord};
