pub mod product;
pub mod pricing;

pub use product::{parse_price, Product, ProductError};
pub use pricing::{PricingSnapshot, SnapshotError, SnapshotLine};
