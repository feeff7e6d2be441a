pub mod models;
pub mod service;

pub use models::{AddedLine, CartLineView, CartView, QuantityChange};
pub use service::{CartError, CartService};
