// Order placement and order queries
pub mod orders;

// Catalog
pub mod products;

// Stock levels and post-order adjustment
pub mod stock;
