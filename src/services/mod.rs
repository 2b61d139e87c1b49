//! Business logic on top of the store.

pub mod accounts;
pub mod catalog;
pub mod lending;

pub use accounts::AccountsService;
pub use catalog::CatalogService;
pub use lending::LendingService;
