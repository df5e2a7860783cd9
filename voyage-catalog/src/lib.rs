pub mod inventory;
pub mod package;
pub mod pricing;

pub use inventory::{InventoryLedger, LedgerEntry, LedgerError};
pub use package::Package;
pub use pricing::PriceQuote;
