pub mod ledger_store;
pub use ledger_store::{LedgerStore, LedgerTx, UserDirectory};
pub mod inventory_repo;
pub use inventory_repo::PgLedgerStore;
pub mod user_repo;
pub use user_repo::UserRepository;
pub mod memory;
pub use memory::{InMemoryLedgerStore, InMemoryUserDirectory};
