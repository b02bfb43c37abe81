//! Ledger data model: cells, out points, scripts, transactions and the
//! records derived from them.

pub mod cell;
pub mod network;
pub mod quantity;
pub mod record;
pub mod script;
pub mod sync_mode;
pub mod transaction;

pub use cell::{Cell, OutPoint};
pub use network::Network;
pub use quantity::{format_ckb, MIN_CELL_CAPACITY, SHANNONS_PER_CKB};
pub use record::{Direction, TransactionRecord};
pub use script::{Script, ScriptHashType};
pub use sync_mode::SyncMode;
pub use transaction::{CellDep, CellInput, CellOutput, DepType, Transaction, TransactionView};
