//! Boundary to the chain index service (a CKB light client).

pub mod api;
pub mod mock;
pub mod rpc;
pub mod types;

pub use api::{ChainIndexApi, SharedIndex};
pub use mock::MockChainIndex;
pub use rpc::LightClientRpc;
