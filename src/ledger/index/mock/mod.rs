mod client;

pub use client::MockChainIndex;
