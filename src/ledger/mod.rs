pub mod address;
pub mod builder;
pub mod checkpoint;
pub mod domain;
pub mod engine;
pub mod index;
pub mod runtime;
