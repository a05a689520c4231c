#![no_std]

extern crate alloc;

pub mod address;
pub use address::Addr;

pub mod ids;
pub use ids::ProcessId;

pub mod config;
pub use config::Config;

pub mod bytes;
pub use bytes::SerializeField;
