//! Boot path for the kernel.
//!
//! This crate provides a bootloader that:
//! - locates a program image on disk through a [`FileService`],
//! - starts it as the kernel's first (root) process.

pub mod bootloader;
pub use bootloader::{BootConfig, Bootloader, DEFAULT_IMAGE, boot};

pub mod error;
pub use error::BootError;

pub mod file_service;
pub use file_service::FileService;
