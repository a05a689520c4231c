use std::path::PathBuf;

use anyhow::Context;
use compiler::ProgramBuilder;
use kernel::Kernel;
use tracing::{info, warn};
use types::{Config, ProcessId};

use crate::error::BootError;
use crate::file_service::FileService;

/// Image looked up when none is named.
pub const DEFAULT_IMAGE: &str = "kernel.img";

/// Boot configuration options consumed by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub image: String,
    pub root_priority: u32,
    /// Boot the built-in image when the named one is missing.
    pub fallback: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            root_priority: Config::DEFAULT_PROCESS_PRIORITY,
            fallback: false,
        }
    }
}

/// Loads a program image and starts it as the kernel's first process.
#[derive(Debug, Clone)]
pub struct Bootloader {
    pub config: BootConfig,
    files: FileService,
}

impl Bootloader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, BootConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: BootConfig) -> Self {
        Self {
            config,
            files: FileService::new(root),
        }
    }

    pub fn files(&self) -> &FileService {
        &self.files
    }

    /// The image booted when none is found on disk: announce the boot and
    /// finish.
    pub fn builtin_image() -> Vec<u8> {
        ProgramBuilder::new()
            .print_str("boot: no image found, running built-in program")
            .build()
            .unwrap_or_default()
    }

    fn resolve_image(&self) -> anyhow::Result<Vec<u8>> {
        match self.files.load(&self.config.image) {
            Ok(bytes) => Ok(bytes),
            Err(BootError::ImageNotFound { .. }) if self.config.fallback => Ok(Self::builtin_image()),
            Err(err) => Err(err).with_context(|| {
                format!(
                    "failed to load boot image `{}` from {}",
                    self.config.image,
                    self.files.root().display()
                )
            }),
        }
    }

    /// Create the root process, bind the configured image and dispatch it.
    pub fn boot(&self, kernel: &Kernel) -> anyhow::Result<ProcessId> {
        let image = self.resolve_image()?;
        let process = kernel
            .generate_process(None)
            .context("failed to create the root process")?;
        process.set_priority(self.config.root_priority);
        process.set_name(self.config.image.as_bytes().to_vec());

        let id = process.id();
        let started = process
            .bind_program(&image)
            .and_then(|()| kernel.execute_process(id).map(|_| ()));
        if let Err(err) = started {
            // Nothing else refers to the root yet; do not leave it behind.
            if let Err(halt_err) = kernel.halt_process(id) {
                warn!(pid = %id, %halt_err, "failed to clean up root process");
            }
            return Err(err).with_context(|| format!("failed to start root process {id}"));
        }

        info!(pid = %id, image = %self.config.image, len = image.len(), "booted");
        Ok(id)
    }
}

/// Boot `name` from `root` with default settings.
pub fn boot(kernel: &Kernel, root: impl Into<PathBuf>, name: &str) -> anyhow::Result<ProcessId> {
    let config = BootConfig {
        image: name.to_string(),
        ..BootConfig::default()
    };
    Bootloader::with_config(root, config).boot(kernel)
}
