//! Output and error sinks: the polymorphic output handler, the built-in
//! file-backed implementation, and the output-options record that owns
//! them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Container;
use crate::error::{ErrorHandler, ErrorKind};

/// Receives the compressed stream. `begin_image` is called once per mip
/// surface before its bytes arrive; `write_data` returns whether the write
/// succeeded, and a `false` aborts compression.
pub trait OutputHandler {
    fn begin_image(&mut self, size: usize, width: u32, height: u32, depth: u32, face: u32, miplevel: u32);

    #[must_use]
    fn write_data(&mut self, data: &[u8]) -> bool;
}

/// File-backed output handler used by the file-name output mode.
pub struct FileOutputHandler {
    writer: BufWriter<File>,
}

impl FileOutputHandler {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("could not create output file {}", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("could not flush output file")
    }
}

impl OutputHandler for FileOutputHandler {
    fn begin_image(&mut self, _size: usize, _width: u32, _height: u32, _depth: u32, _face: u32, _miplevel: u32) {}

    fn write_data(&mut self, data: &[u8]) -> bool {
        self.writer.write_all(data).is_ok()
    }
}

/// Output handler that appends everything to a shared growable buffer.
/// Clones share the buffer, so the caller can keep one clone and read the
/// bytes back after compression.
#[derive(Clone, Default)]
pub struct MemoryOutputHandler {
    bytes: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MemoryOutputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }
}

impl OutputHandler for MemoryOutputHandler {
    fn begin_image(&mut self, _size: usize, _width: u32, _height: u32, _depth: u32, _face: u32, _miplevel: u32) {}

    fn write_data(&mut self, data: &[u8]) -> bool {
        self.bytes.lock().unwrap().extend_from_slice(data);
        true
    }
}

/// Where the compressed stream goes and how errors are reported.
pub struct OutputOptions {
    pub(crate) file_name: Option<PathBuf>,
    pub(crate) output_handler: Option<Box<dyn OutputHandler + Send>>,
    pub(crate) error_handler: Option<Box<dyn ErrorHandler + Send>>,
    pub(crate) output_header: bool,
    pub(crate) container: Container,
    pub(crate) user_version: Option<u32>,
    pub(crate) srgb_flag: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputOptions {
    pub fn new() -> Self {
        Self {
            file_name: None,
            output_handler: None,
            error_handler: None,
            output_header: true,
            container: Container::Dds,
            user_version: None,
            srgb_flag: false,
        }
    }

    /// Write to a file; replaces any handler set before.
    pub fn set_file_name<P: AsRef<Path>>(&mut self, path: P) {
        self.file_name = Some(path.as_ref().to_path_buf());
        self.output_handler = None;
    }

    /// Stream through a custom handler; replaces any file name set before.
    pub fn set_output_handler(&mut self, handler: Box<dyn OutputHandler + Send>) {
        self.output_handler = Some(handler);
        self.file_name = None;
    }

    pub fn take_output_handler(&mut self) -> Option<Box<dyn OutputHandler + Send>> {
        self.output_handler.take()
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler + Send>) {
        self.error_handler = Some(handler);
    }

    pub fn set_output_header(&mut self, output_header: bool) {
        self.output_header = output_header;
    }

    pub fn set_container(&mut self, container: Container) {
        self.container = container;
    }

    pub fn set_user_version(&mut self, version: u32) {
        self.user_version = Some(version);
    }

    pub fn set_srgb_flag(&mut self, srgb: bool) {
        self.srgb_flag = srgb;
    }

    /// Report an error to the registered handler, if any.
    pub(crate) fn error(&mut self, kind: ErrorKind) {
        log::error!("compression error: {}", kind);
        if let Some(handler) = &mut self.error_handler {
            handler.error(kind);
        }
    }
}
