//! Kernel configuration consumed from the out-of-scope command-line layer.

use std::path::PathBuf;

/// Text encoding of a delimited source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Sjis,
}

/// Flags recognised by the kernel. The CLI populates this once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct Flags {
    /// Base directory for unqualified file names in FROM clauses.
    pub repository: PathBuf,
    /// Field delimiter. `None` means auto-detection is left to the loader.
    pub delimiter: Option<u8>,
    pub encoding: Encoding,
    /// Treat the first line of every source as data rather than a header.
    pub no_header: bool,
    /// Worker count for record-sharded operator passes.
    pub cpu: usize,
    /// Suppress operator-level log events.
    pub quiet: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            repository: PathBuf::from("."),
            delimiter: Some(b','),
            encoding: Encoding::Utf8,
            no_header: false,
            cpu: available_cpu(),
            quiet: false,
        }
    }
}

impl Flags {
    /// Clamp a user-supplied CPU count into a usable worker count.
    pub fn effective_cpu(&self) -> usize {
        self.cpu.max(1)
    }
}

fn available_cpu() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
