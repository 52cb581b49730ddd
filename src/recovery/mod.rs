//! Recovery mode: rebuild messages from raw storage blocks without
//! trusting the index, deleted messages included.

pub mod pool;
pub mod scanner;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::container::reader::{ByteReader, ByteSource};
use crate::error::{Partial, Result};

use self::pool::ChainPool;

/// Identifies one recoverable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRef {
    pub pool: usize,
    pub chain: usize,
    /// Stream position of the chain's first block.
    pub position: u64,
    pub deleted: bool,
    pub fragments: usize,
}

/// A scanned file and the block chains found in it.
pub struct RecoveredFile {
    path: Option<PathBuf>,
    source: ByteSource,
    pools: Vec<ChainPool>,
}

impl RecoveredFile {
    /// Map `path` and scan it. The callback receives
    /// `(bytes_scanned, total_bytes)`.
    pub fn scan(path: impl AsRef<Path>, progress: Option<&mut dyn FnMut(u64, u64)>) -> Result<Self> {
        let path = path.as_ref();
        let source = ByteSource::open(path)?;
        info!(path = %path.display(), "Scanning for storage blocks");
        let mut file = Self::scan_source(source, progress);
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Scan bytes held in memory.
    pub fn scan_bytes(bytes: Vec<u8>) -> Self {
        Self::scan_source(ByteSource::from(bytes), None)
    }

    fn scan_source(source: ByteSource, progress: Option<&mut dyn FnMut(u64, u64)>) -> Self {
        let pools = scanner::scan(&ByteReader::new(source.as_slice()), progress);
        Self {
            path: None,
            source,
            pools,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.source.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.source.as_slice().is_empty()
    }

    pub fn pools(&self) -> &[ChainPool] {
        &self.pools
    }

    /// Total number of recoverable messages across all pools.
    pub fn message_count(&self) -> usize {
        self.pools.iter().map(ChainPool::chain_count).sum()
    }

    /// Every recoverable message, pool by pool.
    pub fn chains(&self) -> impl Iterator<Item = ChainRef> + '_ {
        self.pools.iter().enumerate().flat_map(|(p, pool)| {
            (0..pool.chain_count()).map(move |c| ChainRef {
                pool: p,
                chain: c,
                position: pool.root_position(c).unwrap_or(0),
                deleted: pool.is_deleted(),
                fragments: pool.chain_len(c).unwrap_or(0),
            })
        })
    }

    /// Rebuild message `chain` of pool `pool`.
    pub fn message(&self, pool: usize, chain: usize) -> Option<Partial<Vec<u8>>> {
        let pool = self.pools.get(pool)?;
        if chain >= pool.chain_count() {
            return None;
        }
        Some(pool.materialize(&ByteReader::new(self.source.as_slice()), chain))
    }
}
