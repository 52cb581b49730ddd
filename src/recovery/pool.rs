//! Fragment pools and chain stitching for recovery mode.
//!
//! Fragments are kept in one flat vector per pool, sorted by offset, and
//! linked to each other by index. A fragment's predecessor is set at most
//! once, so a chain can never loop back into itself; chain roots are the
//! fragments nothing links to.

use tracing::debug;

use crate::container::format::{BLOCK_CAPACITY, BLOCK_HEADER_SIZE};
use crate::container::reader::ByteReader;
use crate::error::{DbxError, Partial};

/// Written over the first payload bytes of a deleted block, where the
/// back-pointer destroyed the original content.
pub const DELETED_PLACEHOLDER: &[u8; 4] = b"----";

/// Identifies the pool a fragment belongs to.
///
/// `bias` is the distance between where a block sits in the scanned stream
/// and the offset it records for itself; blocks of one container share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub deleted: bool,
    pub bias: u64,
}

/// One storage block found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Offset the block records for itself.
    pub offset: u32,
    /// Declared offset of the following block, 0 at the end of a chain.
    pub next: u32,
    /// Declared offset of the preceding block (deleted blocks only).
    pub prev: u32,
    /// Declared payload size.
    pub size: u32,
    pub prev_link: Option<usize>,
    pub next_link: Option<usize>,
}

impl Fragment {
    pub fn live(offset: u32, next: u32, size: u32) -> Self {
        Self {
            offset,
            next,
            prev: 0,
            size,
            prev_link: None,
            next_link: None,
        }
    }

    pub fn deleted(offset: u32, next: u32, prev: u32, size: u32) -> Self {
        Self {
            prev,
            ..Self::live(offset, next, size)
        }
    }

    /// Payload bytes to take; deleted blocks over-report their size.
    pub fn payload_len(&self) -> usize {
        (self.size as usize).min(BLOCK_CAPACITY)
    }
}

/// All fragments sharing one [`PoolKey`].
#[derive(Debug, Clone)]
pub struct ChainPool {
    key: PoolKey,
    fragments: Vec<Fragment>,
    /// Fragments without a predecessor.
    unresolved: usize,
    roots: Vec<usize>,
    lengths: Vec<usize>,
}

impl ChainPool {
    pub fn new(key: PoolKey) -> Self {
        Self {
            key,
            fragments: Vec::new(),
            unresolved: 0,
            roots: Vec::new(),
            lengths: Vec::new(),
        }
    }

    pub fn key(&self) -> PoolKey {
        self.key
    }

    pub fn is_deleted(&self) -> bool {
        self.key.deleted
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Add a fragment. Links are only made by [`ChainPool::stitch`].
    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
        self.unresolved += 1;
    }

    /// Number of fragments still without a predecessor.
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    /// Link every fragment to its successor, then collect chain roots.
    ///
    /// The successor is looked for first in the very next fragment (blocks
    /// are usually written in chain order) and then by binary search over
    /// the offset-sorted pool. A successor that already has a predecessor is
    /// not taken again. For deleted blocks the successor's back-pointer must
    /// name the fragment as well.
    pub fn stitch(&mut self) {
        if !self.fragments.windows(2).all(|w| w[0].offset < w[1].offset) {
            self.fragments.sort_by_key(|f| f.offset);
            self.fragments.dedup_by_key(|f| f.offset);
        }
        for f in &mut self.fragments {
            f.prev_link = None;
            f.next_link = None;
        }
        self.unresolved = self.fragments.len();

        for i in 0..self.fragments.len() {
            let next = self.fragments[i].next;
            if next == 0 {
                continue;
            }
            let Some(j) = self.find(next, i + 1) else {
                continue;
            };
            if self.accepts(i, j) {
                self.fragments[i].next_link = Some(j);
                self.fragments[j].prev_link = Some(i);
                self.unresolved -= 1;
            }
        }

        self.roots = (0..self.fragments.len())
            .filter(|&i| self.fragments[i].prev_link.is_none())
            .collect();
        self.lengths = self
            .roots
            .iter()
            .map(|&root| self.chain_indices(root).count())
            .collect();

        debug!(
            deleted = self.key.deleted,
            bias = self.key.bias,
            fragments = self.fragments.len(),
            chains = self.roots.len(),
            "Stitched fragment pool"
        );
    }

    fn find(&self, offset: u32, hint: usize) -> Option<usize> {
        if self.fragments.get(hint).is_some_and(|f| f.offset == offset) {
            return Some(hint);
        }
        self.fragments
            .binary_search_by_key(&offset, |f| f.offset)
            .ok()
    }

    fn accepts(&self, from: usize, to: usize) -> bool {
        if from == to || self.fragments[to].prev_link.is_some() {
            return false;
        }
        !self.key.deleted || self.fragments[to].prev == self.fragments[from].offset
    }

    /// Number of recoverable messages.
    pub fn chain_count(&self) -> usize {
        self.roots.len()
    }

    /// Number of fragments in chain `n`.
    pub fn chain_len(&self, n: usize) -> Option<usize> {
        self.lengths.get(n).copied()
    }

    /// The first fragment of chain `n`.
    pub fn root(&self, n: usize) -> Option<&Fragment> {
        self.roots.get(n).map(|&i| &self.fragments[i])
    }

    /// Where the first block of chain `n` sits in the scanned stream.
    pub fn root_position(&self, n: usize) -> Option<u64> {
        self.root(n).map(|f| self.key.bias + u64::from(f.offset))
    }

    /// Fragments of chain `n`, in chain order.
    pub fn chain(&self, n: usize) -> impl Iterator<Item = &Fragment> + '_ {
        let root = self.roots.get(n).copied();
        root.into_iter()
            .flat_map(move |r| self.chain_indices(r))
            .map(move |i| &self.fragments[i])
    }

    fn chain_indices(&self, root: usize) -> impl Iterator<Item = usize> + '_ {
        let limit = self.fragments.len();
        std::iter::successors(Some(root), move |&i| self.fragments[i].next_link).take(limit)
    }

    /// Rebuild the message held by chain `n`.
    ///
    /// Deleted messages get [`DELETED_PLACEHOLDER`] in place of each
    /// block's first four payload bytes, and their run of trailing NUL bytes
    /// is cut down to one.
    pub fn materialize(&self, reader: &ByteReader<'_>, n: usize) -> Partial<Vec<u8>> {
        let mut body: Vec<u8> = Vec::new();
        let mut error = None;

        for fragment in self.chain(n) {
            let pos = self.key.bias + u64::from(fragment.offset) + BLOCK_HEADER_SIZE;
            let want = fragment.payload_len();
            let payload = reader.bytes_upto(pos, want);
            if self.key.deleted {
                body.extend_from_slice(DELETED_PLACEHOLDER);
                body.extend_from_slice(payload.get(DELETED_PLACEHOLDER.len()..).unwrap_or(&[]));
            } else {
                body.extend_from_slice(payload);
            }
            if payload.len() < want {
                error = Some(DbxError::OutOfBounds {
                    offset: pos,
                    len: want,
                });
                break;
            }
        }

        if self.key.deleted {
            trim_trailing_nuls(&mut body);
        }

        match error {
            Some(e) => Partial::truncated(body, e),
            None => Partial::complete(body),
        }
    }
}

/// Cut a run of trailing NUL bytes down to a single one.
fn trim_trailing_nuls(body: &mut Vec<u8>) {
    if body.last() != Some(&0) {
        return;
    }
    let content = body.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    body.truncate(content + 1);
}
