//! Raw block scanner.
//!
//! Ignores the index entirely and walks the file four bytes at a time,
//! looking at five consecutive words for the header of a storage block:
//!
//! ```text
//!            word0   word1   word2           word3   word4
//! live       self    0x200   1..=0x200 size  next    (payload)
//! deleted    self    0x1FC   0x210           next    prev
//! ```
//!
//! `self` is the offset the block records for itself. A block found at
//! stream position `p` with `self == o` belongs to the pool with bias
//! `p - o`, so the blocks of a container embedded in a larger image still
//! land together. Once a header is found its payload is skipped.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::container::format::BLOCK_CAPACITY;
use crate::container::reader::ByteReader;
use crate::recovery::pool::{ChainPool, Fragment, PoolKey};

const WORD: u64 = 4;
const WINDOW_WORDS: usize = 5;

const LIVE_MARKER: u32 = 0x200;
const DELETED_MARKER: u32 = 0x1FC;
const DELETED_SIZE: u32 = 0x210;

/// Progress is reported every this many bytes.
const PROGRESS_STEP: u64 = 1 << 20;

/// Five consecutive little-endian words starting at `pos`.
#[derive(Debug, Clone, Copy)]
struct Window {
    pos: u64,
    words: [u32; WINDOW_WORDS],
}

impl Window {
    fn load(reader: &ByteReader<'_>, pos: u64) -> Option<Self> {
        let mut words = [0u32; WINDOW_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = reader.u32(pos + WORD * i as u64).ok()?;
        }
        Some(Self { pos, words })
    }

    /// Advance by one word, reading only the new one.
    fn slide(&mut self, reader: &ByteReader<'_>) -> bool {
        let incoming = self.pos + WORD * WINDOW_WORDS as u64;
        match reader.u32(incoming) {
            Ok(word) => {
                self.words.copy_within(1.., 0);
                self.words[WINDOW_WORDS - 1] = word;
                self.pos += WORD;
                true
            }
            Err(_) => false,
        }
    }
}

/// Whether `offset`, relative to a container starting at `bias`, could
/// address a block in a stream of `len` bytes.
fn valid_offset(offset: u32, bias: u64, len: u64) -> bool {
    offset % 4 == 0 && bias + u64::from(offset) < len
}

/// Recognise a block header in `words` read at stream position `pos`.
fn classify(words: &[u32; WINDOW_WORDS], pos: u64, len: u64) -> Option<(PoolKey, Fragment)> {
    let [this, marker, size, next, prev] = *words;
    if this == 0 || this % 4 != 0 || u64::from(this) > pos {
        return None;
    }
    let bias = pos - u64::from(this);
    if next == this || !valid_offset(next, bias, len) {
        return None;
    }

    match marker {
        LIVE_MARKER if size > 0 && size as usize <= BLOCK_CAPACITY => Some((
            PoolKey {
                deleted: false,
                bias,
            },
            Fragment::live(this, next, size),
        )),
        DELETED_MARKER if size == DELETED_SIZE && valid_offset(prev, bias, len) => Some((
            PoolKey {
                deleted: true,
                bias,
            },
            Fragment::deleted(this, next, prev, size),
        )),
        _ => None,
    }
}

/// Pools in order of first appearance.
#[derive(Debug, Default)]
pub struct PoolSet {
    pools: Vec<ChainPool>,
    by_key: HashMap<PoolKey, usize>,
}

impl PoolSet {
    fn push(&mut self, key: PoolKey, fragment: Fragment) {
        let index = *self.by_key.entry(key).or_insert_with(|| {
            self.pools.push(ChainPool::new(key));
            self.pools.len() - 1
        });
        self.pools[index].push(fragment);
    }

    fn stitch(&mut self) {
        for pool in &mut self.pools {
            pool.stitch();
        }
    }

    pub fn into_pools(self) -> Vec<ChainPool> {
        self.pools
    }
}

/// Scan the whole stream for storage blocks and stitch them into chains.
///
/// The progress callback receives `(bytes_scanned, total_bytes)`.
pub fn scan(
    reader: &ByteReader<'_>,
    mut progress: Option<&mut dyn FnMut(u64, u64)>,
) -> Vec<ChainPool> {
    let len = reader.len();
    let mut set = PoolSet::default();
    let mut found = 0usize;
    let mut next_report = 0u64;

    let mut window = Window::load(reader, 0);
    while let Some(mut w) = window {
        if w.pos >= next_report {
            if let Some(cb) = progress.as_deref_mut() {
                cb(w.pos, len);
            }
            next_report = w.pos + PROGRESS_STEP;
        }

        if let Some((key, fragment)) = classify(&w.words, w.pos, len) {
            set.push(key, fragment);
            found += 1;
            window = Window::load(reader, w.pos + BLOCK_CAPACITY as u64);
        } else {
            window = w.slide(reader).then_some(w);
        }
    }
    if let Some(cb) = progress.as_deref_mut() {
        cb(len, len);
    }

    debug!(fragments = found, pools = set.pools.len(), "Scan complete");
    set.stitch();
    let pools = set.into_pools();
    info!(
        bytes = len,
        fragments = found,
        messages = pools.iter().map(ChainPool::chain_count).sum::<usize>(),
        "Recovered chains"
    );
    pools
}
