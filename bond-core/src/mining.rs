//! Proof-of-work mining and difficulty adjustment.

use crate::block::Block;
use shared::{BlockchainError, Hash256, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MiningResult {
    pub block: Block,
    pub attempts: u64,
}

/// Finds a nonce under which `block`'s hash meets its configured
/// difficulty, searching in parallel across `config.threads` workers.
/// Genesis blocks (`index == 0`) require no proof of work and are
/// returned unchanged.
pub struct Miner {
    config: MinerConfig,
    mining: Arc<AtomicBool>,
}

impl Miner {
    #[must_use]
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            mining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mines `block` in place, returning the nonce that was found and
    /// the number of attempts across all worker threads.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if no worker reports a result, which would
    /// indicate every thread was stopped before finding one.
    pub fn mine(&self, block: Block) -> Result<MiningResult> {
        if block.is_genesis() {
            return Ok(MiningResult { block, attempts: 0 });
        }

        self.mining.store(true, Ordering::SeqCst);
        let result: Arc<Mutex<Option<(u64, u64)>>> = Arc::new(Mutex::new(None));
        let nonce_span = u64::MAX / self.config.threads as u64;
        let mut handles = Vec::with_capacity(self.config.threads);

        for thread_id in 0..self.config.threads {
            let block = block.clone();
            let mining = Arc::clone(&self.mining);
            let result = Arc::clone(&result);
            let start = thread_id as u64 * nonce_span;
            let end = if thread_id + 1 == self.config.threads {
                u64::MAX
            } else {
                start + nonce_span
            };

            handles.push(thread::spawn(move || {
                Self::mine_range(block, start, end, &mining, &result);
            }));
        }

        for handle in handles {
            let _ = handle.join();
        }

        let (nonce, attempts) = result
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BlockchainError::Internal("no worker found a valid nonce".into()))?;

        let mut mined = block;
        mined.nonce = nonce;
        mined.hash = mined.compute_hash();
        Ok(MiningResult { block: mined, attempts })
    }

    fn mine_range(
        mut block: Block,
        start: u64,
        end: u64,
        mining: &Arc<AtomicBool>,
        result: &Arc<Mutex<Option<(u64, u64)>>>,
    ) {
        let mut attempts = 0u64;
        for nonce in start..end {
            if !mining.load(Ordering::SeqCst) {
                break;
            }
            block.nonce = nonce;
            attempts += 1;
            if block.compute_hash().meets_difficulty(block.difficulty) {
                mining.store(false, Ordering::SeqCst);
                *result.lock().unwrap() = Some((nonce, attempts));
                break;
            }
        }
    }

    pub fn stop(&self) {
        self.mining.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::SeqCst)
    }

    /// Estimates local hashes-per-second by hashing a throwaway block
    /// at a difficulty unlikely to be satisfied within `duration_secs`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_hashrate(&self, duration_secs: u64) -> f64 {
        let mut block = Block::genesis(0, 32, vec![]);
        block.index = 1; // force PoW hashing path, not the genesis bypass
        let start = std::time::Instant::now();
        let mut attempts = 0u64;
        while start.elapsed().as_secs() < duration_secs {
            block.nonce = attempts;
            let _ = block.compute_hash();
            attempts += 1;
        }
        attempts as f64 / start.elapsed().as_secs_f64()
    }
}

/// Adjusts difficulty by the ratio of actual to expected time over
/// the last `adjustment_period` blocks, clamped to
/// `network_params.max_difficulty_ratio`.
pub struct DifficultyAdjuster {
    pub target_block_time_secs: u64,
    pub adjustment_period: u64,
    pub max_difficulty_ratio: f64,
}

impl DifficultyAdjuster {
    #[must_use]
    pub const fn new(target_block_time_secs: u64, adjustment_period: u64, max_difficulty_ratio: f64) -> Self {
        Self {
            target_block_time_secs,
            adjustment_period,
            max_difficulty_ratio,
        }
    }

    /// Computes the next difficulty from the trailing window of
    /// `blocks`. Returns `current_difficulty` unchanged until at
    /// least `adjustment_period` blocks have accumulated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlock` if timestamps in the window are not
    /// monotonically increasing.
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate_new_difficulty(&self, current_difficulty: u32, blocks: &[Block]) -> Result<u32> {
        let period = self.adjustment_period as usize;
        if blocks.len() < period {
            return Ok(current_difficulty);
        }

        let window = &blocks[blocks.len() - period..];
        let first = window.first().unwrap().timestamp;
        let last = window.last().unwrap().timestamp;
        if last < first {
            return Err(BlockchainError::InvalidBlock(
                "block timestamps in adjustment window are not monotonic".into(),
            ));
        }

        let actual_time_secs = ((last - first) / 1000).max(1) as f64;
        let expected_time_secs = (self.target_block_time_secs * (self.adjustment_period - 1).max(1)) as f64;
        let ratio = (actual_time_secs / expected_time_secs).clamp(1.0 / self.max_difficulty_ratio, self.max_difficulty_ratio);

        let new_difficulty = if ratio > 1.0 {
            let decrease = (ratio - 1.0) as u32;
            current_difficulty.saturating_sub(decrease).max(1)
        } else if ratio < 1.0 {
            let increase = ((1.0 / ratio) - 1.0) as u32;
            current_difficulty.saturating_add(increase)
        } else {
            current_difficulty
        };

        Ok(new_difficulty.max(1))
    }
}
