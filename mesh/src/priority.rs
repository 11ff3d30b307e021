//! Priority calculation, a short-lived priority cache, and the
//! four-level priority queue outbound messages are dequeued from.

use lru::LruCache;
use persistence::{Store, Sublevel};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::Result;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// CRITICAL(0) is dequeued first; LOW(3) last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    fn promote(self) -> Self {
        match self {
            Self::Low => Self::Normal,
            Self::Normal => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    fn demote(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Normal,
            Self::Normal | Self::Low => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Hash)]
pub enum MessageKind {
    Block { index: u64 },
    Transaction { fee: u64, inputs: u32, outputs: u32 },
    MerkleProof,
    Sync,
    Discovery,
    Other,
}

#[derive(Debug, Clone)]
pub struct PriorityMessage {
    pub kind: MessageKind,
    pub timestamp: i64,
    /// Leading bytes of the payload, used only to key the priority
    /// cache — not reinterpreted as message content.
    pub payload_prefix: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkContext {
    pub current_height: u64,
    pub avg_fee_sat_per_byte: f32,
    pub high_fee_sat_per_byte: f32,
    pub normal_fee_sat_per_byte: f32,
    pub congestion: f32,
    pub battery_level: f32,
    pub emergency_mode: bool,
    pub utxo_completeness: f32,
    pub block_priority_boost: f32,
    pub merkle_proof_priority: Priority,
}

/// `fee / (148*inputs + 34*outputs + 10)`; zero on overflow, zero
/// inputs/outputs, or any other degenerate shape.
#[must_use]
pub fn fee_per_byte(fee: u64, inputs: u32, outputs: u32) -> f32 {
    let size = 148u64.saturating_mul(u64::from(inputs)) + 34u64.saturating_mul(u64::from(outputs)) + 10;
    if size == 0 {
        0.0
    } else {
        fee as f32 / size as f32
    }
}

fn base_priority(kind: &MessageKind, ctx: &NetworkContext) -> Priority {
    match kind {
        MessageKind::Block { index } => {
            if ctx.current_height.saturating_sub(*index) > 10 {
                Priority::High
            } else {
                Priority::Critical
            }
        }
        MessageKind::MerkleProof | MessageKind::Sync => Priority::High,
        MessageKind::Discovery => Priority::Normal,
        MessageKind::Transaction { fee, inputs, outputs } => {
            let fpb = fee_per_byte(*fee, *inputs, *outputs);
            if fpb >= ctx.high_fee_sat_per_byte {
                Priority::High
            } else if fpb >= ctx.normal_fee_sat_per_byte {
                Priority::Normal
            } else {
                Priority::Low
            }
        }
        MessageKind::Other => Priority::Low,
    }
}

struct Factor {
    weight: f32,
    score: f32,
}

fn contextual_factors(msg: &PriorityMessage, ctx: &NetworkContext) -> Vec<Factor> {
    let fee_per_byte_score = match &msg.kind {
        MessageKind::Transaction { fee, inputs, outputs } if ctx.avg_fee_sat_per_byte > 0.0 => {
            (fee_per_byte(*fee, *inputs, *outputs) / ctx.avg_fee_sat_per_byte).min(2.0)
        }
        _ => 1.0,
    };

    let congestion_score = if matches!(msg.kind, MessageKind::Block { .. }) {
        1.0
    } else {
        (1.0 - 0.5 * ctx.congestion).max(0.5)
    };

    let battery_score = match (&msg.kind, ctx.battery_level < 0.2) {
        (MessageKind::Transaction { .. }, true) => 0.8,
        _ => 1.0,
    };

    let emergency_score = if ctx.emergency_mode { 1.5 } else { 1.0 };

    let utxo_completeness_score = match (&msg.kind, ctx.utxo_completeness < 0.9) {
        (MessageKind::Sync, true) => 1.2,
        (_, true) => 0.9,
        (_, false) => 1.0,
    };

    vec![
        Factor { weight: 1.0, score: fee_per_byte_score },
        Factor { weight: 0.3, score: congestion_score },
        Factor { weight: 0.2, score: battery_score },
        Factor { weight: 2.0, score: emergency_score },
        Factor { weight: 0.1, score: utxo_completeness_score },
    ]
}

fn weighted_score(msg: &PriorityMessage, ctx: &NetworkContext) -> f32 {
    let factors = contextual_factors(msg, ctx);
    let total_weight: f32 = factors.iter().map(|f| f.weight).sum();
    if total_weight == 0.0 {
        return 1.0;
    }
    factors.iter().map(|f| f.weight * f.score).sum::<f32>() / total_weight
}

/// Computes the final priority for `msg` under `ctx`: base assignment,
/// weighted-factor promotion/demotion, then the fixed overrides.
#[must_use]
pub fn calculate_priority(msg: &PriorityMessage, ctx: &NetworkContext) -> Priority {
    let base = base_priority(&msg.kind, ctx);
    let score = weighted_score(msg, ctx);
    let mut priority = if score > 1.3 {
        base.promote()
    } else if score < 0.7 {
        base.demote()
    } else {
        base
    };

    match &msg.kind {
        MessageKind::Block { .. } if ctx.block_priority_boost > 1.0 => {
            priority = Priority::Critical;
        }
        MessageKind::Transaction { .. } | MessageKind::Block { .. } if ctx.emergency_mode && priority > Priority::High => {
            priority = Priority::High;
        }
        MessageKind::Sync => {
            priority = ctx.merkle_proof_priority;
        }
        _ => {}
    }
    priority
}

fn significant_change(prev: &NetworkContext, cur: &NetworkContext) -> bool {
    let avg_fee_delta = if prev.avg_fee_sat_per_byte == 0.0 {
        0.0
    } else {
        (cur.avg_fee_sat_per_byte - prev.avg_fee_sat_per_byte).abs() / prev.avg_fee_sat_per_byte
    };
    avg_fee_delta > 0.1
        || (cur.congestion - prev.congestion).abs() > 0.2
        || (cur.battery_level - prev.battery_level).abs() > 0.1
        || (cur.utxo_completeness - prev.utxo_completeness).abs() > 0.05
        || cur.emergency_mode != prev.emergency_mode
}

fn cache_key(msg: &PriorityMessage) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    msg.kind.hash(&mut hasher);
    msg.timestamp.hash(&mut hasher);
    msg.payload_prefix.hash(&mut hasher);
    hasher.finish()
}

struct CachedPriority {
    priority: Priority,
    inserted_at: Instant,
}

/// Memoizes [`calculate_priority`] results for up to 60 seconds,
/// invalidating the whole cache on a significant context change.
pub struct PriorityCache {
    entries: LruCache<u64, CachedPriority>,
    last_context: Option<NetworkContext>,
    ttl: Duration,
}

impl PriorityCache {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: LruCache::new(NonZeroUsize::new(1000).unwrap()), last_context: None, ttl: Duration::from_secs(60) }
    }

    pub fn get_or_compute(&mut self, msg: &PriorityMessage, ctx: &NetworkContext) -> Priority {
        if let Some(prev) = &self.last_context {
            if significant_change(prev, ctx) {
                self.entries.clear();
            }
        }
        self.last_context = Some(*ctx);

        let key = cache_key(msg);
        if let Some(cached) = self.entries.get(&key) {
            if cached.inserted_at.elapsed() < self.ttl {
                return cached.priority;
            }
        }
        let priority = calculate_priority(msg, ctx);
        self.entries.put(key, CachedPriority { priority, inserted_at: Instant::now() });
        priority
    }
}

impl Default for PriorityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PriorityQueueConfig {
    pub capacity_per_priority: usize,
    pub emergency_reserve: usize,
    pub ttl: Duration,
}

impl Default for PriorityQueueConfig {
    fn default() -> Self {
        Self { capacity_per_priority: 1000, emergency_reserve: 50, ttl: Duration::from_secs(300) }
    }
}

struct QueueEntry<T> {
    item: T,
    emergency: bool,
    enqueued_at: Instant,
}

/// Four FIFO sub-queues, one per priority level, with an emergency
/// reserve that lets flagged entries bypass a full priority-level cap.
pub struct PriorityQueue<T> {
    queues: [VecDeque<QueueEntry<T>>; 4],
    config: PriorityQueueConfig,
    reserve_used: usize,
    expired_messages: u64,
}

impl<T> PriorityQueue<T> {
    #[must_use]
    pub fn new(config: PriorityQueueConfig) -> Self {
        Self { queues: [VecDeque::new(), VecDeque::new(), VecDeque::new(), VecDeque::new()], config, reserve_used: 0, expired_messages: 0 }
    }

    /// Enqueues `item` at `priority`. Rejects (returning the item back)
    /// when that priority level is full and the entry isn't emergency
    /// flagged, or the emergency reserve is also exhausted.
    pub fn enqueue(&mut self, item: T, priority: Priority, emergency: bool) -> std::result::Result<(), T> {
        let idx = priority as usize;
        let full = self.queues[idx].len() >= self.config.capacity_per_priority;
        if full {
            if emergency && self.reserve_used < self.config.emergency_reserve {
                self.reserve_used += 1;
            } else {
                return Err(item);
            }
        }
        self.queues[idx].push_back(QueueEntry { item, emergency, enqueued_at: Instant::now() });
        Ok(())
    }

    /// Dequeues from the lowest numeric (highest-urgency) priority with
    /// waiting items; within a priority, FIFO order breaks ties.
    pub fn dequeue(&mut self) -> Option<T> {
        for queue in &mut self.queues {
            if let Some(entry) = queue.pop_front() {
                if entry.emergency && self.reserve_used > 0 {
                    self.reserve_used -= 1;
                }
                return Some(entry.item);
            }
        }
        None
    }

    /// Drops entries older than the configured TTL, incrementing
    /// `expired_messages` for each.
    pub fn sweep_expired(&mut self) {
        let ttl = self.config.ttl;
        for queue in &mut self.queues {
            let before = queue.len();
            queue.retain(|entry| entry.enqueued_at.elapsed() <= ttl);
            self.expired_messages += (before - queue.len()) as u64;
        }
    }

    #[must_use]
    pub fn expired_messages(&self) -> u64 {
        self.expired_messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry<T> {
    priority: u8,
    emergency: bool,
    item: T,
}

impl<T: Serialize + DeserializeOwned + Send + Sync> PriorityQueue<T> {
    /// Snapshots every queued entry (in dequeue order, priority by
    /// priority) to `key` under `sublevel`. Entry age is not
    /// preserved: a restored entry's TTL clock restarts from zero.
    pub async fn snapshot<S: Store>(&self, store: &S, sublevel: Sublevel, key: &str) -> Result<()>
    where
        T: Clone,
    {
        let mut entries = Vec::with_capacity(self.len());
        for (idx, queue) in self.queues.iter().enumerate() {
            for entry in queue {
                entries.push(SnapshotEntry { priority: idx as u8, emergency: entry.emergency, item: entry.item.clone() });
            }
        }
        store.put_typed(sublevel, key, &entries, false).await
    }

    /// Restores a queue previously written by [`Self::snapshot`]. A
    /// missing or corrupt key yields an empty queue rather than an
    /// error, matching the store's not-found-on-corruption contract.
    pub async fn restore<S: Store>(store: &S, sublevel: Sublevel, key: &str, config: PriorityQueueConfig) -> Result<Self> {
        let mut queue = Self::new(config);
        if let Some(entries) = store.get_typed::<Vec<SnapshotEntry<T>>>(sublevel, key).await? {
            for entry in entries {
                let priority = match entry.priority {
                    0 => Priority::Critical,
                    1 => Priority::High,
                    2 => Priority::Normal,
                    _ => Priority::Low,
                };
                let _ = queue.enqueue(entry.item, priority, entry.emergency);
            }
        }
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NetworkContext {
        NetworkContext {
            current_height: 100,
            avg_fee_sat_per_byte: 10.0,
            high_fee_sat_per_byte: 20.0,
            normal_fee_sat_per_byte: 5.0,
            congestion: 0.1,
            battery_level: 0.9,
            emergency_mode: false,
            utxo_completeness: 1.0,
            block_priority_boost: 1.0,
            merkle_proof_priority: Priority::High,
        }
    }

    #[test]
    fn recent_block_is_critical_stale_block_is_demoted_to_high() {
        let recent = PriorityMessage { kind: MessageKind::Block { index: 99 }, timestamp: 0, payload_prefix: vec![] };
        let stale = PriorityMessage { kind: MessageKind::Block { index: 50 }, timestamp: 0, payload_prefix: vec![] };
        assert_eq!(calculate_priority(&recent, &ctx()), Priority::Critical);
        assert_eq!(calculate_priority(&stale, &ctx()), Priority::High);
    }

    #[test]
    fn high_fee_transaction_outranks_low_fee_transaction() {
        let high_fee = PriorityMessage { kind: MessageKind::Transaction { fee: 50_000, inputs: 1, outputs: 1 }, timestamp: 0, payload_prefix: vec![] };
        let low_fee = PriorityMessage { kind: MessageKind::Transaction { fee: 10, inputs: 1, outputs: 1 }, timestamp: 0, payload_prefix: vec![] };
        assert!(calculate_priority(&high_fee, &ctx()) < calculate_priority(&low_fee, &ctx()));
    }

    #[test]
    fn emergency_mode_upgrades_transactions_to_at_least_high() {
        let mut context = ctx();
        context.emergency_mode = true;
        let low_fee_tx = PriorityMessage { kind: MessageKind::Transaction { fee: 1, inputs: 1, outputs: 1 }, timestamp: 0, payload_prefix: vec![] };
        assert!(calculate_priority(&low_fee_tx, &context) <= Priority::High);
    }

    #[test]
    fn block_priority_boost_forces_critical() {
        let mut context = ctx();
        context.block_priority_boost = 2.0;
        let stale_block = PriorityMessage { kind: MessageKind::Block { index: 1 }, timestamp: 0, payload_prefix: vec![] };
        assert_eq!(calculate_priority(&stale_block, &context), Priority::Critical);
    }

    #[test]
    fn block_boost_and_emergency_mode_compose_to_critical() {
        let mut context = ctx();
        context.emergency_mode = true;
        context.block_priority_boost = 2.0;
        let stale_block = PriorityMessage { kind: MessageKind::Block { index: 1 }, timestamp: 0, payload_prefix: vec![] };
        assert_eq!(calculate_priority(&stale_block, &context), Priority::Critical);
    }

    #[test]
    fn cache_returns_same_priority_within_ttl() {
        let mut cache = PriorityCache::new();
        let msg = PriorityMessage { kind: MessageKind::Discovery, timestamp: 1, payload_prefix: vec![1, 2, 3] };
        let first = cache.get_or_compute(&msg, &ctx());
        let second = cache.get_or_compute(&msg, &ctx());
        assert_eq!(first, second);
    }

    #[test]
    fn queue_dequeues_in_priority_order() {
        let mut queue = PriorityQueue::new(PriorityQueueConfig::default());
        queue.enqueue("low", Priority::Low, false).unwrap();
        queue.enqueue("critical", Priority::Critical, false).unwrap();
        queue.enqueue("normal", Priority::Normal, false).unwrap();
        assert_eq!(queue.dequeue(), Some("critical"));
        assert_eq!(queue.dequeue(), Some("normal"));
        assert_eq!(queue.dequeue(), Some("low"));
    }

    #[test]
    fn full_priority_level_rejects_unless_emergency() {
        let mut queue: PriorityQueue<u32> = PriorityQueue::new(PriorityQueueConfig { capacity_per_priority: 1, emergency_reserve: 1, ttl: Duration::from_secs(60) });
        queue.enqueue(1, Priority::Normal, false).unwrap();
        assert!(queue.enqueue(2, Priority::Normal, false).is_err());
        assert!(queue.enqueue(3, Priority::Normal, true).is_ok());
    }

    #[test]
    fn ttl_sweep_expires_old_entries() {
        let mut queue: PriorityQueue<u32> = PriorityQueue::new(PriorityQueueConfig { ttl: Duration::from_millis(0), ..PriorityQueueConfig::default() });
        queue.enqueue(1, Priority::Normal, false).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        queue.sweep_expired();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.expired_messages(), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_a_store() {
        let store = persistence::MemoryStore::new();
        let mut queue: PriorityQueue<String> = PriorityQueue::new(PriorityQueueConfig::default());
        queue.enqueue("critical".to_string(), Priority::Critical, false).unwrap();
        queue.enqueue("low".to_string(), Priority::Low, true).unwrap();
        queue.snapshot(&store, Sublevel::Metadata, "priority_queue").await.unwrap();

        let mut restored: PriorityQueue<String> = PriorityQueue::restore(&store, Sublevel::Metadata, "priority_queue", PriorityQueueConfig::default()).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dequeue(), Some("critical".to_string()));
        assert_eq!(restored.dequeue(), Some("low".to_string()));
    }

    #[tokio::test]
    async fn restore_from_missing_key_yields_empty_queue() {
        let store = persistence::MemoryStore::new();
        let restored: PriorityQueue<String> = PriorityQueue::restore(&store, Sublevel::Metadata, "absent", PriorityQueueConfig::default()).await.unwrap();
        assert!(restored.is_empty());
    }
}
