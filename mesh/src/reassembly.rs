//! Receiver-side fragment reassembly.

use crate::fragment::Fragment;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    FragmentAdded,
    DuplicateFragment,
    InvalidFragment(String),
    MessageComplete(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    pub session_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self { session_timeout: Duration::from_secs(30), max_sessions: 512 }
    }
}

struct Session {
    total_fragments: u16,
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
    created_at: Instant,
}

impl Session {
    fn new(total_fragments: u16) -> Self {
        Self { total_fragments, slots: vec![None; total_fragments as usize], received: 0, created_at: Instant::now() }
    }
}

/// Reassembles fragments into complete payloads, keyed by `message_id`.
///
/// A dropped partial session never resurrects: once evicted (timeout
/// or capacity pressure), a later fragment with the same `message_id`
/// starts a brand new session from scratch.
pub struct Reassembler {
    sessions: HashMap<[u8; 16], Session>,
    config: ReassemblyConfig,
}

impl Reassembler {
    #[must_use]
    pub fn new(config: ReassemblyConfig) -> Self {
        Self { sessions: HashMap::new(), config }
    }

    pub fn add_fragment(&mut self, fragment: Fragment) -> FragmentOutcome {
        if !fragment.checksum_matches() {
            return FragmentOutcome::InvalidFragment("checksum mismatch".to_string());
        }

        let message_id = fragment.header.message_id;
        let seq = fragment.header.sequence_number;

        if let Some(session) = self.sessions.get(&message_id) {
            if session.total_fragments != fragment.header.total_fragments {
                self.sessions.remove(&message_id);
                return FragmentOutcome::InvalidFragment("inconsistent total_fragments for message_id".to_string());
            }
        } else if !self.sessions.contains_key(&message_id) && self.sessions.len() >= self.config.max_sessions {
            return FragmentOutcome::InvalidFragment("reassembly capacity exceeded".to_string());
        }

        let session = self.sessions.entry(message_id).or_insert_with(|| Session::new(fragment.header.total_fragments));

        if seq as usize >= session.slots.len() {
            return FragmentOutcome::InvalidFragment("sequence_number out of range".to_string());
        }

        if session.slots[seq as usize].is_some() {
            return FragmentOutcome::DuplicateFragment;
        }

        session.slots[seq as usize] = Some(fragment.payload);
        session.received += 1;

        if session.received == session.slots.len() {
            let session = self.sessions.remove(&message_id).expect("just matched above");
            let payload = session.slots.into_iter().flatten().flatten().collect();
            FragmentOutcome::MessageComplete(payload)
        } else {
            FragmentOutcome::FragmentAdded
        }
    }

    /// Drops sessions that have been incomplete for longer than the
    /// configured timeout.
    pub fn sweep(&mut self) {
        let timeout = self.config.session_timeout;
        self.sessions.retain(|_, session| session.created_at.elapsed() <= timeout);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
