//! Pending-verification records of one chat.

use std::collections::HashMap;

use warden_common::{PendingVerification, UserId};

/// In-memory store, owned by a single chat actor
#[derive(Debug, Default)]
pub struct PendingStore {
    records: HashMap<UserId, PendingVerification>,
    next_challenge_id: u64,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next challenge id (never reused within the store)
    pub fn next_challenge_id(&mut self) -> u64 {
        self.next_challenge_id += 1;
        self.next_challenge_id
    }

    /// Insert `record` unless its subject already has one.
    ///
    /// Returns false and leaves the existing record untouched on conflict.
    pub fn insert(&mut self, record: PendingVerification) -> bool {
        match self.records.entry(record.subject) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn get(&self, subject: UserId) -> Option<&PendingVerification> {
        self.records.get(&subject)
    }

    pub fn get_mut(&mut self, subject: UserId) -> Option<&mut PendingVerification> {
        self.records.get_mut(&subject)
    }

    pub fn remove(&mut self, subject: UserId) -> Option<PendingVerification> {
        self.records.remove(&subject)
    }

    pub fn contains(&self, subject: UserId) -> bool {
        self.records.contains_key(&subject)
    }

    pub fn records(&self) -> impl Iterator<Item = &PendingVerification> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use warden_common::ChatId;

    fn record(subject: i64, challenge_id: u64) -> PendingVerification {
        let now = Utc::now();
        PendingVerification {
            subject: UserId(subject),
            origin_chat: ChatId(-1),
            display_name: format!("user{subject}"),
            challenge_id,
            expected_answer: 7,
            attempts: 0,
            issued_at: now,
            deadline: now + Duration::seconds(120),
            challenge_message: None,
        }
    }

    #[test]
    fn test_insert_is_exclusive_per_subject() {
        let mut store = PendingStore::new();
        assert!(store.insert(record(1, 1)));
        assert!(!store.insert(record(1, 2)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(UserId(1)).unwrap().challenge_id, 1);

        assert!(store.insert(record(2, 3)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_challenge_ids_increase() {
        let mut store = PendingStore::new();
        let first = store.next_challenge_id();
        let second = store.next_challenge_id();
        assert!(second > first);
    }

    #[test]
    fn test_remove_frees_subject() {
        let mut store = PendingStore::new();
        store.insert(record(1, 1));
        assert!(store.remove(UserId(1)).is_some());
        assert_eq!(store.len(), 0);
        assert!(store.remove(UserId(1)).is_none());
        assert!(store.insert(record(1, 2)));
    }
}
