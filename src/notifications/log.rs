use std::collections::VecDeque;

use uuid::Uuid;

use super::event::NotificationEvent;

/// Delivered notifications, newest first.
///
/// Insertion order is the only ordering guarantee; duplicate ids are kept.
#[derive(Debug, Default, Clone)]
pub struct NotificationLog {
    entries: VecDeque<NotificationEvent>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: NotificationEvent) {
        self.entries.push_front(event);
    }

    /// Flip the read flag of the first entry with this id. Returns whether an
    /// entry changed; unknown ids and already-read entries are no-ops.
    pub fn mark_read(&mut self, id: Uuid) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut().filter(|entry| !entry.read) {
            entry.read = true;
            changed += 1;
        }
        changed
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.read).count()
    }

    pub fn get(&self, id: Uuid) -> Option<&NotificationEvent> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
