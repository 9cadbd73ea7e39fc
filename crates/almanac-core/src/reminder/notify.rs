//! Notification consumers.
//!
//! The coordinator hands each cycle's due reminders to a
//! [`NotificationSink`] as one batch. Rendering is the sink's business.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::rule::DueReminder;

/// Receives one batch of due reminders per cycle.
pub trait NotificationSink {
    fn deliver(&mut self, batch: &[DueReminder]);
}

impl<N: NotificationSink + ?Sized> NotificationSink for Box<N> {
    fn deliver(&mut self, batch: &[DueReminder]) {
        (**self).deliver(batch)
    }
}

/// Sink that keeps every batch it receives. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<DueReminder>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<DueReminder>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn delivered(&self) -> Vec<DueReminder> {
        self.batches().into_iter().flatten().collect()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&mut self, batch: &[DueReminder]) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch.to_vec());
        }
    }
}

/// Drops reminders already delivered for the same effective date.
///
/// Recurring rules stay due for every poll inside their tolerance window;
/// this wrapper lets a consumer show each occurrence once. Memory of past
/// dates is discarded as soon as a batch for a later date arrives.
pub struct DedupSink<N> {
    inner: N,
    seen: HashSet<(i64, NaiveDate)>,
}

impl<N: NotificationSink> DedupSink<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> N {
        self.inner
    }
}

impl<N: NotificationSink> NotificationSink for DedupSink<N> {
    fn deliver(&mut self, batch: &[DueReminder]) {
        if let Some(latest) = batch.iter().map(|d| d.effective_date).max() {
            self.seen.retain(|(_, date)| *date >= latest);
        }

        let fresh: Vec<DueReminder> = batch
            .iter()
            .filter(|d| self.seen.insert((d.id, d.effective_date)))
            .cloned()
            .collect();

        if !fresh.is_empty() {
            self.inner.deliver(&fresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::RepeatKind;
    use chrono::NaiveTime;

    fn due(id: i64, day: u32) -> DueReminder {
        DueReminder {
            id,
            time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            message: format!("reminder {id}"),
            effective_date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            repeat_kind: RepeatKind::Daily,
        }
    }

    #[test]
    fn dedup_passes_each_occurrence_once() {
        let memory = MemorySink::new();
        let mut sink = DedupSink::new(memory.clone());

        sink.deliver(&[due(1, 1)]);
        sink.deliver(&[due(1, 1), due(2, 1)]);
        sink.deliver(&[due(1, 1), due(2, 1)]);
        sink.deliver(&[due(1, 2)]);

        let ids: Vec<_> = memory.delivered().iter().map(|d| (d.id, d.effective_date.format("%d").to_string())).collect();
        assert_eq!(
            ids,
            vec![(1, "01".to_string()), (2, "01".to_string()), (1, "02".to_string())]
        );
        assert_eq!(memory.batches().len(), 3);
    }
}
