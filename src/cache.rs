//! Sensor state cache
//!
//! One record per sensor id, last received wins. Updates are not applied
//! to consumers immediately: the cache tracks which sensors changed since
//! the last visual pass in a FIFO dirty list (no duplicates), and the
//! pipeline drains that list in bounded batches.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{SensorRecord, SensorStatus, Severity};

/// Severity used to present a sensor
///
/// Status dominates quality: an explicit warning or critical status keeps
/// its color even when the quality figure looks healthy.
pub fn classify(record: &SensorRecord) -> Severity {
    match record.status {
        SensorStatus::Offline => Severity::Gray,
        SensorStatus::Critical => Severity::Red,
        SensorStatus::Warning => Severity::Yellow,
        SensorStatus::Online => {
            if record.quality >= 90.0 {
                Severity::Green
            } else if record.quality >= 70.0 {
                Severity::Yellow
            } else {
                Severity::Red
            }
        }
    }
}

#[derive(Default)]
pub struct SensorCache {
    records: HashMap<String, SensorRecord>,
    dirty: VecDeque<String>,
    dirty_set: HashSet<String>,
    next_revision: u64,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, replacing any previous state for the sensor
    ///
    /// The record is stamped with a monotonically increasing revision so
    /// arrival order stays observable after overwrites.
    pub fn upsert(&mut self, mut record: SensorRecord) {
        self.next_revision += 1;
        record.revision = self.next_revision;
        if self.dirty_set.insert(record.sensor_id.clone()) {
            self.dirty.push_back(record.sensor_id.clone());
        }
        self.records.insert(record.sensor_id.clone(), record);
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorRecord> {
        self.records.get(sensor_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorRecord> {
        self.records.values()
    }

    /// Sensors changed since the last visual pass
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Remove and return up to `max` dirty records, oldest-marked first
    ///
    /// Each returned record is the sensor's latest state, not the state it
    /// had when it was first marked dirty. Sensors beyond `max` stay
    /// marked for the next pass.
    pub fn take_dirty(&mut self, max: usize) -> Vec<SensorRecord> {
        let count = max.min(self.dirty.len());
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let sensor_id = self.dirty.pop_front().expect("dirty list length checked");
            self.dirty_set.remove(&sensor_id);
            if let Some(record) = self.records.get(&sensor_id) {
                batch.push(record.clone());
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, value: f64) -> SensorRecord {
        SensorRecord {
            sensor_id: id.to_string(),
            value,
            unit: "pH".to_string(),
            status: SensorStatus::Online,
            quality: 100.0,
            position: [0.0; 3],
            last_update: Utc::now(),
            revision: 0,
        }
    }

    fn with_status(id: &str, status: SensorStatus, quality: f64) -> SensorRecord {
        SensorRecord {
            status,
            quality,
            ..record(id, 1.0)
        }
    }

    #[test]
    fn test_last_received_wins() {
        let mut cache = SensorCache::new();
        cache.upsert(record("ph-01", 7.2));
        cache.upsert(record("ph-01", 7.9));

        assert_eq!(cache.len(), 1);
        let current = cache.get("ph-01").unwrap();
        assert_eq!(current.value, 7.9);
        assert_eq!(current.revision, 2);
    }

    #[test]
    fn test_dirty_list_has_no_duplicates() {
        let mut cache = SensorCache::new();
        cache.upsert(record("a", 1.0));
        cache.upsert(record("b", 2.0));
        cache.upsert(record("a", 3.0));

        assert_eq!(cache.dirty_len(), 2);
        let batch = cache.take_dirty(10);
        let ids: Vec<&str> = batch.iter().map(|r| r.sensor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        // "a" carries its latest value, not the one it was marked with
        assert_eq!(batch[0].value, 3.0);
    }

    #[test]
    fn test_take_dirty_respects_batch_limit() {
        let mut cache = SensorCache::new();
        for n in 0..120 {
            cache.upsert(record(&format!("s-{n:03}"), n as f64));
        }

        let first = cache.take_dirty(50);
        assert_eq!(first.len(), 50);
        assert_eq!(first[0].sensor_id, "s-000");
        assert_eq!(cache.dirty_len(), 70);

        let second = cache.take_dirty(50);
        assert_eq!(second[0].sensor_id, "s-050");
        let third = cache.take_dirty(50);
        assert_eq!(third.len(), 20);
        assert_eq!(cache.dirty_len(), 0);

        // no id appears twice across the batches
        let mut all: Vec<String> = first
            .into_iter()
            .chain(second)
            .chain(third)
            .map(|r| r.sensor_id)
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 120);
    }

    #[test]
    fn test_classify_status_dominates_quality() {
        assert_eq!(
            classify(&with_status("x", SensorStatus::Offline, 100.0)),
            Severity::Gray
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Critical, 100.0)),
            Severity::Red
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Warning, 100.0)),
            Severity::Yellow
        );
    }

    #[test]
    fn test_classify_online_by_quality() {
        assert_eq!(
            classify(&with_status("x", SensorStatus::Online, 95.0)),
            Severity::Green
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Online, 90.0)),
            Severity::Green
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Online, 89.9)),
            Severity::Yellow
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Online, 70.0)),
            Severity::Yellow
        );
        assert_eq!(
            classify(&with_status("x", SensorStatus::Online, 69.9)),
            Severity::Red
        );
    }
}
