use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::data::weather::EnsembleReport;

/// (city, start of the time bucket as unix seconds)
pub type EnsembleKey = (String, i64);

/// Recent ensembles keyed by city and time bucket.
///
/// Concurrent writers to the same key are last-write-wins. Entries older
/// than the TTL are evicted on read.
pub struct EnsembleCache {
    cache: DashMap<EnsembleKey, CachedEnsemble>,
    bucket: Duration,
    ttl: Duration,
}

struct CachedEnsemble {
    report: EnsembleReport,
    inserted: Instant,
}

impl EnsembleCache {
    pub fn new(bucket: Duration, ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            bucket,
            ttl,
        }
    }

    pub fn key(&self, city: &str, at: DateTime<Utc>) -> EnsembleKey {
        let width = self.bucket.as_secs().max(1) as i64;
        let ts = at.timestamp();
        (city.to_lowercase(), ts - ts.rem_euclid(width))
    }

    /// Insert and sweep out expired entries, including stale buckets that
    /// will never be read again.
    pub fn insert(&self, city: &str, at: DateTime<Utc>, report: EnsembleReport) {
        let ttl = self.ttl;
        self.cache.retain(|_, entry| entry.inserted.elapsed() <= ttl);

        let key = self.key(city, at);
        self.cache.insert(
            key,
            CachedEnsemble {
                report,
                inserted: Instant::now(),
            },
        );
    }

    /// Get an ensemble if not expired (evict on read)
    pub fn get(&self, city: &str, at: DateTime<Utc>) -> Option<EnsembleReport> {
        let key = self.key(city, at);
        let entry = self.cache.get(&key)?;
        if entry.inserted.elapsed() > self.ttl {
            drop(entry); // release the shard read lock before removing
            self.cache.remove(&key);
            None
        } else {
            Some(entry.report.clone())
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for EnsembleCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::ForecastSample;
    use crate::estimator::ForecastEnsemble;
    use chrono::TimeZone;
    use std::thread;

    fn report(temps: &[f64]) -> EnsembleReport {
        EnsembleReport {
            ensemble: ForecastEnsemble::new(
                temps.iter().map(|t| ForecastSample::new("test", *t)).collect(),
            ),
            ..EnsembleReport::default()
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = EnsembleCache::default();
        let now = Utc::now();
        cache.insert("Chicago", now, report(&[75.0]));

        let cached = cache.get("chicago", now).unwrap();
        assert_eq!(cached.ensemble.values(), vec![75.0]);
    }

    #[test]
    fn test_same_bucket_shares_key() {
        let cache = EnsembleCache::new(Duration::from_secs(3600), Duration::from_secs(300));
        let a = Utc.with_ymd_and_hms(2026, 7, 2, 14, 5, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 7, 2, 14, 55, 0).unwrap();
        let c = Utc.with_ymd_and_hms(2026, 7, 2, 15, 0, 0).unwrap();

        assert_eq!(cache.key("Miami", a), cache.key("Miami", b));
        assert_ne!(cache.key("Miami", a), cache.key("Miami", c));
        assert_ne!(cache.key("Miami", a), cache.key("Austin", a));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = EnsembleCache::default();
        let now = Utc::now();
        cache.insert("Denver", now, report(&[70.0]));
        cache.insert("Denver", now, report(&[72.0, 74.0]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("Denver", now).unwrap().ensemble.values(), vec![72.0, 74.0]);
    }

    #[test]
    fn test_cache_ttl_expiration() {
        let cache = EnsembleCache::new(Duration::from_secs(3600), Duration::from_millis(200));
        let now = Utc::now();
        cache.insert("Austin", now, report(&[90.0]));
        assert!(cache.get("Austin", now).is_some());

        thread::sleep(Duration::from_millis(300));

        assert!(cache.get("Austin", now).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_sweeps_past_buckets() {
        let cache = EnsembleCache::new(Duration::from_secs(3600), Duration::from_millis(200));
        let earlier = Utc.with_ymd_and_hms(2026, 7, 2, 13, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 7, 2, 14, 0, 0).unwrap();
        cache.insert("Chicago", earlier, report(&[75.0]));
        cache.insert("Denver", earlier, report(&[80.0]));
        assert_eq!(cache.len(), 2);

        thread::sleep(Duration::from_millis(300));

        // the 13:00 keys are never read again; the next insert drops them
        cache.insert("Chicago", later, report(&[76.0]));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("Chicago", later).is_some());
    }
}
