// src/workflow/entity_name.rs
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Time-derived entity name, `<prefix>-<unix nanos>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityName(String);

impl EntityName {
    pub fn queue() -> Self {
        Self::with_prefix("queue")
    }

    pub fn topic() -> Self {
        Self::with_prefix("topic")
    }

    /// Suffixes are strictly increasing within the process, even when the
    /// clock returns the same reading twice.
    pub fn with_prefix(prefix: &str) -> Self {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or_default();

        Self(format!("{}-{}", prefix, next_suffix(now)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn next_suffix(now: u64) -> u64 {
    let mut last = LAST_SUFFIX.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SUFFIX.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn suffix(name: &EntityName) -> u64 {
        name.as_str().rsplit('-').next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_format() {
        let name = EntityName::queue();
        assert!(name.as_str().starts_with("queue-"));
        assert!(suffix(&name) > 0);
    }

    #[test]
    fn test_rapid_generation_is_unique_and_increasing() {
        let names: Vec<EntityName> = (0..10_000).map(|_| EntityName::queue()).collect();

        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());

        for pair in names.windows(2) {
            assert!(suffix(&pair[1]) > suffix(&pair[0]));
        }
    }

    #[test]
    fn test_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1_000).map(|_| EntityName::queue()).collect::<Vec<_>>()))
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(all.insert(name));
            }
        }
        assert_eq!(all.len(), 4_000);
    }

    #[test]
    fn test_prefixes_share_one_sequence() {
        let topic = EntityName::topic();
        let sub = EntityName::with_prefix("sub-1");

        assert!(topic.as_str().starts_with("topic-"));
        assert!(sub.as_str().starts_with("sub-1-"));
        assert!(suffix(&sub) > suffix(&topic));
    }

    #[test]
    fn test_stalled_clock_still_advances() {
        let first = next_suffix(1);
        let second = next_suffix(1);
        assert!(second > first);
    }
}
