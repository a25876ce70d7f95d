// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new job ID candidate; the queue regenerates on collision
    fn generate_id(&self) -> String;
}

/// Short ids: first 8 hex characters of a UUID v4 (production)
pub struct ShortUuidProvider;

impl IdProvider for ShortUuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// `job-0001`, `job-0002`, ...
    #[derive(Default)]
    pub struct SequentialIdProvider {
        next: AtomicUsize,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            format!("job-{:04}", n)
        }
    }

    /// Replays a fixed list, then falls back to sequential ids
    pub struct ScriptedIdProvider {
        ids: Mutex<VecDeque<String>>,
        fallback: SequentialIdProvider,
    }

    impl ScriptedIdProvider {
        pub fn new(ids: &[&str]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                fallback: SequentialIdProvider::new(),
            }
        }
    }

    impl IdProvider for ScriptedIdProvider {
        fn generate_id(&self) -> String {
            match self.ids.lock().unwrap().pop_front() {
                Some(id) => id,
                None => self.fallback.generate_id(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_ids_are_8_hex_chars() {
        let id = ShortUuidProvider.generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
