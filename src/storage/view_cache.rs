//! The process-wide cache of loaded file views.
//!
//! Keys are upper-cased absolute paths. Each path owns a lock slot so
//! concurrent misses on one path coalesce into a single load while other
//! paths proceed independently. `Get` hands out copies; the cached view
//! is only replaced wholesale by DML write-back.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::executor::view::View;

type Slot = Arc<Mutex<Option<View>>>;

struct ViewCache {
    slots: Mutex<FxHashMap<String, Slot>>,
}

static CACHE: OnceLock<ViewCache> = OnceLock::new();

fn cache() -> &'static ViewCache {
    CACHE.get_or_init(|| ViewCache {
        slots: Mutex::new(FxHashMap::default()),
    })
}

pub fn cache_key(path: &str) -> String {
    path.to_uppercase()
}

fn slot_for(key: &str) -> Slot {
    let mut slots = cache().slots.lock();
    slots.entry(key.to_string()).or_default().clone()
}

/// Fetch a copy of the cached view, loading and inserting it on a miss.
/// The per-path lock is held across the load, never the whole-cache lock.
pub fn get_or_load(key: &str, load: impl FnOnce() -> Result<View>) -> Result<View> {
    let slot = slot_for(key);
    let mut guard = slot.lock();
    if let Some(view) = guard.as_ref() {
        tracing::debug!(key, "view cache hit");
        return Ok(view.clone());
    }
    tracing::debug!(key, "view cache miss");
    let view = load()?;
    *guard = Some(view.clone());
    Ok(view)
}

/// DML write-back: swap the cached view for an updated one.
pub fn replace(key: &str, view: View) {
    let slot = slot_for(key);
    *slot.lock() = Some(view);
}

pub fn contains(key: &str) -> bool {
    let slots = cache().slots.lock();
    slots
        .get(key)
        .map(|slot| slot.lock().is_some())
        .unwrap_or(false)
}

/// Drop every cached view. Rollback goes through here so later loads
/// re-read the persisted state; tests use it for isolation.
pub fn clean() {
    let mut slots = cache().slots.lock();
    slots.clear();
}

/// Explicit initialisation hook for the driver; the cache starts empty.
pub fn initialize() {
    clean();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::view::{new_record, Header};
    use crate::storage::value::Value;

    fn sample(name: &str) -> View {
        View::new(
            Header::new(name, &["c1"]),
            vec![new_record(vec![Value::Integer(1)])],
        )
    }

    #[test]
    fn concurrent_misses_on_one_path_load_once() {
        let key = cache_key("/concurrency/probe.csv");
        let loads = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let view = get_or_load(&key, || {
                        loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Ok(sample("probe"))
                    })
                    .unwrap();
                    assert_eq!(view.record_len(), 1);
                });
            }
        });
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn get_returns_copies() {
        let key = cache_key("/copies/probe.csv");
        let mut first = get_or_load(&key, || Ok(sample("probe"))).unwrap();
        first.record_set.clear();
        let second = get_or_load(&key, || unreachable!("cached")).unwrap();
        assert_eq!(second.record_len(), 1);
    }
}
