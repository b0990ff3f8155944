//! Type-local relationship iteration racing with writers
//!
//! Tests:
//! - A writer publishing new types between two reader steps is handled
//! - Readers of outgoing relationships only ever yield ids of the requested
//!   type and direction under contention
//! - A cache loaded from the store agrees with the relationship records

use nexus_consistency::record::{GroupDirection, TokenKind};
use nexus_consistency::scan::{RelationshipCache, SchedulingPoint};
use nexus_consistency::store::{MemoryStore, StoreAccess};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const OUT: GroupDirection = GroupDirection::Outgoing;

/// Parks the reader after its first load until the writer has published
struct ParkOnce {
    loaded: Barrier,
    published: Barrier,
    observed: Mutex<Vec<usize>>,
}

impl SchedulingPoint for ParkOnce {
    fn observed(&self, buckets: usize) {
        let first = {
            let mut observed = self.observed.lock();
            observed.push(buckets);
            observed.len() == 1
        };
        if first {
            self.loaded.wait();
            self.published.wait();
        }
    }
}

#[test]
fn test_writer_between_reader_steps() {
    let cache = RelationshipCache::new(0);
    cache.add(1, OUT, 10);
    cache.add(1, OUT, 11);

    let hook = Arc::new(ParkOnce {
        loaded: Barrier::new(2),
        published: Barrier::new(2),
        observed: Mutex::new(Vec::new()),
    });

    let seen: Vec<u64> = thread::scope(|s| {
        let reader = s.spawn(|| {
            cache
                .relationships(1, OUT)
                .with_scheduling_point(hook.clone())
                .collect::<Vec<_>>()
        });

        hook.loaded.wait();
        cache.add(2, OUT, 20);
        cache.add(1, OUT, 12);
        cache.add(3, GroupDirection::Incoming, 30);
        hook.published.wait();

        reader.join().unwrap()
    });

    assert_eq!(seen, vec![10, 11, 12]);
    let observed = hook.observed.lock().clone();
    assert_eq!(observed[0], 1);
    assert!(observed[1..].iter().all(|len| *len == 3));
    assert_eq!(cache.types(), vec![1, 2, 3]);
}

#[test]
fn test_readers_only_see_their_type() {
    const TYPES: u64 = 8;
    let cache = RelationshipCache::new(0);
    let stop = AtomicBool::new(false);
    let yielded = AtomicU64::new(0);
    let deadline = Instant::now() + Duration::from_millis(500);

    thread::scope(|s| {
        s.spawn(|| {
            let mut next = 0u64;
            while Instant::now() < deadline {
                // id encodes its type and direction
                let rel_type = next % TYPES;
                let incoming = (next / TYPES) % 2;
                let direction = if incoming == 1 {
                    GroupDirection::Incoming
                } else {
                    OUT
                };
                cache.add(
                    rel_type as u32,
                    direction,
                    (next * 2 + incoming) * TYPES + rel_type,
                );
                next += 1;
            }
            stop.store(true, Ordering::Release);
        });

        for rel_type in 0..TYPES {
            let cache = &cache;
            let stop = &stop;
            let yielded = &yielded;
            s.spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let mut previous = None;
                    for id in cache.relationships(rel_type as u32, OUT) {
                        assert_eq!(id % TYPES, rel_type, "type {rel_type} yielded {id}");
                        assert_eq!((id / TYPES) % 2, 0, "incoming {id} read as outgoing");
                        assert!(previous < Some(id), "ids of one type grow");
                        previous = Some(id);
                        yielded.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    assert!(yielded.load(Ordering::Relaxed) > 0);
    let total: usize = cache.snapshot().iter().map(|b| b.relationships.len()).sum();
    assert_eq!(total, cache.len());
}

#[test]
fn test_loaded_cache_matches_records() {
    let store = MemoryStore::with_dense_threshold(4);
    let types: Vec<u32> = ["A", "B", "C"]
        .iter()
        .map(|name| store.create_token(TokenKind::RelationshipType, name).unwrap())
        .collect();
    let hub = store.create_node(&[]).unwrap();
    let others: Vec<u64> = (0..5).map(|_| store.create_node(&[]).unwrap()).collect();
    for (i, other) in others.iter().cycle().take(15).enumerate() {
        let rel_type = types[i % types.len()];
        if i % 2 == 0 {
            store.create_relationship(hub, *other, rel_type).unwrap();
        } else {
            store.create_relationship(*other, hub, rel_type).unwrap();
        }
    }

    let cache = RelationshipCache::load(&store, hub).unwrap();
    assert_eq!(cache.node(), hub);
    assert_eq!(cache.len(), 15);
    for rel_type in types {
        let ids: Vec<u64> = cache.relationships_of_type(rel_type).collect();
        assert_eq!(ids.len(), 5);
        for id in ids {
            let rel = store.relationship(id).unwrap();
            assert_eq!(rel.rel_type, rel_type);
            assert!(rel.touches(hub));
        }
        for id in cache.relationships(rel_type, OUT) {
            assert_eq!(store.relationship(id).unwrap().source, hub);
        }
        for id in cache.relationships(rel_type, GroupDirection::Incoming) {
            assert_eq!(store.relationship(id).unwrap().target, hub);
        }
    }
}
