use super::mock_test_prelude::*;
use crate::plan::Mutator;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

const ROOTS: usize = 64;
const STEPS: usize = 20_000;
const CYCLE_EVERY: usize = 4_000;

/// The graph the mutator believes it built: node ids, their two outgoing edges, and which
/// node each root slot holds.
#[derive(Default)]
struct ShadowHeap {
    edges: HashMap<usize, [Option<usize>; 2]>,
    roots: Vec<Option<usize>>,
}

fn node_id(mutator: &Mutator<MockVM>, object: ObjectReference) -> usize {
    mutator.read_word(object, 0)
}

/// Walk the real heap from every root and compare it with the shadow graph.
fn check(mutator: &Mutator<MockVM>, slots: &[RootSlot], shadow: &ShadowHeap) -> usize {
    let mut seen: HashMap<usize, ObjectReference> = HashMap::new();
    let mut stack = vec![];
    for (slot, expected) in slots.iter().zip(shadow.roots.iter()) {
        let object = slot.load();
        assert_eq!(object.map(|o| node_id(mutator, o)), *expected);
        stack.extend(object);
    }
    while let Some(object) = stack.pop() {
        let id = node_id(mutator, object);
        if let Some(previous) = seen.insert(id, object) {
            assert_eq!(previous, object, "node {} has two copies", id);
            continue;
        }
        for (field, expected) in shadow.edges[&id].iter().enumerate() {
            let target = mutator.read_ref(object, field);
            assert_eq!(target.map(|t| node_id(mutator, t)), *expected);
            stack.extend(target);
        }
    }
    seen.len()
}

/// Random allocation and pointer mutation over many young, mixed and concurrent cycles. The
/// heap is verified after every pause and compared with the shadow graph along the way.
#[test]
pub fn random_mutation_matches_shadow_graph() {
    let fixture = MutatorFixture::create_with_builder(|builder| {
        builder.options.heap_size = 128 * REGION_SIZE;
        builder.options.tenuring_threshold = 1;
        builder.options.initiating_heap_occupancy_percent = 10.0;
    });
    let node = fixture.g1.node;
    let tls = fixture.tls;
    let slots: Vec<RootSlot> = (0..ROOTS)
        .map(|_| fixture.vm().push_root(tls, None))
        .collect();
    let mut shadow = ShadowHeap {
        roots: vec![None; ROOTS],
        ..Default::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(0x6167);
    let mut next_id = 1;
    let mut guard = fixture.mutator();
    let mutator: &mut Mutator<MockVM> = &mut guard;

    for step in 0..STEPS {
        let r = rng.random_range(0..ROOTS);
        match rng.random_range(0..10) {
            // Allocate a node into a root.
            0..=3 => {
                let object = memory_manager::alloc(mutator, node).unwrap();
                mutator.write_word(object, 0, next_id);
                slots[r].store(Some(object));
                shadow.edges.insert(next_id, [None, None]);
                shadow.roots[r] = Some(next_id);
                next_id += 1;
            }
            // Link two rooted nodes.
            4..=6 => {
                let to = rng.random_range(0..ROOTS);
                let field = rng.random_range(0..2);
                if let Some(from) = slots[r].load() {
                    let target = slots[to].load();
                    mutator.write_ref(from, field, target);
                    let id = node_id(mutator, from);
                    shadow.edges.get_mut(&id).unwrap()[field] = shadow.roots[to];
                }
            }
            // Follow an edge.
            7 => {
                let field = rng.random_range(0..2);
                if let Some(from) = slots[r].load() {
                    slots[r].store(mutator.read_ref(from, field));
                    let id = node_id(mutator, from);
                    shadow.roots[r] = shadow.edges[&id][field];
                }
            }
            // Drop a root.
            8 => {
                slots[r].store(None);
                shadow.roots[r] = None;
            }
            _ => memory_manager::poll(mutator),
        }

        if step % CYCLE_EVERY == CYCLE_EVERY / 2 && !fixture.g1().marker().is_active() {
            memory_manager::start_concurrent_cycle(mutator).unwrap();
        }
        if step % 1000 == 999 {
            check(mutator, &slots, &shadow);
        }
    }

    let reachable = check(mutator, &slots, &shadow);
    assert!(reachable > 0);
    let stats = memory_manager::heap_statistics(fixture.g1());
    assert!(stats.young_count > 0, "{:?}", stats);
    assert!(stats.concurrent_cycles > 0, "{:?}", stats);
    assert_eq!(stats.concurrent_mode_failures, 0);
    fixture.g1().space().check_invariants();
}
