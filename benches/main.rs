use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use g1gc::memory_manager;
use g1gc::util::VMMutatorThread;
use g1gc::vm::{Collection, RootSlot, Scanning, TypeDescriptor};
use g1gc::{G1Builder, GcCause};
use std::sync::Mutex;

const NODE: TypeDescriptor = TypeDescriptor::new("Node", 2, 2);

#[derive(Default)]
struct BenchVM {
    roots: Mutex<Vec<RootSlot>>,
}

impl Scanning for BenchVM {
    fn stack_roots(&self, _tls: VMMutatorThread) -> Vec<RootSlot> {
        self.roots.lock().unwrap().clone()
    }

    fn global_roots(&self) -> Vec<RootSlot> {
        vec![]
    }
}

impl Collection for BenchVM {}

fn builder() -> G1Builder {
    let mut builder = G1Builder::new_no_env();
    builder.options.heap_size = 64 << 20;
    builder.options.region_size = 1 << 20;
    builder.options.concurrent_threads = 0;
    builder
}

pub fn bench_alloc(c: &mut Criterion) {
    let g1 = memory_manager::g1_init(&builder(), BenchVM::default());
    let node = memory_manager::register_type(&g1, NODE);
    let mut mutator = memory_manager::bind_mutator(&g1, VMMutatorThread(1));

    c.bench_function("alloc", |b| {
        b.iter(|| memory_manager::alloc(&mut mutator, node).unwrap())
    });
}

pub fn bench_young_pause(c: &mut Criterion) {
    let g1 = memory_manager::g1_init(&builder(), BenchVM::default());
    let node = memory_manager::register_type(&g1, NODE);
    let mut mutator = memory_manager::bind_mutator(&g1, VMMutatorThread(1));

    c.bench_function("young_pause", |b| {
        b.iter(|| {
            // A rooted binary tree of 1023 nodes, plus as much garbage.
            let root = RootSlot::new(None);
            g1.binding().roots.lock().unwrap().push(root.clone());
            let mut level = vec![memory_manager::alloc(&mut mutator, node).unwrap()];
            root.store(level.first().copied());
            for _ in 0..9 {
                let mut next = vec![];
                for parent in level {
                    for field in 0..2 {
                        let child = memory_manager::alloc(&mut mutator, node).unwrap();
                        memory_manager::alloc(&mut mutator, node).unwrap();
                        mutator.write_ref(parent, field, Some(child));
                        next.push(child);
                    }
                }
                level = next;
            }
            mutator.collect(GcCause::AllocationFailure).unwrap();
            g1.binding().roots.lock().unwrap().clear();
        })
    });
}

criterion_group!(benches, bench_alloc, bench_young_pause);
criterion_main!(benches);
