//! Benchmarks for the stratified Datalog evaluator and the kernel's
//! assert/query path built on top of it.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kernel_core::atom::Atom;
use kernel_core::config::KernelConfig;
use kernel_core::datalog::{evaluate, Rule, RuleAtom, Term};
use kernel_core::fact::Fact;
use kernel_core::kernel::Kernel;
use std::collections::HashMap;
use std::sync::Arc;

fn new_kernel() -> Kernel {
    Kernel::new(Vec::new(), HashMap::new(), Arc::new(KernelConfig::default()))
}

fn var(name: &str) -> Term {
    Term::Variable(name.into())
}

fn generate_edge_facts(n: usize) -> Vec<Fact> {
    (0..n)
        .map(|i| Fact::new("edge", vec![Atom::Int(i as i64), Atom::Int((i + 1) as i64)]))
        .collect()
}

fn generate_complete_graph(n: usize) -> Vec<Fact> {
    let mut facts = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i != j {
                facts.push(Fact::new("edge", vec![Atom::Int(i as i64), Atom::Int(j as i64)]));
            }
        }
    }
    facts
}

fn generate_hierarchy(depth: usize, fanout: usize) -> Vec<Fact> {
    let mut facts = Vec::new();
    let mut next_id = 0i64;

    fn add_level(facts: &mut Vec<Fact>, parent_id: i64, depth: usize, fanout: usize, next_id: &mut i64) {
        if depth == 0 {
            return;
        }
        for _ in 0..fanout {
            *next_id += 1;
            let child_id = *next_id;
            facts.push(Fact::new("parent", vec![Atom::Int(parent_id), Atom::Int(child_id)]));
            add_level(facts, child_id, depth - 1, fanout, next_id);
        }
    }

    add_level(&mut facts, 0, depth, fanout, &mut next_id);
    facts
}

fn transitive_closure_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            RuleAtom::positive("path", vec![var("X"), var("Y")]),
            vec![RuleAtom::positive("edge", vec![var("X"), var("Y")])],
        ),
        Rule::new(
            RuleAtom::positive("path", vec![var("X"), var("Z")]),
            vec![
                RuleAtom::positive("edge", vec![var("X"), var("Y")]),
                RuleAtom::positive("path", vec![var("Y"), var("Z")]),
            ],
        ),
    ]
}

fn ancestor_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            RuleAtom::positive("ancestor", vec![var("X"), var("Y")]),
            vec![RuleAtom::positive("parent", vec![var("X"), var("Y")])],
        ),
        Rule::new(
            RuleAtom::positive("ancestor", vec![var("X"), var("Z")]),
            vec![
                RuleAtom::positive("parent", vec![var("X"), var("Y")]),
                RuleAtom::positive("ancestor", vec![var("Y"), var("Z")]),
            ],
        ),
    ]
}

const GAS: u64 = 10_000_000;

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("datalog/transitive_closure");
    for size in [10, 50, 100, 500].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let facts = generate_edge_facts(size);
            let rules = transitive_closure_rules();
            b.iter(|| black_box(evaluate(&rules, &facts, GAS).unwrap()));
        });
    }
    group.finish();
}

fn bench_complete_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("datalog/complete_graph");
    for size in [5, 10, 20, 30].iter() {
        group.throughput(Throughput::Elements((*size * (*size - 1)) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let facts = generate_complete_graph(size);
            let rules = transitive_closure_rules();
            b.iter(|| black_box(evaluate(&rules, &facts, GAS).unwrap()));
        });
    }
    group.finish();
}

fn bench_hierarchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("datalog/hierarchy");
    let configurations = vec![(3, 3, "narrow"), (2, 10, "wide"), (5, 2, "deep")];
    for (depth, fanout, name) in configurations {
        group.bench_with_input(BenchmarkId::new("ancestor", name), &(depth, fanout), |b, &(depth, fanout)| {
            let facts = generate_hierarchy(depth, fanout);
            let rules = ancestor_rules();
            b.iter(|| black_box(evaluate(&rules, &facts, GAS).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark the kernel's incremental assert-then-query path, where each
/// iteration adds a batch of new edges and re-evaluates.
fn bench_kernel_incremental_assert(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel/incremental_assert");
    for batch_size in [1usize, 10, 50, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let kernel = new_kernel();
            for fact in generate_edge_facts(100) {
                kernel.assert(fact).unwrap();
            }
            let mut next_id = 1000i64;
            b.iter(|| {
                for _ in 0..batch_size {
                    let fact = Fact::new("edge", vec![Atom::Int(next_id), Atom::Int(next_id + 1)]);
                    next_id += 1;
                    let _ = kernel.assert(fact);
                }
                black_box(kernel.query("edge").unwrap())
            });
        });
    }
    group.finish();
}

fn bench_fact_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("datalog/fact_insertion");
    for size in [100usize, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let facts = generate_edge_facts(size);
            b.iter(|| {
                let kernel = new_kernel();
                for fact in &facts {
                    let _ = kernel.assert(fact.clone());
                }
                black_box(())
            });
        });
    }
    group.finish();
}

fn bench_fact_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("datalog/fact_lookup");
    for size in [100usize, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let kernel = new_kernel();
            for fact in generate_edge_facts(size) {
                kernel.assert(fact).unwrap();
            }
            b.iter(|| black_box(kernel.query("edge").unwrap().len()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_transitive_closure,
    bench_complete_graph,
    bench_hierarchy,
    bench_kernel_incremental_assert,
    bench_fact_insertion,
    bench_fact_lookup
);
criterion_main!(benches);
