use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use treedecomp::config::SolverConfig;
use treedecomp::{pipeline, CanonicalGraph, VertexId};

fn graph_size() -> usize {
    std::env::var("VERTEX_SIZE").unwrap_or_else(|_| "60".to_string()).parse().unwrap()
}

criterion_group!(benches, heuristic_driver, exact_driver_small_graphs);
criterion_main!(benches);

fn random_sparse_graph(n: usize, avg_degree: usize) -> CanonicalGraph {
    let mut g = CanonicalGraph::new(n);
    let mut rng = rand::thread_rng();
    for _ in 0..(n * avg_degree / 2) {
        let u = VertexId::new(rng.gen_range(0..n));
        let v = VertexId::new(rng.gen_range(0..n));
        if u != v {
            g.add_edge(u, v);
        }
    }
    g
}

fn heuristic_driver(c: &mut Criterion) {
    let n = graph_size();
    let g = random_sparse_graph(n, 4);
    let config = SolverConfig::with_seed(1);
    c.bench_function("pipeline/solve_heuristic", |b| {
        b.iter(|| black_box(pipeline::solve_heuristic(&g, &config)))
    });
}

fn exact_driver_small_graphs(c: &mut Criterion) {
    let g = random_sparse_graph(16, 3);
    let config = SolverConfig::with_seed(2);
    c.bench_function("pipeline/solve_exact_small", |b| {
        b.iter(|| black_box(pipeline::solve_exact(&g, &config)))
    });
}
