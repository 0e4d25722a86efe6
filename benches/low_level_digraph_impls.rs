use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use treedecomp::{CanonicalGraph, VertexId};

fn vertex_size() -> usize {
    std::env::var("VERTEX_SIZE").unwrap_or_else(|_| "2000".to_string()).parse().unwrap()
}

fn edge_size() -> usize {
    std::env::var("EDGE_SIZE").unwrap_or_else(|_| "20000".to_string()).parse().unwrap()
}

criterion_group!(benches, build_random_graph, eliminate_all_vertices, neighbor_queries);
criterion_main!(benches);

fn random_graph(n: usize, m: usize) -> CanonicalGraph {
    let mut g = CanonicalGraph::new(n);
    let mut rng = rand::thread_rng();
    for _ in 0..m {
        let u = VertexId::new(rng.gen_range(0..n));
        let v = VertexId::new(rng.gen_range(0..n));
        if u != v {
            g.add_edge(u, v);
        }
    }
    g
}

fn build_random_graph(c: &mut Criterion) {
    let n = vertex_size();
    let m = edge_size();
    c.bench_function("kernel/add_edge", |b| b.iter(|| black_box(random_graph(n, m))));
}

fn eliminate_all_vertices(c: &mut Criterion) {
    let n = vertex_size().min(500);
    let m = edge_size().min(5000);
    let template = random_graph(n, m);
    c.bench_function("kernel/eliminate_vertex", |b| {
        b.iter(|| {
            let mut g = template.clone();
            for v in template.vertices().collect::<Vec<_>>() {
                if g.is_alive(v) {
                    g.eliminate_vertex(v);
                }
            }
            black_box(g.vertex_count())
        })
    });
}

fn neighbor_queries(c: &mut Criterion) {
    let n = vertex_size();
    let m = edge_size();
    let g = random_graph(n, m);
    let vertices: Vec<VertexId> = g.vertices().collect();
    c.bench_function("kernel/neighbor_iteration", |b| {
        b.iter(|| {
            let mut count = 0usize;
            for &v in &vertices {
                count += g.neighbors(v).count();
            }
            black_box(count)
        })
    });
}
