/// Benchmarks for the node save format.
///
/// Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tracevis::domain::codec::{decode_node, encode_node, write_end_marker, FieldReader};
use tracevis::domain::coords::VCoord;
use tracevis::domain::disassembly::{InstructionData, MemoryDisassembly};
use tracevis::domain::graph::NodeArena;
use tracevis::domain::node::InternalBlock;

// ═══════════════════════════════════════════════════════════════════════════
// Synthetic Data Generators
// ═══════════════════════════════════════════════════════════════════════════

/// A chain of internal blocks with an external call every `extern_every` nodes.
fn create_synthetic_graph(num_nodes: u32, extern_every: u32) -> (MemoryDisassembly, NodeArena) {
    let cache = MemoryDisassembly::new();
    let mut arena = NodeArena::new();

    for i in 0..num_nodes {
        let vcoord = VCoord::new(i as i32 % 360, (i / 360) as i32, 0);
        let index = if i % extern_every == extern_every - 1 {
            let idx = arena.push_external(vcoord, 0x7700_0000 + i as u64);
            let node = arena.get_mut(idx).unwrap();
            node.push_call(vec![(0, format!("C:\\data\\file_{},v}}.bin", i).into_bytes())]);
            node.push_call(vec![(0, vec![0u8; 32]), (1, b"rb".to_vec())]);
            idx
        } else {
            let ins = cache.record(InstructionData::new(0x40_0000 + i as u64 * 8, "mov", "eax, [ebp-4]", 3));
            arena.push_internal(vcoord, InternalBlock::from_instruction(ins))
        };
        if index > 0 {
            arena.add_edge(index - 1, index).unwrap();
        }
        if index > 10 {
            arena.add_edge(index, index - 10).unwrap();
        }
    }

    (cache, arena)
}

fn encode_all(arena: &NodeArena) -> Vec<u8> {
    let mut out = Vec::new();
    for node in arena.iter() {
        encode_node(&mut out, node).unwrap();
    }
    write_end_marker(&mut out).unwrap();
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// Codec Benchmarks
// ═══════════════════════════════════════════════════════════════════════════

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");

    for num_nodes in [100u32, 1_000, 10_000].iter() {
        let (_cache, arena) = create_synthetic_graph(*num_nodes, 8);
        group.throughput(Throughput::Elements(*num_nodes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_nodes), &arena, |b, arena| {
            b.iter(|| black_box(encode_all(arena)));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");

    for num_nodes in [100u32, 1_000, 10_000].iter() {
        let (cache, arena) = create_synthetic_graph(*num_nodes, 8);
        let bytes = encode_all(&arena);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_nodes), &bytes, |b, bytes| {
            b.iter(|| {
                let mut reader = FieldReader::new(&bytes[..]);
                let mut count = 0usize;
                while let Some(node) = decode_node(&mut reader, &cache).unwrap() {
                    black_box(&node);
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
