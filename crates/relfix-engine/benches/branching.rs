use criterion::{black_box, criterion_group, criterion_main, Criterion};

use relfix_engine::search::branching::{combinations, BranchMode};
use relfix_ir::witness::{Classification, Witness};

fn fanout(index: u32, variants: usize) -> Witness {
    let alternates: Vec<Witness> = (0..variants)
        .map(|variant| {
            Witness::new(
                Classification::UntrustedNegative,
                format!("pred cex_{index} {{\n  branch = B{variant}\n}}"),
                format!("run cex_{index} expect 0"),
            )
            .unwrap()
        })
        .collect();
    Witness::with_alternates(alternates).unwrap()
}

fn bench_combinations_narrow(c: &mut Criterion) {
    let witnesses: Vec<Witness> = (0..10).map(|index| fanout(index, 2)).collect();
    c.bench_function("combinations_10x2", |b| {
        b.iter(|| combinations(black_box(&witnesses), BranchMode::Alternate))
    });
}

fn bench_combinations_wide(c: &mut Criterion) {
    let witnesses: Vec<Witness> = (0..6).map(|index| fanout(index, 4)).collect();
    c.bench_function("combinations_6x4", |b| {
        b.iter(|| combinations(black_box(&witnesses), BranchMode::Alternate))
    });
}

fn bench_witness_identity(c: &mut Criterion) {
    let predicate = "pred cex_7 {\n  some n : Node | n.left != n.right and n.depth = 3\n}";
    c.bench_function("witness_identity", |b| {
        b.iter(|| {
            Witness::new(
                Classification::Counterexample,
                black_box(predicate),
                "run cex_7 expect 0",
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_combinations_narrow,
    bench_combinations_wide,
    bench_witness_identity
);
criterion_main!(benches);
