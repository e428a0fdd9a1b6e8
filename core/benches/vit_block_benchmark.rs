use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vit_rs::models::vit::{ViTBlock, ViTBlockConfig};
use vit_rs::nn::Module;
use vit_rs::tensor::Tensor;

fn benchmark_vit_block(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut block = ViTBlock::<f32>::new(ViTBlockConfig::vit_base(), &mut rng).unwrap();
    block.eval();

    let mut group = c.benchmark_group("vit_block_forward");
    group.sample_size(10);

    // 197 tokens: 14x14 patches of a 224x224 image plus the class token.
    for seq_len in [50, 197] {
        let x = Tensor::<f32, 3>::new(vec![0.5; seq_len * 768], [1, seq_len, 768]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &x, |b, x| {
            b.iter(|| block.forward_tensor(black_box(x), &mut rng).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_vit_block);
criterion_main!(benches);
