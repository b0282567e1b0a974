use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use halo_grid::algs::communicator::{CommTag, NoComm};
use halo_grid::algs::halo_exchange::exchange_halos;
use halo_grid::datatype::ArrayOrder;
use halo_grid::grid::{DistributedGrid, SizeOverlap};
use halo_grid::layout::{IndexedParameter, Layout, SubarrayParameter};
use halo_grid::topology::{CartesianDimensions, CartesianTopology, Periodicity};

fn face(n: usize) -> SubarrayParameter {
    let mut par = SubarrayParameter::new();
    par.add(n + 2, n, 1).add(n + 2, 1, 1).add(n + 2, n, 1);
    par.set_order(ArrayOrder::Fortran);
    par
}

fn bench_subarray_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("subarray_construction");
    for &n in &[16usize, 64, 128] {
        let par = face(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &par, |b, par| {
            b.iter(|| Layout::<f64>::subarray(black_box(par)).unwrap())
        });
    }
    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack");
    for &n in &[16usize, 64] {
        let data = vec![1.0f64; (n + 2).pow(3)];
        let l = Layout::<f64>::subarray(&face(n)).unwrap();
        group.bench_with_input(BenchmarkId::new("face", n), &l, |b, l| {
            b.iter(|| l.pack(black_box(&data)).unwrap())
        });

        let mut rng = SmallRng::seed_from_u64(42);
        let par: IndexedParameter = (0..n * n)
            .map(|_| (rng.gen_range(1..4), rng.gen_range(0..(n + 2).pow(3) as isize - 4)))
            .collect();
        let l = Layout::<f64>::indexed(&par).unwrap();
        group.bench_with_input(BenchmarkId::new("random_indexed", n), &l, |b, l| {
            b.iter(|| l.pack(black_box(&data)).unwrap())
        });
    }
    group.finish();
}

fn bench_serial_halo_round(c: &mut Criterion) {
    let mut dims = CartesianDimensions::new();
    dims.add(1, Periodicity::Periodic).add(1, Periodicity::Periodic);
    let top = CartesianTopology::new(dims, 0).unwrap();
    let mut g = DistributedGrid::<2, f64>::new(&top, [SizeOverlap::new(256, 2), SizeOverlap::new(256, 2)]).unwrap();
    c.bench_function("periodic_halo_round_256x256", |b| {
        b.iter(|| exchange_halos(&NoComm, &top, &mut g, CommTag::new(0x100)).unwrap())
    });
}

criterion_group!(benches, bench_subarray_construction, bench_pack, bench_serial_halo_round);
criterion_main!(benches);
