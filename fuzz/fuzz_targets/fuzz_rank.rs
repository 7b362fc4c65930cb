#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pointrank::{
    compute_distances, parallel_merge_sort, Dataset, GpuRanker, HostDevice, ReferenceVector,
};

#[derive(Arbitrary, Debug)]
struct RankInput {
    values: Vec<f32>,
    dim: u8,
    grain: u8,
}

fuzz_target!(|input: RankInput| {
    let dim = usize::from(input.dim % 16) + 1;
    // NaN keys have no agreed position between backends
    if input.values.iter().any(|v| v.is_nan()) {
        return;
    }
    let rows: Vec<Vec<f32>> = input.values.chunks_exact(dim).map(<[f32]>::to_vec).collect();
    if rows.is_empty() || rows.len() > 4096 {
        return;
    }
    let reference = ReferenceVector::zeros(dim);

    let mut cpu = Dataset::from_rows(rows.clone()).unwrap();
    compute_distances(cpu.points_mut(), &reference).unwrap();
    parallel_merge_sort(cpu.points_mut(), usize::from(input.grain));

    let mut gpu = Dataset::from_rows(rows).unwrap();
    GpuRanker::new(HostDevice::new()).sort(&mut gpu, &reference).unwrap();

    assert!(cpu.is_ranked());
    assert_eq!(cpu.distances().iter().map(|d| d.to_bits()).collect::<Vec<_>>(),
               gpu.distances().iter().map(|d| d.to_bits()).collect::<Vec<_>>());
});
