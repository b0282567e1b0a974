#![allow(dead_code)]
use halo_grid::algs::communicator::ThreadComm;
use halo_grid::topology::{CartesianDimensions, CartesianTopology, Periodicity};

/// Run `f` once per rank of an in-process world, one thread per rank, and
/// collect the results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ThreadComm) -> R + Sync,
{
    let world = ThreadComm::world(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Cartesian dimensions from `(processes, periodicity)` pairs.
pub fn dims(spec: &[(usize, Periodicity)]) -> CartesianDimensions {
    spec.iter().copied().collect()
}

pub fn topology(spec: &[(usize, Periodicity)], rank: usize) -> CartesianTopology {
    CartesianTopology::new(dims(spec), rank).unwrap()
}

/// Decode packed bytes into elements.
pub fn elems<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytemuck::pod_collect_to_vec(bytes)
}

/// Call `f` on every index of the box `lo..hi`, first dimension fastest.
pub fn for_each_index<const D: usize>(lo: [isize; D], hi: [isize; D], mut f: impl FnMut([isize; D])) {
    if (0..D).any(|d| lo[d] >= hi[d]) {
        return;
    }
    let mut idx = lo;
    loop {
        f(idx);
        let mut d = 0;
        loop {
            if d == D {
                return;
            }
            idx[d] += 1;
            if idx[d] < hi[d] {
                break;
            }
            idx[d] = lo[d];
            d += 1;
        }
    }
}
