// cargo run --example heat_equation
//
// Explicit Jacobi iteration of the 2D heat equation on a 64x64 grid split
// over a 2x2 process grid of in-process ranks. The halo exchange of each
// step overlaps with the update of cells that do not read mirror cells.
use halo_grid::prelude::*;

const N: usize = 64;
const STEPS: usize = 200;
const ALPHA: f64 = 0.2;
const ROOT: usize = 0;

fn update(u: &DistributedGrid<2, f64>, v: &mut DistributedGrid<2, f64>, i: isize, j: isize) {
    let c = u[[i, j]];
    let lap = u[[i - 1, j]] + u[[i + 1, j]] + u[[i, j - 1]] + u[[i, j + 1]] - 4.0 * c;
    v[[i, j]] = c + ALPHA * lap;
}

fn run(comm: &ThreadComm) -> Result<Option<LocalGrid<2, f64>>, GridError> {
    let dims = dims_create(comm.size(), CartesianDimensions::unset(2))?;
    let top = CartesianTopology::new(dims, comm.rank())?;
    let shape = [SizeOverlap::new(N, 1), SizeOverlap::new(N, 1)];
    let mut u = DistributedGrid::<2, f64>::new(&top, shape)?;
    let mut v = DistributedGrid::<2, f64>::new(&top, shape)?;

    let mut whole = if comm.rank() == ROOT {
        let mut g = LocalGrid::<2, f64>::new(&top, [N, N])?;
        let mid = (N / 2) as isize;
        for i in mid - 4..mid + 4 {
            for j in mid - 4..mid + 4 {
                g[[i, j]] = 1.0;
            }
        }
        scatter_root(comm, &g, &mut u)?;
        Some(g)
    } else {
        scatter(comm, ROOT, &mut u)?;
        None
    };

    let (b0, e0, b1, e1) = (u.begin(0), u.end(0), u.begin(1), u.end(1));
    for step in 0..STEPS {
        let round = start_halo_exchange(comm, &top, &u, CommTag::new(0x4EA7))?;
        for i in b0 + 1..e0 - 1 {
            for j in b1 + 1..e1 - 1 {
                update(&u, &mut v, i, j);
            }
        }
        round.wait(&mut u)?;
        for i in b0..e0 {
            for j in b1..e1 {
                let edge = i == b0 || i == e0 - 1 || j == b1 || j == e1 - 1;
                if edge {
                    update(&u, &mut v, i, j);
                }
            }
        }
        u.swap(&mut v);
        if step % 50 == 0 {
            log::debug!("rank {}: step {step} done", comm.rank());
        }
    }

    match whole.as_mut() {
        Some(g) => gather_root(comm, &u, g)?,
        None => gather(comm, ROOT, &u)?,
    }
    Ok(whole)
}

fn main() {
    let world = ThreadComm::world(4);
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|comm| s.spawn(move || run(comm))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (rank, r) in results.iter().enumerate() {
        if let Err(e) = r {
            eprintln!("rank {rank} failed: {e}");
            std::process::exit(1);
        }
    }
    let Some(Ok(Some(field))) = results.into_iter().nth(ROOT) else {
        unreachable!("root returns the gathered field");
    };
    let total: f64 = field.data().iter().sum();
    let peak = field.data().iter().cloned().fold(f64::MIN, f64::max);
    println!("after {STEPS} steps: total heat {total:.4}, peak {peak:.4}");
}
