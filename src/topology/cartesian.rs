//! Cartesian process grids.
//!
//! Ranks are numbered row-major over the process coordinates: the last
//! dimension varies fastest.

use super::{Periodicity, ProcessGrid, ShiftRanks};
use crate::grid_error::GridError;
use serde::{Deserialize, Serialize};

/// Number of processes and periodicity per dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartesianDimensions {
    sizes: Vec<usize>,
    periods: Vec<Periodicity>,
}

impl CartesianDimensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `d` non-periodic dimensions whose sizes are left for
    /// [`dims_create`] to choose.
    pub fn unset(d: usize) -> Self {
        CartesianDimensions {
            sizes: vec![0; d],
            periods: vec![Periodicity::NonPeriodic; d],
        }
    }

    pub fn add(&mut self, size: usize, period: Periodicity) -> &mut Self {
        self.sizes.push(size);
        self.periods.push(period);
        self
    }

    pub fn set_periodicity(&mut self, d: usize, period: Periodicity) -> &mut Self {
        if let Some(p) = self.periods.get_mut(d) {
            *p = period;
        }
        self
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn size(&self, d: usize) -> usize {
        self.sizes[d]
    }

    pub fn periodicity(&self, d: usize) -> Periodicity {
        self.periods[d]
    }

    /// Product of all dimension sizes.
    pub fn volume(&self) -> usize {
        self.sizes.iter().product()
    }
}

impl FromIterator<(usize, Periodicity)> for CartesianDimensions {
    fn from_iter<I: IntoIterator<Item = (usize, Periodicity)>>(iter: I) -> Self {
        let mut dims = Self::new();
        for (size, period) in iter {
            dims.add(size, period);
        }
        dims
    }
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            out.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        out.push(n);
    }
    out
}

/// Fill every zero entry of `dims` so that the product equals `nprocs`.
///
/// The free dimensions receive a balanced factorisation in non-increasing
/// order; fixed (non-zero) entries are kept. Fails with `InvalidSize` when
/// the fixed entries do not divide `nprocs`.
pub fn dims_create(nprocs: usize, mut dims: CartesianDimensions) -> Result<CartesianDimensions, GridError> {
    let fixed: usize = dims.sizes.iter().filter(|&&s| s != 0).product();
    let free: Vec<usize> = (0..dims.sizes.len()).filter(|&d| dims.sizes[d] == 0).collect();
    if fixed == 0 || nprocs % fixed != 0 || (free.is_empty() && fixed != nprocs) {
        return Err(GridError::InvalidSize {
            expected: nprocs,
            found: fixed,
        });
    }
    if free.is_empty() {
        return Ok(dims);
    }
    let mut parts = vec![1usize; free.len()];
    // largest factors first, each onto the currently smallest part
    for f in prime_factors(nprocs / fixed).into_iter().rev() {
        if let Some(smallest) = parts.iter_mut().min() {
            *smallest *= f;
        }
    }
    parts.sort_unstable_by(|a, b| b.cmp(a));
    for (d, p) in free.into_iter().zip(parts) {
        dims.sizes[d] = p;
    }
    Ok(dims)
}

/// A process's place in a Cartesian process grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartesianTopology {
    dims: CartesianDimensions,
    rank: usize,
    coords: Vec<usize>,
}

impl CartesianTopology {
    /// Place `rank` in a grid of `dims`. Every size must be positive and
    /// `rank` must be below their product.
    pub fn new(dims: CartesianDimensions, rank: usize) -> Result<Self, GridError> {
        if dims.dimensionality() == 0 || dims.sizes.iter().any(|&s| s == 0) {
            return Err(GridError::InvalidSize {
                expected: dims.volume().max(1),
                found: 0,
            });
        }
        let size = dims.volume();
        if rank >= size {
            return Err(GridError::InvalidRank { rank, size });
        }
        let coords = coordinates_in(&dims.sizes, rank);
        log::debug!("cartesian rank {rank}/{size} at {coords:?} in {:?}", dims.sizes);
        Ok(CartesianTopology { dims, rank, coords })
    }

    pub fn dims(&self) -> &CartesianDimensions {
        &self.dims
    }

    /// Coordinates of this process.
    pub fn own_coordinates(&self) -> &[usize] {
        &self.coords
    }

    /// Rank at `coords`; periodic dimensions wrap, non-periodic ones yield
    /// `None` outside the grid.
    pub fn rank_of(&self, coords: &[isize]) -> Option<usize> {
        if coords.len() != self.dims.dimensionality() {
            return None;
        }
        let mut rank = 0usize;
        for (d, &c) in coords.iter().enumerate() {
            let n = self.dims.sizes[d] as isize;
            let c = match self.dims.periods[d] {
                Periodicity::Periodic => c.rem_euclid(n),
                Periodicity::NonPeriodic if (0..n).contains(&c) => c,
                Periodicity::NonPeriodic => return None,
            };
            rank = rank * n as usize + c as usize;
        }
        Some(rank)
    }
}

fn coordinates_in(sizes: &[usize], mut rank: usize) -> Vec<usize> {
    let mut coords = vec![0; sizes.len()];
    for d in (0..sizes.len()).rev() {
        coords[d] = rank % sizes[d];
        rank /= sizes[d];
    }
    coords
}

impl ProcessGrid for CartesianTopology {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.dims.volume()
    }

    fn dimensionality(&self) -> usize {
        self.dims.dimensionality()
    }

    fn dim_size(&self, d: usize) -> usize {
        self.dims.sizes[d]
    }

    fn coordinates(&self, rank: usize) -> Vec<usize> {
        coordinates_in(&self.dims.sizes, rank)
    }

    fn shift(&self, d: usize, disp: isize) -> ShiftRanks {
        let at = |delta: isize| {
            let mut c: Vec<isize> = self.coords.iter().map(|&x| x as isize).collect();
            c[d] += delta;
            self.rank_of(&c)
        };
        ShiftRanks {
            source: at(-disp),
            destination: at(disp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(spec: &[(usize, Periodicity)]) -> CartesianDimensions {
        spec.iter().copied().collect()
    }

    #[test]
    fn row_major_numbering() {
        let t = CartesianTopology::new(dims(&[(2, Periodicity::NonPeriodic), (3, Periodicity::NonPeriodic)]), 4)
            .unwrap();
        assert_eq!(t.own_coordinates(), &[1, 1]);
        assert_eq!(t.coordinates(5), vec![1, 2]);
        assert_eq!(t.rank_of(&[0, 2]), Some(2));
    }

    #[test]
    fn shift_respects_periodicity() {
        let t = CartesianTopology::new(dims(&[(4, Periodicity::NonPeriodic), (3, Periodicity::Periodic)]), 0)
            .unwrap();
        let s = t.shift(0, 1);
        assert_eq!((s.source, s.destination), (None, Some(3)));
        let s = t.shift(1, -1);
        // coordinates (0,0): source (0,1), destination (0,2)
        assert_eq!((s.source, s.destination), (Some(1), Some(2)));
    }

    #[test]
    fn dims_create_balances() {
        let d = dims_create(12, CartesianDimensions::unset(2)).unwrap();
        assert_eq!(d.sizes(), &[4, 3]);
        let d = dims_create(8, CartesianDimensions::unset(3)).unwrap();
        assert_eq!(d.sizes(), &[2, 2, 2]);
        let mut fixed = CartesianDimensions::unset(2);
        fixed.sizes[1] = 5;
        assert!(dims_create(12, fixed).is_err());
    }

    #[test]
    fn rank_out_of_range_fails() {
        let err = CartesianTopology::new(dims(&[(2, Periodicity::Periodic)]), 2).unwrap_err();
        assert_eq!(err, GridError::InvalidRank { rank: 2, size: 2 });
    }
}
