use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Squared Euclidean distance between two points of the same length
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Draw `nsample` indices from `[0, ntot)`. Without replacement if
/// `nsample <= ntot`, otherwise every index once followed by draws
/// with replacement.
pub fn sample_indices<R: Rng>(ntot: usize, nsample: usize, rng: &mut R) -> Vec<usize> {
    if ntot == 0 {
        return vec![];
    }
    if nsample <= ntot {
        rand::seq::index::sample(rng, ntot, nsample).into_vec()
    } else {
        let mut ret: Vec<usize> = (0..ntot).collect();
        ret.extend((ntot..nsample).map(|_| rng.random_range(0..ntot)));
        ret
    }
}

/// Sample d,n matrix from N(0,1) with a fixed seed
pub fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> DMatrix<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let rvec = (0..(dd * nn))
        .map(|_| rng.sample::<f32, _>(StandardNormal))
        .collect::<Vec<_>>();
    DMatrix::<f32>::from_vec(dd, nn, rvec)
}

/// Median of finite values; `None` if there are none
pub fn median(values: &[f32]) -> Option<f32> {
    let mut xx: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if xx.is_empty() {
        return None;
    }
    xx.sort_by(|a, b| a.total_cmp(b));
    let n = xx.len();
    if n % 2 == 1 {
        Some(xx[n / 2])
    } else {
        Some(0.5 * (xx[n / 2 - 1] + xx[n / 2]))
    }
}

impl MatOps for DMatrix<f32> {
    type Scalar = f32;

    fn arcsinh_inplace(&mut self, cofactor: f32) {
        self.apply(|x| *x = (*x / cofactor).asinh());
    }
}

impl DistanceOps for DMatrix<f32> {
    type Scalar = f32;

    fn column_values(&self, j: usize) -> &[f32] {
        let dd = self.nrows();
        &self.as_slice()[(j * dd)..((j + 1) * dd)]
    }

    fn nearest_column(&self, target: &[f32]) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for j in 0..self.ncols() {
            let d = squared_euclidean(self.column_values(j), target);
            match best {
                Some((_, b)) if d >= b => {}
                _ => best = Some((j, d)),
            }
        }
        best
    }

    fn pairwise_column_distances(&self) -> Vec<Vec<f32>> {
        let nn = self.ncols();
        let mut ret = vec![vec![0_f32; nn]; nn];
        for i in 0..nn {
            for j in (i + 1)..nn {
                let d = squared_euclidean(self.column_values(i), self.column_values(j)).sqrt();
                ret[i][j] = d;
                ret[j][i] = d;
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_column_ties_go_low() {
        // two identical columns at distance 1 from the origin
        let xx = DMatrix::from_column_slice(2, 3, &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        let (j, d) = xx.nearest_column(&[0.0, 0.0]).unwrap();
        assert_eq!(j, 0);
        approx::assert_abs_diff_eq!(d, 1.0);
    }

    #[test]
    fn test_sample_indices_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut idx = sample_indices(20, 20, &mut rng);
        idx.sort();
        assert_eq!(idx, (0..20).collect::<Vec<_>>());

        let idx = sample_indices(3, 5, &mut rng);
        assert_eq!(idx.len(), 5);
        assert!(idx.iter().all(|&i| i < 3));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f32::NAN]), None);
    }
}
