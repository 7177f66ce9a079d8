//! Average-linkage (UPGMA) hierarchical clustering

use crate::error::{LupinError, Result};

/// Relative tolerance when comparing merge heights; prototypes are
/// single precision
const HEIGHT_TOL: f64 = 1e-6;

/// One agglomeration step. `left < right` are slots in the leaf
/// index space; after the merge the union lives in `left`.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct Dendrogram {
    num_leaves: usize,
    merges: Vec<Merge>,
}

fn heights_tie(a: f64, b: f64) -> bool {
    (b - a).abs() <= HEIGHT_TOL * b.abs().max(a.abs()).max(1.0)
}

impl Dendrogram {
    /// Build the UPGMA tree of a symmetric distance matrix.
    ///
    /// At every step the closest pair of active clusters is merged;
    /// among equally close pairs the one with the lowest `(i, j)` is
    /// taken, so the merge order does not depend on anything but the
    /// distances.
    pub fn average_linkage(dist: &[Vec<f64>]) -> Result<Self> {
        let nn = dist.len();
        if nn == 0 {
            return Err(LupinError::EmptyInput("no items to cluster".into()));
        }
        if let Some(i) = dist.iter().position(|row| row.len() != nn) {
            return Err(LupinError::InvalidConfiguration(format!(
                "distance matrix row {} has {} entries, expected {}",
                i,
                dist[i].len(),
                nn
            )));
        }

        let mut dd: Vec<Vec<f64>> = dist.to_vec();
        let mut size = vec![1_usize; nn];
        let mut active = vec![true; nn];
        let mut merges = Vec::with_capacity(nn - 1);

        for _ in 1..nn {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in (0..nn).filter(|&i| active[i]) {
                for j in ((i + 1)..nn).filter(|&j| active[j]) {
                    match best {
                        Some((_, _, b)) if dd[i][j] >= b => {}
                        _ => best = Some((i, j, dd[i][j])),
                    }
                }
            }

            let Some((i, j, height)) = best else {
                break;
            };

            let (ni, nj) = (size[i] as f64, size[j] as f64);
            for k in (0..nn).filter(|&k| active[k] && k != i && k != j) {
                let d = (ni * dd[i][k] + nj * dd[j][k]) / (ni + nj);
                dd[i][k] = d;
                dd[k][i] = d;
            }
            size[i] += size[j];
            active[j] = false;

            merges.push(Merge {
                left: i,
                right: j,
                height,
                size: size[i],
            });
        }

        Ok(Self {
            num_leaves: nn,
            merges,
        })
    }

    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    /// Cut the tree into exactly `k` groups.
    ///
    /// Applies the first `n - k` merges. Labels are `1..=k`, numbered by
    /// first appearance in leaf order. The returned height is the
    /// height of the next (unapplied) merge: every cut strictly below
    /// it and at or above the last applied merge gives this partition.
    /// For `k == 1` it is the root height.
    ///
    /// Fails with `MergeInfeasible` when the last applied merge and the
    /// next one happen at the same height, since no height cut then
    /// yields exactly `k` groups.
    pub fn cut(&self, k: usize) -> Result<(Vec<usize>, f64)> {
        let nn = self.num_leaves;
        if k == 0 || k > nn {
            return Err(LupinError::InvalidConfiguration(format!(
                "requested {} metaclusters but grid has only {} nodes",
                k, nn
            )));
        }

        let napply = nn - k;

        let cut_height = if napply == 0 {
            self.merges.first().map(|m| m.height).unwrap_or(0.0)
        } else if napply == self.merges.len() {
            self.merges[napply - 1].height
        } else {
            let last = self.merges[napply - 1].height;
            let next = self.merges[napply].height;
            if heights_tie(last, next) {
                return Err(LupinError::MergeInfeasible {
                    requested: k,
                    step: napply,
                    next: napply + 1,
                    height: next,
                });
            }
            next
        };

        // slot of each leaf after the applied merges
        let mut slot: Vec<usize> = (0..nn).collect();
        for m in &self.merges[..napply] {
            for s in slot.iter_mut() {
                if *s == m.right {
                    *s = m.left;
                }
            }
        }

        let mut label_of_slot = vec![0_usize; nn];
        let mut next_label = 0;
        let labels = slot
            .iter()
            .map(|&s| {
                if label_of_slot[s] == 0 {
                    next_label += 1;
                    label_of_slot[s] = next_label;
                }
                label_of_slot[s]
            })
            .collect();

        Ok((labels, cut_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_distances(xs: &[f64]) -> Vec<Vec<f64>> {
        xs.iter()
            .map(|a| xs.iter().map(|b| (a - b).abs()).collect())
            .collect()
    }

    #[test]
    fn test_upgma_heights() {
        let tree = Dendrogram::average_linkage(&line_distances(&[0.0, 1.0, 3.0, 7.0])).unwrap();
        let h = tree.heights();
        approx::assert_abs_diff_eq!(h[0], 1.0);
        approx::assert_abs_diff_eq!(h[1], 2.5);
        approx::assert_abs_diff_eq!(h[2], 17.0 / 3.0, epsilon = 1e-12);
        assert_eq!(tree.merges()[2].size, 4);
    }

    #[test]
    fn test_cut_reports_next_height() {
        let tree = Dendrogram::average_linkage(&line_distances(&[0.0, 1.0, 3.0, 7.0])).unwrap();

        let (labels, h) = tree.cut(2).unwrap();
        assert_eq!(labels, vec![1, 1, 1, 2]);
        approx::assert_abs_diff_eq!(h, 17.0 / 3.0, epsilon = 1e-12);

        let (labels, h) = tree.cut(3).unwrap();
        assert_eq!(labels, vec![1, 1, 2, 3]);
        approx::assert_abs_diff_eq!(h, 2.5);

        let (labels, _) = tree.cut(4).unwrap();
        assert_eq!(labels, vec![1, 2, 3, 4]);

        let (labels, _) = tree.cut(1).unwrap();
        assert_eq!(labels, vec![1; 4]);
    }

    #[test]
    fn test_labels_follow_leaf_order() {
        let tree = Dendrogram::average_linkage(&line_distances(&[9.0, 0.0, 0.5, 9.2])).unwrap();
        let (labels, _) = tree.cut(2).unwrap();
        assert_eq!(labels, vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_tied_heights_cannot_be_cut() {
        // equilateral triangle: both merges at height 1
        let dist = vec![
            vec![0.0, 1.0, 1.0],
            vec![1.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let tree = Dendrogram::average_linkage(&dist).unwrap();
        assert_eq!(tree.merges()[0].left, 0);
        assert_eq!(tree.merges()[0].right, 1);

        match tree.cut(2) {
            Err(LupinError::MergeInfeasible {
                requested, height, ..
            }) => {
                assert_eq!(requested, 2);
                approx::assert_abs_diff_eq!(height, 1.0);
            }
            other => panic!("expected MergeInfeasible, got {:?}", other),
        }
        assert!(tree.cut(1).is_ok());
        assert!(tree.cut(3).is_ok());
    }

    #[test]
    fn test_cut_out_of_range() {
        let tree = Dendrogram::average_linkage(&line_distances(&[0.0, 1.0])).unwrap();
        assert!(matches!(tree.cut(0), Err(LupinError::InvalidConfiguration(_))));
        assert!(matches!(tree.cut(3), Err(LupinError::InvalidConfiguration(_))));
    }
}
