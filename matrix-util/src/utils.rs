use fnv::FnvHashMap as HashMap;
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hash::Hash;

/// partition membership vector into groups of indexes
/// # Arguments
/// * `membership` - a vector of membership (E.g., cluster assignment)
/// * `nelem_per_group` - number of elements per group (if None, no downsampling)
/// * `seed` - random seed for downsampling
/// # Returns
/// A hashmap: cluster/group name -> indexes of the elements, in
/// increasing order
pub fn partition_by_membership<T>(
    membership: &[T],
    nelem_per_group: Option<usize>,
    seed: u64,
) -> HashMap<T, Vec<usize>>
where
    T: Eq + Hash + Clone + Ord,
{
    let mut groups: HashMap<T, Vec<usize>> = HashMap::default();
    for (i, k) in membership.iter().enumerate() {
        groups.entry(k.clone()).or_default().push(i);
    }

    if let Some(ntarget) = nelem_per_group {
        // visit groups in key order so that the draws do not depend
        // on the hash map layout
        let mut keys: Vec<T> = groups.keys().cloned().collect();
        keys.sort();
        let mut rng = StdRng::seed_from_u64(seed);
        for k in keys {
            if let Some(elems) = groups.get_mut(&k) {
                if elems.len() > ntarget {
                    elems.shuffle(&mut rng);
                    elems.truncate(ntarget);
                    elems.sort_unstable();
                }
            }
        }
    }
    groups
}

/// Count occurrences of `1..=ngroups` labels; out-of-range labels are
/// ignored
pub fn count_one_based(labels: &[usize], ngroups: usize) -> Vec<usize> {
    let mut counts = vec![0; ngroups];
    for &k in labels {
        if k >= 1 && k <= ngroups {
            counts[k - 1] += 1;
        }
    }
    counts
}
