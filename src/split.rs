use std::collections::BTreeMap;
use std::marker::PhantomData;

use burn::data::dataset::Dataset;
use rand::{Rng, seq::SliceRandom};

use crate::error::{Error, Result};

/// Disjoint train/validation indices into the same dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

impl StratifiedSplit {
    /// Total number of indices across both sides of the split.
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.valid.is_empty()
    }
}

/// Split `0..labels.len()` so that each label keeps its proportion on both sides.
///
/// Indices are grouped by label, each group is shuffled with `rng`, and the first
/// `floor(valid_fraction * group_len)` indices of a group go to the validation side.
/// Labels are processed in ascending order, so a seeded `rng` gives a reproducible split.
///
/// # Errors
///
/// * [Error::InvalidFraction] when `valid_fraction` is not in `[0, 1)`.
/// * [Error::SplitMismatch] when the result does not cover every index exactly once.
pub fn stratified_split<R>(
    labels: &[usize],
    valid_fraction: f64,
    rng: &mut R,
) -> Result<StratifiedSplit>
where
    R: Rng + ?Sized,
{
    if !(0.0..1.0).contains(&valid_fraction) {
        return Err(Error::InvalidFraction(valid_fraction));
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        groups.entry(*label).or_default().push(index);
    }

    let mut split = StratifiedSplit::default();
    for (label, mut indices) in groups {
        indices.shuffle(rng);
        let num_valid = (valid_fraction * indices.len() as f64) as usize;
        log::debug!(
            "Label {label}: {} train / {num_valid} valid",
            indices.len() - num_valid
        );

        split.valid.extend_from_slice(&indices[..num_valid]);
        split.train.extend_from_slice(&indices[num_valid..]);
    }

    check_partition(&split, labels.len())?;

    Ok(split)
}

fn check_partition(split: &StratifiedSplit, expected: usize) -> Result<()> {
    let mismatch = || Error::SplitMismatch {
        train: split.train.len(),
        valid: split.valid.len(),
        expected,
    };

    if split.len() != expected {
        return Err(mismatch());
    }

    let mut seen = vec![false; expected];
    for &index in split.train.iter().chain(split.valid.iter()) {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(mismatch()),
        }
    }

    Ok(())
}

/// A view over the items of a dataset selected by an index list.
///
/// Item `i` of the subset is item `indices[i]` of the wrapped dataset. Shuffling is
/// left to the data loader, which reshuffles the subset every epoch.
pub struct SubsetDataset<D, I> {
    dataset: D,
    indices: Vec<usize>,
    input: PhantomData<I>,
}

impl<D, I> SubsetDataset<D, I>
where
    D: Dataset<I>,
{
    pub fn new(dataset: D, indices: Vec<usize>) -> Self {
        Self {
            dataset,
            indices,
            input: PhantomData,
        }
    }
}

impl<D, I> Dataset<I> for SubsetDataset<D, I>
where
    D: Dataset<I>,
    I: Clone + Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices
            .get(index)
            .and_then(|&index| self.dataset.get(index))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn labels_with_counts(counts: &[usize]) -> Vec<usize> {
        counts
            .iter()
            .enumerate()
            .flat_map(|(label, count)| std::iter::repeat_n(label, *count))
            .collect()
    }

    #[test]
    fn keeps_class_proportions() {
        let labels = labels_with_counts(&[100, 40, 7, 20]);
        let mut rng = StdRng::seed_from_u64(1);

        let split = stratified_split(&labels, 0.15, &mut rng).unwrap();

        let count = |indices: &[usize], label: usize| {
            indices.iter().filter(|&&i| labels[i] == label).count()
        };
        assert_eq!(count(&split.valid, 0), 15);
        assert_eq!(count(&split.valid, 1), 6);
        assert_eq!(count(&split.valid, 2), 1);
        assert_eq!(count(&split.valid, 3), 3);
        assert_eq!(count(&split.train, 0), 85);
        assert_eq!(count(&split.train, 2), 6);
        assert_eq!(split.len(), labels.len());
    }

    #[test]
    fn small_class_stays_in_train() {
        let labels = labels_with_counts(&[3, 50]);
        let mut rng = StdRng::seed_from_u64(7);

        let split = stratified_split(&labels, 0.15, &mut rng).unwrap();

        assert!(split.valid.iter().all(|&i| labels[i] == 1));
        assert_eq!(split.train.iter().filter(|&&i| labels[i] == 0).count(), 3);
    }

    #[test]
    fn empty_labels_give_empty_split() {
        let mut rng = StdRng::seed_from_u64(0);
        let split = stratified_split(&[], 0.15, &mut rng).unwrap();

        assert!(split.is_empty());
    }

    #[test]
    fn same_seed_same_split() {
        let labels = labels_with_counts(&[30, 30, 30]);

        let first = stratified_split(&labels, 0.2, &mut StdRng::seed_from_u64(3)).unwrap();
        let second = stratified_split(&labels, 0.2, &mut StdRng::seed_from_u64(3)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let mut rng = StdRng::seed_from_u64(0);

        for fraction in [-0.1, 1.0, 1.5, f64::NAN] {
            let result = stratified_split(&[0, 1, 2], fraction, &mut rng);
            assert!(matches!(result, Err(Error::InvalidFraction(_))));
        }
    }

    #[test]
    fn partition_check_detects_duplicates() {
        let split = StratifiedSplit {
            train: vec![0, 1, 1],
            valid: vec![2],
        };

        assert!(matches!(
            check_partition(&split, 4),
            Err(Error::SplitMismatch { expected: 4, .. })
        ));
    }

    #[test]
    fn subset_maps_indices() {
        let dataset = InMemDataset::new(vec!["a", "b", "c", "d"]);
        let subset = SubsetDataset::new(dataset, vec![3, 0]);

        assert_eq!(subset.len(), 2);
        assert_eq!(subset.get(0), Some("d"));
        assert_eq!(subset.get(1), Some("a"));
        assert_eq!(subset.get(2), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn split_partitions_every_index(
            labels in proptest::collection::vec(0usize..12, 0..400),
            fraction in 0.0f64..0.99,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let split = stratified_split(&labels, fraction, &mut rng).unwrap();

            prop_assert_eq!(split.train.len() + split.valid.len(), labels.len());

            let mut all: Vec<usize> = split.train.iter().chain(split.valid.iter()).copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
        }
    }
}
