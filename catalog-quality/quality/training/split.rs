use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, Result},
    labeling::{reporter::LabelDistribution, scores::QualityLabel},
};

/// Row indices of a train/validation split, each ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    /// Training rows.
    pub train: Vec<usize>,
    /// Validation rows.
    pub validation: Vec<usize>,
}

/// Splits rows so each quality label keeps its share on both sides.
///
/// The validation side gets `ceil(test_size * n)` rows, apportioned across labels by largest
/// remainder. Every label must occur at least twice so it can appear in both halves.
pub fn stratified_split(
    labels: &[QualityLabel],
    test_size: f64,
    seed: u64,
) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test_size must lie in (0, 1), got {test_size}"
        )));
    }
    let distribution = LabelDistribution::from_labels(labels.iter().copied());
    if distribution.present() < 2 {
        return Err(PipelineError::TooFewClasses {
            found: distribution.present(),
        });
    }
    let present: Vec<QualityLabel> = QualityLabel::ALL
        .into_iter()
        .filter(|label| distribution.count(*label) > 0)
        .collect();
    if let Some(small) = present.iter().find(|label| distribution.count(**label) < 2) {
        return Err(PipelineError::ClassTooSmall {
            label: small.index(),
            count: distribution.count(*small),
        });
    }

    let n = labels.len();
    let n_test = ((test_size * n as f64).ceil() as usize).clamp(present.len(), n - present.len());
    let quotas = apportion(&present, &distribution, n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut validation = Vec::with_capacity(n_test);
    for (label, quota) in present.iter().zip(quotas) {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| *l == label)
            .map(|(idx, _)| idx)
            .collect();
        members.shuffle(&mut rng);
        validation.extend_from_slice(&members[..quota]);
        train.extend_from_slice(&members[quota..]);
    }
    train.sort_unstable();
    validation.sort_unstable();
    Ok(SplitIndices { train, validation })
}

/// Largest-remainder apportionment of `n_test` validation rows, keeping at least one row of each
/// label on both sides.
fn apportion(present: &[QualityLabel], distribution: &LabelDistribution, n_test: usize) -> Vec<usize> {
    let n = distribution.total() as f64;
    let exact: Vec<f64> = present
        .iter()
        .map(|label| n_test as f64 * distribution.count(*label) as f64 / n)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|share| share.floor() as usize).collect();
    let mut order: Vec<usize> = (0..present.len()).collect();
    order.sort_by(|a, b| {
        let rem_a = exact[*a] - exact[*a].floor();
        let rem_b = exact[*b] - exact[*b].floor();
        rem_b.total_cmp(&rem_a).then(a.cmp(b))
    });
    let assigned: usize = quotas.iter().sum();
    for idx in order.into_iter().cycle().take(n_test.saturating_sub(assigned)) {
        quotas[idx] += 1;
    }

    // Move rows until every label has a member on both sides.
    for idx in 0..present.len() {
        let count = distribution.count(present[idx]);
        while quotas[idx] == 0 {
            let donor = (0..present.len())
                .filter(|other| quotas[*other] > 1)
                .max_by_key(|other| quotas[*other]);
            let Some(donor) = donor else { break };
            quotas[donor] -= 1;
            quotas[idx] += 1;
        }
        while quotas[idx] >= count {
            let receiver = (0..present.len())
                .filter(|other| quotas[*other] + 1 < distribution.count(present[*other]))
                .min_by_key(|other| quotas[*other]);
            let Some(receiver) = receiver else { break };
            quotas[idx] -= 1;
            quotas[receiver] += 1;
        }
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(low: usize, medium: usize, high: usize) -> Vec<QualityLabel> {
        let mut out = vec![QualityLabel::Low; low];
        out.extend(vec![QualityLabel::Medium; medium]);
        out.extend(vec![QualityLabel::High; high]);
        out
    }

    fn count(labels: &[QualityLabel], rows: &[usize], label: QualityLabel) -> usize {
        rows.iter().filter(|idx| labels[**idx] == label).count()
    }

    #[test]
    fn preserves_class_proportions() {
        let labels = labels(25, 50, 25);
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(split.validation.len(), 20);
        assert_eq!(split.train.len(), 80);
        assert_eq!(count(&labels, &split.validation, QualityLabel::Low), 5);
        assert_eq!(count(&labels, &split.validation, QualityLabel::Medium), 10);
        assert_eq!(count(&labels, &split.validation, QualityLabel::High), 5);
    }

    #[test]
    fn halves_are_disjoint_and_cover_every_row() {
        let labels = labels(13, 41, 9);
        let split = stratified_split(&labels, 0.2, 7).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
        assert_eq!(split.validation.len(), 13);
        for label in QualityLabel::ALL {
            assert!(count(&labels, &split.validation, label) >= 1);
            assert!(count(&labels, &split.train, label) >= 1);
        }
    }

    #[test]
    fn same_seed_same_split() {
        let labels = labels(20, 30, 10);
        assert_eq!(
            stratified_split(&labels, 0.2, 42).unwrap(),
            stratified_split(&labels, 0.2, 42).unwrap()
        );
        assert_ne!(
            stratified_split(&labels, 0.2, 42).unwrap(),
            stratified_split(&labels, 0.2, 43).unwrap()
        );
    }

    #[test]
    fn single_label_is_rejected() {
        let err = stratified_split(&labels(10, 0, 0), 0.2, 42).unwrap_err();
        assert!(matches!(err, PipelineError::TooFewClasses { found: 1 }));
    }

    #[test]
    fn singleton_label_is_rejected() {
        let err = stratified_split(&labels(10, 1, 5), 0.2, 42).unwrap_err();
        assert!(matches!(err, PipelineError::ClassTooSmall { label: 1, count: 1 }));
    }

    #[test]
    fn tiny_classes_still_land_on_both_sides() {
        let labels = labels(2, 40, 2);
        let split = stratified_split(&labels, 0.2, 1).unwrap();
        for label in QualityLabel::ALL {
            assert_eq!(
                count(&labels, &split.validation, label) + count(&labels, &split.train, label),
                labels.iter().filter(|l| **l == label).count()
            );
            assert!(count(&labels, &split.validation, label) >= 1);
            assert!(count(&labels, &split.train, label) >= 1);
        }
    }
}
