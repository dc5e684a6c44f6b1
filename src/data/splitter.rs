// ============================================================
// Layer 4 — Fold Splitter
// ============================================================
// Cross-validation split by fold id:
//   - samples whose fold == the selected fold → validation
//   - every other sample                     → training
//
// The split is deterministic (no shuffling here); shuffling is
// the sampler's job and is driven by persisted state so runs
// can be resumed exactly.

use std::collections::BTreeMap;

use crate::domain::sample::SampleRecord;

/// Indices into the sample index, split by fold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

pub fn split_by_fold(index: &[SampleRecord], fold: u32) -> FoldSplit {
    let mut split = FoldSplit::default();
    for (i, record) in index.iter().enumerate() {
        if record.fold == fold {
            split.valid.push(i);
        } else {
            split.train.push(i);
        }
    }

    tracing::debug!(
        "Fold {} split: {} training, {} validation",
        fold,
        split.train.len(),
        split.valid.len(),
    );
    split
}

/// Group training indices by label, one stratum per class.
/// Returns (stratum name, members) pairs ordered by label.
pub fn stratify(index: &[SampleRecord], members: &[usize], by_label: bool) -> Vec<(String, Vec<usize>)> {
    if !by_label {
        return vec![("all".to_string(), members.to_vec())];
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in members {
        groups.entry(index[i].label).or_default().push(i);
    }
    groups
        .into_iter()
        .map(|(label, ids)| (format!("lbl-{label}"), ids))
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Vec<SampleRecord> {
        (0..10)
            .map(|i| SampleRecord::new(format!("s{i}"), format!("{i}.f32"), i % 5, (i % 3 == 0) as usize))
            .collect()
    }

    #[test]
    fn test_selected_fold_is_validation() {
        let split = split_by_fold(&index(), 2);
        assert_eq!(split.valid, vec![2, 7]);
        assert_eq!(split.train.len(), 8);
    }

    #[test]
    fn test_every_sample_lands_somewhere() {
        let split = split_by_fold(&index(), 0);
        assert_eq!(split.train.len() + split.valid.len(), 10);
    }

    #[test]
    fn test_stratify_by_label() {
        let idx    = index();
        let split  = split_by_fold(&idx, 4);
        let strata = stratify(&idx, &split.train, true);
        let names: Vec<&str> = strata.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lbl-0", "lbl-1"]);
        assert!(strata[1].1.iter().all(|&i| idx[i].label == 1));
    }

    #[test]
    fn test_single_stratum_without_labels() {
        let idx    = index();
        let strata = stratify(&idx, &[0, 1, 2], false);
        assert_eq!(strata, vec![("all".to_string(), vec![0, 1, 2])]);
    }
}
