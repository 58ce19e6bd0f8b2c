//! Scalar test metrics over anomaly scores.

/// Image-level AUROC via the rank-sum statistic.
///
/// Ties receive average ranks. Degenerate label sets (a single class) score
/// 0.5, matching an uninformative detector.
pub fn auroc(scores: &[f32], labels: &[bool]) -> f64 {
    debug_assert_eq!(scores.len(), labels.len());
    let n = scores.len();
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // average 1-based rank across the tie group [i, j]
        let rank = (i + 1 + j + 1) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&label, _)| label)
        .map(|(_, &rank)| rank)
        .sum();
    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}

/// Best achievable F1 over all score thresholds.
///
/// Returns `(f1, threshold)` where samples scoring at or above the threshold
/// are predicted anomalous.
pub fn optimal_f1(scores: &[f32], labels: &[bool]) -> (f64, f64) {
    debug_assert_eq!(scores.len(), labels.len());
    let n = scores.len();
    let n_pos = labels.iter().filter(|&&l| l).count();
    if n == 0 || n_pos == 0 {
        return (0.0, f64::INFINITY);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut best_f1 = 0.0;
    let mut best_threshold = f64::INFINITY;
    let mut true_positives = 0usize;
    for (k, &idx) in order.iter().enumerate() {
        if labels[idx] {
            true_positives += 1;
        }
        // only evaluate at threshold boundaries, never inside a tie group
        if k + 1 < n && scores[order[k + 1]] == scores[idx] {
            continue;
        }
        let predicted = k + 1;
        let precision = true_positives as f64 / predicted as f64;
        let recall = true_positives as f64 / n_pos as f64;
        if precision + recall > 0.0 {
            let f1 = 2.0 * precision * recall / (precision + recall);
            if f1 > best_f1 {
                best_f1 = f1;
                best_threshold = f64::from(scores[idx]);
            }
        }
    }
    (best_f1, best_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auroc_of_perfect_separation_is_one() {
        let scores = [0.9, 0.8, 0.2, 0.1];
        let labels = [true, true, false, false];
        assert_eq!(auroc(&scores, &labels), 1.0);
    }

    #[test]
    fn auroc_of_inverted_scores_is_zero() {
        let scores = [0.1, 0.2, 0.8, 0.9];
        let labels = [true, true, false, false];
        assert_eq!(auroc(&scores, &labels), 0.0);
    }

    #[test]
    fn auroc_matches_hand_computed_value() {
        let scores = [0.9, 0.8, 0.7, 0.6];
        let labels = [true, false, true, false];
        assert_eq!(auroc(&scores, &labels), 0.75);
    }

    #[test]
    fn auroc_handles_ties_with_average_ranks() {
        let scores = [0.5, 0.5, 0.5, 0.5];
        let labels = [true, false, true, false];
        assert_eq!(auroc(&scores, &labels), 0.5);
    }

    #[test]
    fn auroc_degenerate_labels_fall_back_to_half() {
        let scores = [0.1, 0.2];
        assert_eq!(auroc(&scores, &[true, true]), 0.5);
        assert_eq!(auroc(&scores, &[false, false]), 0.5);
    }

    #[test]
    fn optimal_f1_matches_hand_computed_value() {
        let scores = [0.9, 0.8, 0.7, 0.6];
        let labels = [true, false, true, false];
        let (f1, threshold) = optimal_f1(&scores, &labels);
        assert!((f1 - 0.8).abs() < 1e-12);
        assert!((threshold - 0.7).abs() < 1e-12);
    }

    #[test]
    fn optimal_f1_is_one_for_perfect_separation() {
        let scores = [0.9, 0.8, 0.2, 0.1];
        let labels = [true, true, false, false];
        let (f1, threshold) = optimal_f1(&scores, &labels);
        assert_eq!(f1, 1.0);
        assert!((threshold - 0.8).abs() < 1e-12);
    }
}
