//! Classification scores over class indices.

use std::collections::BTreeSet;

pub fn accuracy(truth: &[usize], predicted: &[usize]) -> Option<f64> {
    if truth.is_empty() {
        return None;
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    Some(correct as f64 / truth.len() as f64)
}

/// Macro-averaged precision, recall and F1 over every class seen in either
/// `truth` or `predicted`. A class with no predictions (or no true members)
/// scores 0 for the undefined ratio.
pub fn macro_scores(truth: &[usize], predicted: &[usize]) -> Option<(f64, f64, f64)> {
    if truth.is_empty() {
        return None;
    }
    let classes: BTreeSet<usize> = truth.iter().chain(predicted).copied().collect();
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for &c in &classes {
        let pairs = || truth.iter().zip(predicted);
        let tp = pairs().filter(|(t, p)| **t == c && **p == c).count();
        let fp = pairs().filter(|(t, p)| **t != c && **p == c).count();
        let fn_ = pairs().filter(|(t, p)| **t == c && **p != c).count();
        let p = ratio(tp, tp + fp);
        let r = ratio(tp, tp + fn_);
        precision += p;
        recall += r;
        f1 += if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) };
    }
    let k = classes.len() as f64;
    Some((precision / k, recall / k, f1 / k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_predictions_score_one() {
        let y = [0, 1, 2, 1];
        assert_eq!(accuracy(&y, &y), Some(1.0));
        assert_eq!(macro_scores(&y, &y), Some((1.0, 1.0, 1.0)));
    }

    #[test]
    fn macro_average_weights_classes_equally() {
        let truth = [0, 0, 0, 1];
        let pred = [0, 0, 1, 1];
        let (p, r, f) = macro_scores(&truth, &pred).unwrap();
        // class 0: p=1, r=2/3; class 1: p=1/2, r=1
        assert_relative_eq!(p, 0.75);
        assert_relative_eq!(r, 5.0 / 6.0);
        assert_relative_eq!(f, (0.8 + 2.0 / 3.0) / 2.0, epsilon = 1e-12);
        assert_eq!(accuracy(&truth, &pred), Some(0.75));
    }
}
