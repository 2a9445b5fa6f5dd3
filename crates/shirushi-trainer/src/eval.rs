//! Token-level evaluation.

/// Count correct predictions against gold tags.
///
/// Returns `(n, correct)` with `0 <= correct <= n`. Mismatched-length
/// inputs indicate an index bookkeeping bug upstream and are rejected.
pub fn accuracy(golds: &[usize], predictions: &[usize]) -> anyhow::Result<(usize, usize)> {
    anyhow::ensure!(
        golds.len() == predictions.len(),
        "gold/predicted length mismatch: {} vs {}",
        golds.len(),
        predictions.len()
    );
    let correct = golds
        .iter()
        .zip(predictions)
        .filter(|(gold, pred)| gold == pred)
        .count();
    Ok((golds.len(), correct))
}
