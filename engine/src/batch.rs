//! Batcher: splits a sequence into fixed-size chunks, preserving order. Pure;
//! used to size both the search-query waves and the submodule pump.

/// Splits `items` into chunks of at most `size`, preserving order. The final
/// chunk may be shorter. `size = 0` is a programming error.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn batch<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size >= 1, "batch size must be at least 1");
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_evenly() {
        let batches = batch(vec![1, 2, 3, 4], 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn final_batch_is_shorter() {
        let batches = batch(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let batches: Vec<Vec<i32>> = batch(vec![], 3);
        assert!(batches.is_empty());
    }

    #[test]
    #[should_panic(expected = "batch size must be at least 1")]
    fn zero_size_panics() {
        let _ = batch(vec![1], 0);
    }
}
