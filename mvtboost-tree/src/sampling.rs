//! Seeded row subsampling.

use rand::Rng;

/// Draw `floor(n * fraction)` distinct row positions from `0..n` (at least one),
/// returned in increasing order.
///
/// With `fraction >= 1.0` every position is returned and the RNG is not
/// advanced, so full-data fits are independent of the seed.
pub fn bag_rows<R: Rng + ?Sized>(rng: &mut R, n: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let count = ((n as f64 * fraction).floor() as usize).clamp(1, n);
    let mut rows = rand::seq::index::sample(rng, n, count).into_vec();
    rows.sort_unstable();
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn full_fraction_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(bag_rows(&mut rng, 5, 1.0), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn half_fraction_distinct_sorted() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let rows = bag_rows(&mut rng, 11, 0.5);
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
        assert!(rows.iter().all(|&r| r < 11));
    }

    #[test]
    fn never_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(bag_rows(&mut rng, 4, 0.01).len(), 1);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let a = bag_rows(&mut ChaCha8Rng::seed_from_u64(42), 100, 0.3);
        let b = bag_rows(&mut ChaCha8Rng::seed_from_u64(42), 100, 0.3);
        assert_eq!(a, b);
    }
}
