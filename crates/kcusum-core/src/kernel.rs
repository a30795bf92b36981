//! Gaussian Kernel and Paired MMD Statistic
//!
//! The detector compares consecutive pairs of the test stream against the
//! same pairs of the reference stream with a fixed-bandwidth Gaussian kernel:
//!
//!   gk(x, y) = exp(-(x - y)² / 2)
//!
//!   mmd(x1, x2, y1, y2) = gk(x1, x2) + gk(y1, y2) - gk(x1, y2) - gk(x2, y1)
//!
//! References:
//! - Gretton, A. et al. (2012). A kernel two-sample test. JMLR.
//! - Flynn, T. & Yoo, S. (2019). Change detection with the kernel cumulative sum algorithm.

/// Fixed-bandwidth Gaussian similarity kernel
#[inline]
pub fn gaussian_kernel(x: f64, y: f64) -> f64 {
    let d = x - y;
    (-d * d / 2.0).exp()
}

/// Paired kernel two-sample discrepancy.
///
/// `(x1, x2)` is a pair from the test stream, `(y1, y2)` the matching pair
/// from the reference stream. Zero when all four values coincide; single
/// realisations can be negative.
#[inline]
pub fn mmd(x1: f64, x2: f64, y1: f64, y2: f64) -> f64 {
    gaussian_kernel(x1, x2) + gaussian_kernel(y1, y2)
        - gaussian_kernel(x1, y2)
        - gaussian_kernel(x2, y1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_kernel_decays_with_distance() {
        assert_eq!(gaussian_kernel(1.5, 1.5), 1.0);
        assert_abs_diff_eq!(gaussian_kernel(0.0, 1.0), (-0.5f64).exp(), epsilon = 1e-15);
        assert!(gaussian_kernel(0.0, 10.0) < 1e-20);
    }

    #[test]
    fn test_mmd_of_separated_pairs_approaches_two() {
        // Test pair sits far from the reference pair, each pair internally tight
        let value = mmd(5.0, 5.0, 0.0, 0.0);
        assert_abs_diff_eq!(value, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_mmd_can_be_negative() {
        // Within-pair distances exceed cross distances
        assert!(mmd(0.0, 3.0, 3.0, 0.0) < 0.0);
    }

    proptest! {
        #[test]
        fn kernel_is_one_on_diagonal(x in -1e6f64..1e6) {
            prop_assert_eq!(gaussian_kernel(x, x), 1.0);
        }

        #[test]
        fn kernel_is_symmetric(x in -1e3f64..1e3, y in -1e3f64..1e3) {
            prop_assert_eq!(gaussian_kernel(x, y), gaussian_kernel(y, x));
        }

        #[test]
        fn kernel_is_bounded(x in -1e3f64..1e3, y in -1e3f64..1e3) {
            let k = gaussian_kernel(x, y);
            prop_assert!((0.0..=1.0).contains(&k));
        }

        #[test]
        fn mmd_vanishes_on_identical_values(v in -1e6f64..1e6) {
            prop_assert_eq!(mmd(v, v, v, v), 0.0);
        }

        #[test]
        fn mmd_vanishes_when_streams_match(x1 in -50f64..50.0, x2 in -50f64..50.0) {
            prop_assert!(mmd(x1, x2, x1, x2).abs() < 1e-12);
        }
    }
}
