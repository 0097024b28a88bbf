//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Clamp a value into `[min, max]`.
///
/// `NaN` is mapped to zero if zero lies in the range, otherwise to `min`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    if value.is_nan() {
        let zero = T::zero();
        return if *min <= zero && zero <= *max { zero } else { *min };
    }

    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Clamp a value into the normalised range `[-1, 1]`.
pub fn clamp_unit<T>(value: T) -> T
where
    T: Float,
{
    clamp(&value, &-T::one(), &T::one())
}

/// Wrap an angle into the range `(-pi, pi]`.
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float,
{
    let pi = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau = pi + pi;

    let r = rem_euclid(value + pi, tau) - pi;
    if r <= -pi {
        r + tau
    } else {
        r
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_unit(2.0f64), 1.0);
        assert_eq!(clamp_unit(-5.0f64), -1.0);
        assert_eq!(clamp_unit(0.25f64), 0.25);
        assert_eq!(clamp_unit(std::f64::NAN), 0.0);
        assert_eq!(clamp(&3.0f64, &0.0, &2.0), 2.0);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0f64, 10.0), (0.0, 1.0), 5.0), 0.5);
        assert_eq!(lin_map((-1.0f64, 1.0), (0.0, 100.0), 0.0), 50.0);
    }

    #[test]
    fn test_wrap_pi() {
        const PI: f64 = std::f64::consts::PI;

        assert!((wrap_pi(0.5f64) - 0.5).abs() < 1e-12);
        assert!((wrap_pi(PI + 0.5) - (-PI + 0.5)).abs() < 1e-12);
        assert!((wrap_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_pi(PI) - PI).abs() < 1e-12);
    }
}
