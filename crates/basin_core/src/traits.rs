use num_complex::Complex64;
use num_traits::{Float, FromPrimitive};
use std::f64::consts::PI;
use std::fmt::Debug;

/// A trait for types that can be used as real scalars in the iterated maps.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + Send + Sync + 'static {}

impl<T: Float + FromPrimitive + Debug + Send + Sync + 'static> Scalar for T {}

/// A complex-valued function paired with its analytic derivative.
///
/// Implementations must be pure: the same `z` always yields the same value, and
/// no state is shared between calls. `Sync` is required because a single
/// instance is read concurrently by every grid worker.
pub trait ComplexFunction: Sync {
    /// f(z)
    fn value(&self, z: Complex64) -> Complex64;

    /// f'(z)
    fn derivative(&self, z: Complex64) -> Complex64;
}

impl<F: ComplexFunction + ?Sized> ComplexFunction for &F {
    fn value(&self, z: Complex64) -> Complex64 {
        (**self).value(z)
    }

    fn derivative(&self, z: Complex64) -> Complex64 {
        (**self).derivative(z)
    }
}

/// A one-dimensional iterated map x_{n+1} = f(x_n).
pub trait ScalarMap<T: Scalar> {
    fn apply(&self, x: T) -> T;
}

/// `ComplexFunction` backed by two closures.
#[derive(Clone, Copy)]
pub struct FunctionPair<F, D> {
    value: F,
    derivative: D,
}

impl<F, D> FunctionPair<F, D>
where
    F: Fn(Complex64) -> Complex64 + Sync,
    D: Fn(Complex64) -> Complex64 + Sync,
{
    pub fn new(value: F, derivative: D) -> Self {
        Self { value, derivative }
    }
}

impl<F, D> ComplexFunction for FunctionPair<F, D>
where
    F: Fn(Complex64) -> Complex64 + Sync,
    D: Fn(Complex64) -> Complex64 + Sync,
{
    fn value(&self, z: Complex64) -> Complex64 {
        (self.value)(z)
    }

    fn derivative(&self, z: Complex64) -> Complex64 {
        (self.derivative)(z)
    }
}

/// f(z) = z³ − 1, whose Newton basins form the classic three-colour fractal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicUnity;

impl ComplexFunction for CubicUnity {
    fn value(&self, z: Complex64) -> Complex64 {
        z * z * z - Complex64::new(1.0, 0.0)
    }

    fn derivative(&self, z: Complex64) -> Complex64 {
        z * z * 3.0
    }
}

/// The three roots of z³ − 1, ordered by argument: 1, e^{2πi/3}, e^{4πi/3}.
pub fn cube_roots_of_unity() -> [Complex64; 3] {
    [
        Complex64::new(1.0, 0.0),
        Complex64::from_polar(1.0, 2.0 * PI / 3.0),
        Complex64::from_polar(1.0, 4.0 * PI / 3.0),
    ]
}

#[cfg(test)]
pub(crate) fn assert_consistent_derivative<F: ComplexFunction>(function: &F, z0: Complex64) {
    // Central differences along the real axis match f'(z) for holomorphic f.
    let h = 1e-6 / (z0.norm() + 1.0).sqrt();
    let step = Complex64::new(h, 0.0);
    let numeric = (function.value(z0 + step) - function.value(z0 - step)) / (2.0 * h);
    let analytic = function.derivative(z0);
    let error = (numeric - analytic).norm();
    assert!(
        error <= 1e-5 * analytic.norm().max(1.0),
        "derivative mismatch at {z0}: numeric {numeric}, analytic {analytic}"
    );
}
