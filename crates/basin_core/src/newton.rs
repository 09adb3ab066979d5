use crate::error::{EngineError, EngineResult};
use crate::traits::{ComplexFunction, FunctionPair};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCURACY: f64 = 1e-4;
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_iterations: usize,
    pub accuracy: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            accuracy: DEFAULT_ACCURACY,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_iterations == 0 {
            return Err(EngineError::InvalidSettings(
                "max_iterations must be greater than zero.".into(),
            ));
        }
        if !(self.accuracy.is_finite() && self.accuracy > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "accuracy must be positive and finite, got {}.",
                self.accuracy
            )));
        }
        Ok(())
    }
}

/// Outcome of a single root search.
///
/// `iterations` counts Newton updates actually performed and never exceeds
/// the configured budget. When `converged` is false, `value` is the last
/// finite point reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub converged: bool,
    pub value: Complex64,
    pub iterations: usize,
}

/// Outcome of one Newton update.
enum Step {
    Next(Complex64),
    Unstable,
}

#[inline]
fn newton_step<F: ComplexFunction>(function: &F, z: Complex64) -> Step {
    let slope = function.derivative(z);
    if !slope.is_finite() || slope.norm_sqr() == 0.0 {
        return Step::Unstable;
    }
    let next = z - function.value(z) / slope;
    if next.is_finite() {
        Step::Next(next)
    } else {
        Step::Unstable
    }
}

/// Newton-Raphson root finder bound to one function/derivative pair.
#[derive(Debug, Clone)]
pub struct NewtonSolver<F> {
    function: F,
    settings: NewtonSettings,
}

impl<F: ComplexFunction> NewtonSolver<F> {
    pub fn new(function: F, settings: NewtonSettings) -> EngineResult<Self> {
        settings.validate()?;
        Ok(Self { function, settings })
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    pub fn settings(&self) -> NewtonSettings {
        self.settings
    }

    pub fn set_accuracy(&mut self, accuracy: f64) -> EngineResult<()> {
        let settings = NewtonSettings {
            accuracy,
            ..self.settings
        };
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn find_root(&self, seed: Complex64) -> IterationResult {
        find_root(
            &self.function,
            seed,
            self.settings.max_iterations,
            self.settings.accuracy,
        )
    }

    pub fn find_path(&self, seed: Complex64) -> Vec<Complex64> {
        find_path(
            &self.function,
            seed,
            self.settings.max_iterations,
            self.settings.accuracy,
        )
    }
}

/// Iterates z ← z − f(z)/f'(z) until two successive points are closer than
/// `accuracy` or `max_iterations` updates have been spent.
pub fn find_root<F: ComplexFunction>(
    function: &F,
    seed: Complex64,
    max_iterations: usize,
    accuracy: f64,
) -> IterationResult {
    let mut current = seed;
    let mut iterations = 0usize;

    while iterations < max_iterations {
        let next = match newton_step(function, current) {
            Step::Next(next) => next,
            Step::Unstable => {
                return IterationResult {
                    converged: false,
                    value: current,
                    iterations,
                }
            }
        };
        iterations += 1;

        if (next - current).norm() < accuracy {
            return IterationResult {
                converged: true,
                value: next,
                iterations,
            };
        }
        current = next;
    }

    IterationResult {
        converged: false,
        value: current,
        iterations,
    }
}

/// Same recurrence as [`find_root`], recording every visited point.
///
/// The path starts with `seed` and ends with either the converged root or the
/// last finite point; it holds at most `max_iterations + 1` entries.
pub fn find_path<F: ComplexFunction>(
    function: &F,
    seed: Complex64,
    max_iterations: usize,
    accuracy: f64,
) -> Vec<Complex64> {
    let mut path = Vec::with_capacity(max_iterations.min(64) + 1);
    path.push(seed);
    let mut current = seed;

    for _ in 0..max_iterations {
        let next = match newton_step(function, current) {
            Step::Next(next) => next,
            Step::Unstable => break,
        };
        path.push(next);
        if (next - current).norm() < accuracy {
            break;
        }
        current = next;
    }

    path
}

/// Closure-based entry point: solve from `seed` with `f` and its derivative `df`.
pub fn newton_solve<F, D>(
    seed: Complex64,
    f: F,
    df: D,
    accuracy: f64,
    max_iterations: usize,
) -> IterationResult
where
    F: Fn(Complex64) -> Complex64 + Sync,
    D: Fn(Complex64) -> Complex64 + Sync,
{
    find_root(&FunctionPair::new(f, df), seed, max_iterations, accuracy)
}

/// Closure-based entry point for path tracing.
pub fn newton_path<F, D>(
    seed: Complex64,
    f: F,
    df: D,
    accuracy: f64,
    max_iterations: usize,
) -> Vec<Complex64>
where
    F: Fn(Complex64) -> Complex64 + Sync,
    D: Fn(Complex64) -> Complex64 + Sync,
{
    find_path(&FunctionPair::new(f, df), seed, max_iterations, accuracy)
}
