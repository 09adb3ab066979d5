//! Periodic-orbit discovery for one-dimensional maps.
//!
//! The search never needs the period in advance: a checkpoint is held while
//! the orbit advances through a window of `L` steps, every step is compared
//! against the checkpoint, and `L` doubles each time the window is exhausted
//! (Brent's scheme with a tolerance instead of exact equality). A candidate
//! period is only accepted after a confirmation lap reproduces every recorded
//! element.

use crate::error::{EngineError, EngineResult};
use crate::grid::{
    sample_interval, Interval, ParameterSample, WorkerPool, DEFAULT_CHUNK_COLUMNS,
};
use crate::traits::{Scalar, ScalarMap};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub const DEFAULT_SEED: f64 = 0.5;
pub const DEFAULT_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
pub const DEFAULT_SWEEP_RESOLUTION: usize = 2000;

/// x ↦ r·x·(1 − x)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticMap<T> {
    pub parameter: T,
}

impl<T: Scalar> LogisticMap<T> {
    pub fn new(parameter: T) -> Self {
        Self { parameter }
    }
}

impl<T: Scalar> ScalarMap<T> for LogisticMap<T> {
    fn apply(&self, x: T) -> T {
        self.parameter * x * (T::one() - x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    pub seed: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl CycleSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.seed.is_finite() {
            return Err(EngineError::InvalidSettings(format!(
                "seed must be finite, got {}.",
                self.seed
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(EngineError::InvalidSettings(format!(
                "tolerance must be positive and finite, got {}.",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::InvalidSettings(
                "max_iterations must be greater than zero.".into(),
            ));
        }
        Ok(())
    }

    fn resolve<T: Scalar>(&self) -> EngineResult<(T, T)> {
        self.validate()?;
        let convert = |value: f64, name: &str| {
            T::from_f64(value).ok_or_else(|| {
                EngineError::InvalidSettings(format!("{name} {value} is not representable."))
            })
        };
        Ok((
            convert(self.seed, "seed")?,
            convert(self.tolerance, "tolerance")?,
        ))
    }
}

/// A verified periodic orbit, or an empty non-converged result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle<T> {
    /// One period of the orbit, in iteration order. Empty unless `converged`.
    pub values: Vec<T>,
    pub converged: bool,
    /// Map applications spent, never more than the budget.
    pub iterations: usize,
}

impl<T> Cycle<T> {
    fn unresolved(iterations: usize) -> Self {
        Self {
            values: Vec::new(),
            converged: false,
            iterations,
        }
    }

    pub fn period(&self) -> usize {
        self.values.len()
    }
}

/// Every value visited by a cycle search, starting with the seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTrace<T> {
    pub series: Vec<T>,
    pub cycle: Cycle<T>,
}

/// Outcome of plain fixed-point iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarIteration<T> {
    pub converged: bool,
    pub value: T,
    pub iterations: usize,
}

/// Bounded map application; `None` once the budget is spent or the orbit
/// leaves the finite numbers.
struct Orbit<'a, M, O> {
    map: &'a M,
    spent: usize,
    budget: usize,
    observe: O,
}

impl<M, O> Orbit<'_, M, O> {
    fn advance<T>(&mut self, x: T) -> Option<T>
    where
        T: Scalar,
        M: ScalarMap<T>,
        O: FnMut(T),
    {
        if self.spent >= self.budget {
            return None;
        }
        self.spent += 1;
        let next = self.map.apply(x);
        if !next.is_finite() {
            trace!(iteration = self.spent, "orbit left the finite range");
            return None;
        }
        (self.observe)(next);
        Some(next)
    }
}

fn search<T, M, O>(
    map: &M,
    seed: T,
    tolerance: T,
    max_iterations: usize,
    mut observe: O,
) -> Cycle<T>
where
    T: Scalar,
    M: ScalarMap<T>,
    O: FnMut(T),
{
    observe(seed);
    let mut orbit = Orbit {
        map,
        spent: 0,
        budget: max_iterations,
        observe,
    };
    let mut current = seed;
    let mut length = 1usize;
    let mut window: Vec<T> = Vec::new();

    loop {
        let checkpoint = current;
        window.clear();
        window.push(checkpoint);

        for lag in 1..=length {
            current = match orbit.advance(current) {
                Some(next) => next,
                None => return Cycle::unresolved(orbit.spent),
            };
            if (current - checkpoint).abs() >= tolerance {
                window.push(current);
                continue;
            }

            // Confirmation lap: replay `lag` steps from the matched point.
            let mut lap = Vec::with_capacity(lag);
            let mut discrepancy = T::zero();
            let mut confirmed = true;
            for expected in &window {
                let gap = (current - *expected).abs();
                if gap >= tolerance {
                    confirmed = false;
                    break;
                }
                discrepancy = discrepancy.max(gap);
                lap.push(current);
                current = match orbit.advance(current) {
                    Some(next) => next,
                    None => return Cycle::unresolved(orbit.spent),
                };
            }
            let closing = match lap.first() {
                Some(first) if confirmed => (current - *first).abs(),
                _ => tolerance,
            };
            if closing < tolerance {
                // With a negative multiplier lag 2p can match before lag p,
                // while the two halves are still further apart than the
                // tolerance.
                let mut lap = settle(&mut orbit, lap, current, discrepancy.max(closing));
                let period = fundamental_period(&lap, tolerance);
                lap.truncate(period);
                return Cycle {
                    values: lap,
                    converged: true,
                    iterations: orbit.spent,
                };
            }
            trace!(lag, iterations = orbit.spent, "candidate cycle rejected");
            break;
        }

        length = length.saturating_mul(2);
    }
}

/// Keeps lapping an accepted cycle while each lap lands strictly closer to
/// the previous one. Stops at the floating-point floor or when the budget
/// runs out, returning the last lap that improved.
fn settle<T, M, O>(
    orbit: &mut Orbit<'_, M, O>,
    mut lap: Vec<T>,
    mut current: T,
    mut discrepancy: T,
) -> Vec<T>
where
    T: Scalar,
    M: ScalarMap<T>,
    O: FnMut(T),
{
    loop {
        let mut next_lap = Vec::with_capacity(lap.len());
        let mut worst = T::zero();
        for expected in &lap {
            worst = worst.max((current - *expected).abs());
            next_lap.push(current);
            current = match orbit.advance(current) {
                Some(next) => next,
                None => return lap,
            };
        }
        if worst >= discrepancy {
            return lap;
        }
        lap = next_lap;
        discrepancy = worst;
    }
}

/// Shortest `p` dividing `lap.len()` such that the lap repeats with period
/// `p` within tolerance.
fn fundamental_period<T: Scalar>(lap: &[T], tolerance: T) -> usize {
    let n = lap.len();
    (1..n)
        .filter(|p| n % p == 0)
        .find(|&p| {
            lap.iter()
                .enumerate()
                .all(|(i, x)| (*x - lap[i % p]).abs() < tolerance)
        })
        .unwrap_or(n)
}

/// Discovers the periodic orbit that the orbit of `settings.seed` settles
/// into, without prior knowledge of its period.
pub fn find_cycle<T, M>(map: &M, settings: &CycleSettings) -> EngineResult<Cycle<T>>
where
    T: Scalar,
    M: ScalarMap<T>,
{
    let (seed, tolerance) = settings.resolve::<T>()?;
    Ok(search(map, seed, tolerance, settings.max_iterations, |_| {}))
}

/// Like [`find_cycle`], also returning every visited value for diagnostics.
/// The series holds at most `max_iterations + 1` values.
pub fn trace_cycle_search<T, M>(map: &M, settings: &CycleSettings) -> EngineResult<CycleTrace<T>>
where
    T: Scalar,
    M: ScalarMap<T>,
{
    let (seed, tolerance) = settings.resolve::<T>()?;
    let mut series = Vec::new();
    let cycle = search(map, seed, tolerance, settings.max_iterations, |x| {
        series.push(x)
    });
    Ok(CycleTrace { series, cycle })
}

/// Fixed-point iteration x ← f(x) until two successive values are closer
/// than the tolerance.
pub fn simple_iteration<T, M>(map: &M, settings: &CycleSettings) -> EngineResult<ScalarIteration<T>>
where
    T: Scalar,
    M: ScalarMap<T>,
{
    let (seed, tolerance) = settings.resolve::<T>()?;
    let mut current = seed;
    let mut iterations = 0usize;

    while iterations < settings.max_iterations {
        let next = map.apply(current);
        iterations += 1;
        if !next.is_finite() {
            break;
        }
        let step = (next - current).abs();
        current = next;
        if step < tolerance {
            return Ok(ScalarIteration {
                converged: true,
                value: current,
                iterations,
            });
        }
    }

    Ok(ScalarIteration {
        converged: false,
        value: current,
        iterations,
    })
}

/// Cycle of the logistic map with parameter `parameter`, seeded at 0.5.
pub fn find_chaos_cycle(
    parameter: f64,
    tolerance: f64,
    max_iterations: usize,
) -> EngineResult<Cycle<f64>> {
    let settings = CycleSettings {
        tolerance,
        max_iterations,
        ..CycleSettings::default()
    };
    find_cycle(&LogisticMap::new(parameter), &settings)
}

/// Bifurcation diagram of the logistic map: the verified cycle for each of
/// `resolution` parameters spread over `interval`. Parameters without a
/// verified cycle carry an empty root list.
pub fn bifurcation_diagram(
    pool: &WorkerPool,
    interval: &Interval,
    resolution: usize,
    settings: &CycleSettings,
) -> EngineResult<Vec<ParameterSample<f64>>> {
    let (seed, tolerance) = settings.resolve::<f64>()?;
    let max_iterations = settings.max_iterations;
    sample_interval(pool, interval, resolution, DEFAULT_CHUNK_COLUMNS, |parameter| {
        search(
            &LogisticMap::new(parameter),
            seed,
            tolerance,
            max_iterations,
            |_| {},
        )
        .values
    })
}
