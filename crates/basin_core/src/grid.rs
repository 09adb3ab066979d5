//! Parallel domain sampling.
//!
//! A sweep is validated up front, split into column chunks, and each chunk is
//! evaluated on its own worker with no shared mutable state. Workers return
//! their local batches and the batches are concatenated after the join, so
//! the result holds exactly one entry per sampled coordinate for any pool
//! size. A point whose function call panics is marked unclassified on its
//! own; the rest of its chunk is unaffected.

use crate::classify::{Label, RootClassifier};
use crate::error::{EngineError, EngineResult};
use crate::newton::{find_root, NewtonSettings};
use crate::traits::{ComplexFunction, FunctionPair};
use num_complex::Complex64;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_CHUNK_COLUMNS: usize = 20;

/// Axis-aligned region of the complex plane, `min` and `max` in
/// lexicographic order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub min: Complex64,
    pub max: Complex64,
}

impl Rectangle {
    pub fn new(min: Complex64, max: Complex64) -> Self {
        Self { min, max }
    }

    /// Square of half-width `radius` centred on the origin.
    pub fn centered(radius: f64) -> Self {
        Self::new(
            Complex64::new(-radius, -radius),
            Complex64::new(radius, radius),
        )
    }

    pub fn width(&self) -> f64 {
        self.max.re - self.min.re
    }

    pub fn height(&self) -> f64 {
        self.max.im - self.min.im
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(EngineError::InvalidDomain(format!(
                "rectangle corners must be finite, got {} and {}.",
                self.min, self.max
            )));
        }
        if !(self.width().is_finite() && self.height().is_finite()) {
            return Err(EngineError::InvalidDomain(format!(
                "rectangle from {} to {} is wider than the finite range.",
                self.min, self.max
            )));
        }
        let ordered = self.min.re < self.max.re
            || (self.min.re == self.max.re && self.min.im <= self.max.im);
        if !ordered {
            return Err(EngineError::InvalidDomain(format!(
                "rectangle corners {} and {} are not in lexicographic order.",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Closed-open parameter range `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(EngineError::InvalidDomain(format!(
                "interval bounds must be finite, got [{}, {}].",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(EngineError::InvalidDomain(format!(
                "interval minimum {} exceeds maximum {}.",
                self.min, self.max
            )));
        }
        if !self.length().is_finite() {
            return Err(EngineError::InvalidDomain(format!(
                "interval [{}, {}] is longer than the finite range.",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// One classified sample of a 2-D sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint {
    pub coordinate: Complex64,
    pub label: Label,
}

/// One sample of a 1-D sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSample<T> {
    pub parameter: f64,
    pub roots: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Grid columns handed to a worker as one task.
    pub chunk_columns: usize,
    pub max_iterations: usize,
    /// Used only when both axes of the rectangle are degenerate; otherwise
    /// the accuracy is half the smaller grid step.
    pub accuracy: f64,
    /// `None` means one worker per hardware thread.
    pub worker_pool_size: Option<usize>,
}

impl Default for GridSettings {
    fn default() -> Self {
        let newton = NewtonSettings::default();
        Self {
            chunk_columns: DEFAULT_CHUNK_COLUMNS,
            max_iterations: newton.max_iterations,
            accuracy: newton.accuracy,
            worker_pool_size: None,
        }
    }
}

impl GridSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.chunk_columns == 0 {
            return Err(EngineError::InvalidSettings(
                "chunk_columns must be greater than zero.".into(),
            ));
        }
        if self.worker_pool_size == Some(0) {
            return Err(EngineError::InvalidSettings(
                "worker_pool_size must be greater than zero.".into(),
            ));
        }
        NewtonSettings {
            max_iterations: self.max_iterations,
            accuracy: self.accuracy,
        }
        .validate()
    }
}

/// Explicitly owned worker pool. Dropping it (or calling
/// [`shutdown`](Self::shutdown)) stops its threads.
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl WorkerPool {
    pub fn new(size: Option<usize>) -> EngineResult<Self> {
        let size = size.unwrap_or_else(Self::hardware_concurrency);
        if size == 0 {
            return Err(EngineError::InvalidSettings(
                "worker_pool_size must be greater than zero.".into(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("basin-worker-{index}"))
            .build()
            .map_err(|err| EngineError::WorkerPool(err.to_string()))?;
        debug!(size, "worker pool started");
        Ok(Self { pool, size })
    }

    pub fn hardware_concurrency() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `op` inside the pool and blocks until it and every task it
    /// spawned have finished.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn shutdown(self) {
        debug!(size = self.size, "worker pool shut down");
    }
}

/// Sample positions of a validated rectangle.
#[derive(Debug, Clone, Copy)]
struct Lattice {
    origin: Complex64,
    step_x: f64,
    step_y: f64,
    columns: usize,
    rows: usize,
}

impl Lattice {
    fn new(rect: &Rectangle, columns: usize, rows: usize) -> EngineResult<Self> {
        rect.validate()?;
        if columns == 0 || rows == 0 {
            return Err(EngineError::InvalidDomain(format!(
                "resolution must be positive on both axes, got {columns}x{rows}."
            )));
        }
        let step_x = rect.width() / columns as f64;
        let step_y = rect.height() / rows as f64;
        // A zero step would put several samples on one coordinate.
        if (columns > 1 && step_x == 0.0) || (rows > 1 && step_y == 0.0) {
            return Err(EngineError::InvalidDomain(format!(
                "a zero-extent axis holds a single sample, got {columns}x{rows} over {} to {}.",
                rect.min, rect.max
            )));
        }
        Ok(Self {
            origin: rect.min,
            step_x,
            step_y,
            columns,
            rows,
        })
    }

    fn point(&self, column: usize, row: usize) -> Complex64 {
        Complex64::new(
            self.origin.re + column as f64 * self.step_x,
            self.origin.im + row as f64 * self.step_y,
        )
    }

    /// Half the smaller non-degenerate step, so neighbouring samples can never
    /// be merged by the convergence test.
    fn accuracy(&self, fallback: f64) -> f64 {
        [self.step_x.abs(), self.step_y.abs()]
            .into_iter()
            .filter(|step| *step > 0.0)
            .reduce(f64::min)
            .map_or(fallback, |step| step / 2.0)
    }

    fn len(&self) -> usize {
        self.columns * self.rows
    }
}

fn chunk_ranges(len: usize, width: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(width)
        .map(|start| start..(start + width).min(len))
        .collect()
}

fn panic_payload_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Newton basin sampler over a fixed function and known-root set.
#[derive(Debug)]
pub struct GridEvaluator<F> {
    function: F,
    classifier: RootClassifier,
    settings: GridSettings,
    pool: Arc<WorkerPool>,
}

impl<F: ComplexFunction> GridEvaluator<F> {
    /// Builds an evaluator that owns a fresh pool sized by
    /// `settings.worker_pool_size`.
    pub fn new(
        function: F,
        known_roots: Vec<Complex64>,
        settings: GridSettings,
    ) -> EngineResult<Self> {
        settings.validate()?;
        let pool = WorkerPool::new(settings.worker_pool_size)?;
        Self::with_pool(function, known_roots, settings, Arc::new(pool))
    }

    /// Builds an evaluator on an existing pool.
    pub fn with_pool(
        function: F,
        known_roots: Vec<Complex64>,
        settings: GridSettings,
        pool: Arc<WorkerPool>,
    ) -> EngineResult<Self> {
        settings.validate()?;
        let classifier = RootClassifier::new(known_roots)?;
        Ok(Self {
            function,
            classifier,
            settings,
            pool,
        })
    }

    pub fn classifier(&self) -> &RootClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> GridSettings {
        self.settings
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Classifies every point of a `resolution_x × resolution_y` lattice
    /// anchored at `rect.min`. Entry order is unspecified.
    pub fn evaluate(
        &self,
        rect: &Rectangle,
        resolution_x: usize,
        resolution_y: usize,
    ) -> EngineResult<Vec<ColoredPoint>> {
        let lattice = Lattice::new(rect, resolution_x, resolution_y)?;
        let accuracy = lattice.accuracy(self.settings.accuracy);
        let chunks = chunk_ranges(lattice.columns, self.settings.chunk_columns);
        debug!(
            resolution_x,
            resolution_y,
            step_x = lattice.step_x,
            step_y = lattice.step_y,
            accuracy,
            chunks = chunks.len(),
            workers = self.pool.size(),
            "evaluating grid"
        );

        let batches: Vec<Vec<ColoredPoint>> = self.pool.install(|| {
            chunks
                .into_par_iter()
                .map(|columns| self.evaluate_chunk(&lattice, columns, accuracy))
                .collect()
        });

        let mut points = Vec::with_capacity(lattice.len());
        for batch in batches {
            points.extend(batch);
        }
        debug_assert_eq!(points.len(), lattice.len());
        Ok(points)
    }

    fn evaluate_chunk(
        &self,
        lattice: &Lattice,
        columns: Range<usize>,
        accuracy: f64,
    ) -> Vec<ColoredPoint> {
        let mut batch = Vec::with_capacity(columns.len() * lattice.rows);
        let mut failures = 0usize;
        let mut last_failure = None;
        for column in columns.clone() {
            for row in 0..lattice.rows {
                let coordinate = lattice.point(column, row);
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    find_root(
                        &self.function,
                        coordinate,
                        self.settings.max_iterations,
                        accuracy,
                    )
                }));
                let label = match outcome {
                    Ok(result) => self.classifier.label_for(&result),
                    Err(payload) => {
                        failures += 1;
                        last_failure = Some(panic_payload_to_string(payload));
                        Label::Unclassified
                    }
                };
                batch.push(ColoredPoint { coordinate, label });
            }
        }

        if let Some(reason) = last_failure {
            warn!(
                columns = ?columns,
                failures,
                reason = %reason,
                "function panicked; affected points left unclassified"
            );
        }
        batch
    }

    pub fn shutdown(self) {
        if let Ok(pool) = Arc::try_unwrap(self.pool) {
            pool.shutdown();
        }
    }
}

/// Samples `resolution` evenly spaced parameters of `[min, max)` and runs
/// `kernel` on each, in chunks of `chunk_width` parameters per task.
///
/// A parameter whose kernel panics gets an empty root list.
pub fn sample_interval<T, K>(
    pool: &WorkerPool,
    interval: &Interval,
    resolution: usize,
    chunk_width: usize,
    kernel: K,
) -> EngineResult<Vec<ParameterSample<T>>>
where
    T: Send,
    K: Fn(f64) -> Vec<T> + Sync,
{
    interval.validate()?;
    if resolution == 0 {
        return Err(EngineError::InvalidDomain(
            "resolution must be positive.".into(),
        ));
    }
    if chunk_width == 0 {
        return Err(EngineError::InvalidSettings(
            "chunk width must be greater than zero.".into(),
        ));
    }

    let step = interval.length() / resolution as f64;
    if resolution > 1 && step == 0.0 {
        return Err(EngineError::InvalidDomain(format!(
            "a zero-length interval holds a single sample, got {resolution}."
        )));
    }
    let parameter = |index: usize| interval.min + index as f64 * step;
    let chunks = chunk_ranges(resolution, chunk_width);
    debug!(
        resolution,
        step,
        chunks = chunks.len(),
        workers = pool.size(),
        "evaluating interval"
    );

    let batches: Vec<Vec<ParameterSample<T>>> = pool.install(|| {
        chunks
            .into_par_iter()
            .map(|indices| {
                let mut failures = 0usize;
                let mut last_failure = None;
                let batch = indices
                    .clone()
                    .map(|index| {
                        let parameter = parameter(index);
                        let roots = match catch_unwind(AssertUnwindSafe(|| kernel(parameter))) {
                            Ok(roots) => roots,
                            Err(payload) => {
                                failures += 1;
                                last_failure = Some(panic_payload_to_string(payload));
                                Vec::new()
                            }
                        };
                        ParameterSample { parameter, roots }
                    })
                    .collect::<Vec<_>>();
                if let Some(reason) = last_failure {
                    warn!(
                        indices = ?indices,
                        failures,
                        reason = %reason,
                        "kernel panicked; affected samples carry no roots"
                    );
                }
                batch
            })
            .collect()
    });

    Ok(batches.into_iter().flatten().collect())
}

/// Closure-based entry point: classify a `resolution_x × resolution_y` grid
/// over `rect` against `known_roots`, on a pool sized to the hardware.
pub fn evaluate_grid<Fv, Fd>(
    rect: &Rectangle,
    resolution_x: usize,
    resolution_y: usize,
    f: Fv,
    df: Fd,
    known_roots: Vec<Complex64>,
) -> EngineResult<Vec<ColoredPoint>>
where
    Fv: Fn(Complex64) -> Complex64 + Sync,
    Fd: Fn(Complex64) -> Complex64 + Sync,
{
    Lattice::new(rect, resolution_x, resolution_y)?;
    let evaluator = GridEvaluator::new(
        FunctionPair::new(f, df),
        known_roots,
        GridSettings::default(),
    )?;
    let points = evaluator.evaluate(rect, resolution_x, resolution_y)?;
    evaluator.shutdown();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{cube_roots_of_unity, CubicUnity};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings_with_pool(size: usize) -> GridSettings {
        GridSettings {
            worker_pool_size: Some(size),
            ..GridSettings::default()
        }
    }

    fn coordinate_set(points: &[ColoredPoint]) -> HashSet<(u64, u64)> {
        points
            .iter()
            .map(|p| (p.coordinate.re.to_bits(), p.coordinate.im.to_bits()))
            .collect()
    }

    #[test]
    fn rectangle_validation_follows_lexicographic_order() {
        let ok = Rectangle::new(Complex64::new(0.0, 1.0), Complex64::new(1.0, 0.0));
        assert!(ok.validate().is_ok());
        let same_column = Rectangle::new(Complex64::new(0.0, 0.0), Complex64::new(0.0, 1.0));
        assert!(same_column.validate().is_ok());

        let swapped = Rectangle::new(Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0));
        assert!(matches!(swapped.validate(), Err(EngineError::InvalidDomain(_))));
        let same_column_down = Rectangle::new(Complex64::new(0.0, 1.0), Complex64::new(0.0, 0.0));
        assert!(matches!(
            same_column_down.validate(),
            Err(EngineError::InvalidDomain(_))
        ));
        let nan = Rectangle::new(Complex64::new(f64::NAN, 0.0), Complex64::new(1.0, 1.0));
        assert!(matches!(nan.validate(), Err(EngineError::InvalidDomain(_))));
    }

    #[test]
    fn extent_beyond_the_finite_range_is_rejected() {
        let huge = Rectangle::new(
            Complex64::new(-1e308, -1e308),
            Complex64::new(1e308, 1e308),
        );
        assert!(huge.width().is_infinite());
        assert!(matches!(huge.validate(), Err(EngineError::InvalidDomain(_))));

        let calls = AtomicUsize::new(0);
        let function = FunctionPair::new(
            |z: Complex64| {
                calls.fetch_add(1, Ordering::Relaxed);
                z
            },
            |_| Complex64::new(1.0, 0.0),
        );
        let evaluator = GridEvaluator::new(function, vec![Complex64::new(0.0, 0.0)], settings_with_pool(2))
            .expect("evaluator builds");
        let err = evaluator.evaluate(&huge, 3, 3).expect_err("overflowing extent");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let tall = Rectangle::new(Complex64::new(0.0, -1e308), Complex64::new(1.0, 1e308));
        assert!(matches!(tall.validate(), Err(EngineError::InvalidDomain(_))));
    }

    #[test]
    fn interval_longer_than_the_finite_range_is_rejected() {
        let huge = Interval::new(-1e308, 1e308);
        assert!(huge.length().is_infinite());
        assert!(matches!(huge.validate(), Err(EngineError::InvalidDomain(_))));

        let pool = WorkerPool::new(Some(1)).expect("pool starts");
        let err = sample_interval(&pool, &huge, 4, 2, |p| vec![p]).expect_err("overflowing length");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
    }

    #[test]
    fn zero_extent_axis_takes_a_single_sample() {
        let line = Rectangle::new(Complex64::new(0.5, -1.0), Complex64::new(0.5, 1.0));
        let err = Lattice::new(&line, 5, 4).expect_err("duplicate columns");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
        assert!(err.to_string().contains("single sample"));

        let evaluator = GridEvaluator::new(CubicUnity, cube_roots_of_unity().to_vec(), settings_with_pool(2))
            .expect("evaluator builds");
        let points = evaluator.evaluate(&line, 1, 4).expect("one column is fine");
        assert_eq!(points.len(), 4);
        assert_eq!(coordinate_set(&points).len(), 4);

        let pool = WorkerPool::new(Some(1)).expect("pool starts");
        let err = sample_interval(&pool, &Interval::new(3.0, 3.0), 5, 2, |p| vec![p])
            .expect_err("duplicate parameters");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
        let samples = sample_interval(&pool, &Interval::new(3.0, 3.0), 1, 2, |p| vec![p])
            .expect("single parameter");
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn accuracy_is_half_the_smaller_step() {
        let rect = Rectangle::new(Complex64::new(-1.0, -1.0), Complex64::new(1.0, 3.0));
        let lattice = Lattice::new(&rect, 20, 10).expect("valid lattice");
        assert!((lattice.accuracy(1e-4) - 0.05).abs() < 1e-15);

        let line = Rectangle::new(Complex64::new(0.0, -1.0), Complex64::new(0.0, 1.0));
        let lattice = Lattice::new(&line, 1, 8).expect("valid lattice");
        assert!((lattice.accuracy(1e-4) - 0.125).abs() < 1e-15);

        let point = Rectangle::new(Complex64::new(0.5, 0.5), Complex64::new(0.5, 0.5));
        let lattice = Lattice::new(&point, 1, 1).expect("valid lattice");
        assert_eq!(lattice.accuracy(1e-4), 1e-4);
    }

    #[test]
    fn chunk_ranges_cover_every_column_once() {
        let ranges = chunk_ranges(45, 20);
        assert_eq!(ranges, vec![0..20, 20..40, 40..45]);
        assert!(chunk_ranges(0, 20).is_empty());
    }

    #[test]
    fn grid_count_and_coordinates_do_not_depend_on_pool_size() {
        let rect = Rectangle::centered(2.0);
        let single = GridEvaluator::new(CubicUnity, cube_roots_of_unity().to_vec(), settings_with_pool(1))
            .expect("evaluator builds");
        let many = GridEvaluator::new(CubicUnity, cube_roots_of_unity().to_vec(), settings_with_pool(4))
            .expect("evaluator builds");

        let a = single.evaluate(&rect, 50, 50).expect("grid evaluates");
        let b = many.evaluate(&rect, 50, 50).expect("grid evaluates");
        assert_eq!(a.len(), 2500);
        assert_eq!(b.len(), 2500);

        let set_a = coordinate_set(&a);
        assert_eq!(set_a.len(), 2500);
        assert_eq!(set_a, coordinate_set(&b));
    }

    #[test]
    fn points_next_to_roots_get_their_labels() {
        let evaluator = GridEvaluator::new(CubicUnity, cube_roots_of_unity().to_vec(), settings_with_pool(2))
            .expect("evaluator builds");
        let rect = Rectangle::new(Complex64::new(0.9, -0.1), Complex64::new(1.1, 0.1));
        let points = evaluator.evaluate(&rect, 8, 8).expect("grid evaluates");
        assert!(points.iter().all(|p| p.label == Label::Root(0)));
    }

    #[test]
    fn invalid_domain_runs_no_evaluations() {
        let calls = AtomicUsize::new(0);
        let function = FunctionPair::new(
            |z: Complex64| {
                calls.fetch_add(1, Ordering::Relaxed);
                z * z * z - 1.0
            },
            |z: Complex64| z * z * 3.0,
        );
        let evaluator = GridEvaluator::new(function, cube_roots_of_unity().to_vec(), settings_with_pool(2))
            .expect("evaluator builds");

        let backwards = Rectangle::new(Complex64::new(1.0, -1.0), Complex64::new(-1.0, 1.0));
        let err = evaluator
            .evaluate(&backwards, 10, 10)
            .expect_err("backwards rectangle must fail");
        assert!(matches!(err, EngineError::InvalidDomain(_)));

        let err = evaluator
            .evaluate(&Rectangle::centered(1.0), 0, 10)
            .expect_err("zero resolution must fail");
        assert!(err.to_string().contains("resolution"));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panicking_points_are_marked_unclassified_alone() {
        // Newton on z − c lands on c after one step, so only seeds with
        // re > 0.5 ever evaluate the panicking branch. All ten columns share
        // one chunk.
        let target = Complex64::new(-0.5, 0.0);
        let function = FunctionPair::new(
            move |z: Complex64| {
                if z.re > 0.5 {
                    panic!("outside supported region");
                }
                z - target
            },
            |_| Complex64::new(1.0, 0.0),
        );
        let settings = GridSettings {
            chunk_columns: DEFAULT_CHUNK_COLUMNS,
            ..settings_with_pool(2)
        };
        let evaluator =
            GridEvaluator::new(function, vec![target], settings).expect("evaluator builds");

        let points = evaluator
            .evaluate(&Rectangle::centered(1.0), 10, 10)
            .expect("grid evaluates despite the panic");
        assert_eq!(points.len(), 100);
        assert_eq!(coordinate_set(&points).len(), 100);
        for point in &points {
            let expected = if point.coordinate.re > 0.5 {
                Label::Unclassified
            } else {
                Label::Root(0)
            };
            assert_eq!(point.label, expected, "at {}", point.coordinate);
        }
    }

    #[test]
    fn settings_validation() {
        let err = GridEvaluator::new(
            CubicUnity,
            cube_roots_of_unity().to_vec(),
            GridSettings {
                chunk_columns: 0,
                ..GridSettings::default()
            },
        )
        .expect_err("zero chunk width");
        assert!(err.to_string().contains("chunk_columns"));

        let err = WorkerPool::new(Some(0)).expect_err("zero workers");
        assert!(err.to_string().contains("worker_pool_size"));

        let err = GridEvaluator::new(CubicUnity, Vec::new(), GridSettings::default())
            .expect_err("no roots");
        assert!(err.to_string().contains("known-root set"));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: GridSettings =
            serde_json::from_str(r#"{"chunk_columns": 5}"#).expect("partial config parses");
        assert_eq!(settings.chunk_columns, 5);
        assert_eq!(settings.max_iterations, 1000);
        assert_eq!(settings.worker_pool_size, None);
    }

    #[test]
    fn interval_sampling_counts_and_recovers_from_panics() {
        let pool = WorkerPool::new(Some(3)).expect("pool starts");
        let interval = Interval::new(0.0, 1.0);
        // One chunk holds every sample.
        let samples = sample_interval(&pool, &interval, 10, 10, |p| {
            if p > 0.85 {
                panic!("too large");
            }
            vec![p * 2.0]
        })
        .expect("interval evaluates");

        assert_eq!(samples.len(), 10);
        let mut parameters: Vec<f64> = samples.iter().map(|s| s.parameter).collect();
        parameters.sort_by(f64::total_cmp);
        assert_eq!(parameters[0], 0.0);
        assert!((parameters[9] - 0.9).abs() < 1e-12);
        for sample in &samples {
            if sample.parameter > 0.85 {
                assert!(sample.roots.is_empty());
            } else {
                assert_eq!(sample.roots, vec![sample.parameter * 2.0]);
            }
        }

        let err = sample_interval(&pool, &Interval::new(1.0, 0.0), 10, 3, |_| vec![0.0])
            .expect_err("reversed interval");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
        pool.shutdown();
    }

    #[test]
    fn closure_entry_point_matches_evaluator() {
        let points = evaluate_grid(
            &Rectangle::centered(1.5),
            12,
            9,
            |z| z * z * z - 1.0,
            |z| z * z * 3.0,
            cube_roots_of_unity().to_vec(),
        )
        .expect("grid evaluates");
        assert_eq!(points.len(), 108);

        let err = evaluate_grid(
            &Rectangle::new(Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)),
            12,
            9,
            |z| z,
            |_| Complex64::new(1.0, 0.0),
            vec![Complex64::new(0.0, 0.0)],
        )
        .expect_err("reversed rectangle");
        assert!(matches!(err, EngineError::InvalidDomain(_)));
    }
}
