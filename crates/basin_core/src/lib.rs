//! The `basin_core` crate is the numerical engine behind the basin explorer.
//!
//! Key components:
//! - **Traits**: `ComplexFunction` (f and f'), `ScalarMap` (1-D iterated maps), `Scalar`.
//! - **Newton**: single-point root search and path tracing.
//! - **Classify**: nearest-known-root labelling.
//! - **Grid**: parallel 2-D / 1-D domain sampling on an explicitly owned worker pool.
//! - **Cycles**: period discovery for the logistic map family and bifurcation sweeps.
//! - **Equation Engine**: a small bytecode VM for complex functions given as text.
pub mod classify;
pub mod cycles;
pub mod equation_engine;
pub mod error;
pub mod grid;
pub mod newton;
pub mod traits;

pub use classify::{Label, RootClassifier};
pub use cycles::{
    bifurcation_diagram, find_chaos_cycle, find_cycle, Cycle, CycleSettings, LogisticMap,
};
pub use error::{EngineError, EngineResult};
pub use grid::{
    evaluate_grid, ColoredPoint, GridEvaluator, GridSettings, Interval, Rectangle, WorkerPool,
};
pub use newton::{newton_path, newton_solve, IterationResult, NewtonSettings, NewtonSolver};
pub use num_complex::Complex64;
