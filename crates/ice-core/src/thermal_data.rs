//! Transient driver.
//!
//! [`ThermalData`] owns every grid-wide buffer, the system matrix and the
//! linear solver. The caller alternates [`ThermalData::fill`] and
//! [`ThermalData::solve`]; between the two it may change power values or the
//! flow rate on the [`StackDescription`], whose dirty flags decide how much
//! work the next `fill` does:
//!
//! | Condition | Work |
//! |-----------|------|
//! | first fill, flow rate changed, heat sink conductances changed | conductances, capacities, matrix values, refactor, sources |
//! | power values changed, heat sink heat flows | sources and right-hand side only |
//! | nothing | none |

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::conductances::{CellKind, Conductances};
use crate::dimensions::Dimensions;
use crate::dump;
use crate::error::{IceError, Result};
use crate::heat_sink::{HeatSink, HeatSinkUpdate};
use crate::options::ThermalConfig;
use crate::solver::{create_solver, LinearSolver, SolverError};
use crate::stack::{StackDescription, StackElementKind, TopBoundary};
use crate::system_matrix::{CellData, SystemMatrix};

/// Where the driver stands with respect to the linear system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Conductances, capacities and matrix values must all be recomputed
    NeedsFullRebuild,
    /// Matrix values are current but not factored
    NeedsRefactor,
    /// Ready to solve
    Factored,
}

/// What a call to [`ThermalData::fill`] recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAction {
    FullRebuild,
    SourcesRefreshed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    pub full_rebuilds: usize,
    pub source_refreshes: usize,
    pub steps: usize,
}

/// Minimum, average and maximum over a set of cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl TemperatureSummary {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (min, max, sum, count) = values.fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize),
            |(lo, hi, s, n), t| (lo.min(t), hi.max(t), s + t, n + 1),
        );
        (count > 0).then(|| Self {
            min,
            avg: sum / count as f64,
            max,
        })
    }
}

/// Last answer of the heat sink, reapplied on every rebuild or refresh.
#[derive(Debug, Clone, PartialEq)]
enum SinkBoundary {
    None,
    Conductances { top: Vec<f64>, reference_temperature: f64 },
    HeatFlows(Vec<f64>),
}

pub struct ThermalData {
    config: ThermalConfig,
    dims: Dimensions,
    temperatures: Vec<f64>,
    sources: Vec<f64>,
    capacities: Vec<f64>,
    conductances: Vec<Conductances>,
    kinds: Vec<CellKind>,
    matrix: SystemMatrix,
    rhs: Vec<f64>,
    solution: Vec<f64>,
    solver: Box<dyn LinearSolver>,
    state: SolverState,
    heat_sink: Option<Box<dyn HeatSink>>,
    sink_boundary: SinkBoundary,
    time: f64,
    stats: FillStats,
}

impl ThermalData {
    /// Allocate every buffer for `stack` and seed the temperatures.
    pub fn new(stack: &StackDescription, config: ThermalConfig) -> Result<Self> {
        let solver = create_solver(config.solver, stack.dimensions().n_cells());
        Self::with_solver(stack, config, solver)
    }

    /// Same as [`ThermalData::new`] with a caller-provided linear solver;
    /// `config.solver` is ignored.
    pub fn with_solver(
        stack: &StackDescription,
        config: ThermalConfig,
        mut solver: Box<dyn LinearSolver>,
    ) -> Result<Self> {
        if !(config.delta_time > 0.0 && config.delta_time.is_finite()) {
            return Err(IceError::config(format!(
                "time step must be positive, got {}",
                config.delta_time
            )));
        }
        if !config.initial_temperature.is_finite() {
            return Err(IceError::config("initial temperature must be finite"));
        }

        let dims = *stack.dimensions();
        let n = dims.n_cells();
        let matrix = SystemMatrix::new(&dims, config.storage)?;
        let mut kinds = vec![CellKind::Solid; n];
        stack.fill_cell_kinds(&mut kinds)?;

        solver.prepare(n);

        info!(
            cells = n,
            nnz = matrix.nnz(),
            storage = ?config.storage,
            solver = solver.name(),
            delta_time = config.delta_time,
            "thermal data allocated"
        );

        Ok(Self {
            config,
            dims,
            temperatures: vec![config.initial_temperature; n],
            sources: vec![0.0; n],
            capacities: vec![0.0; n],
            conductances: vec![Conductances::default(); n],
            kinds,
            matrix,
            rhs: vec![0.0; n],
            solution: vec![0.0; n],
            solver,
            state: SolverState::NeedsFullRebuild,
            heat_sink: None,
            sink_boundary: SinkBoundary::None,
            time: 0.0,
            stats: FillStats::default(),
        })
    }

    /// Attach a heat sink; the next fill rebuilds the whole system.
    pub fn set_heat_sink(&mut self, heat_sink: Box<dyn HeatSink>) {
        self.heat_sink = Some(heat_sink);
        self.sink_boundary = SinkBoundary::None;
        self.state = SolverState::NeedsFullRebuild;
    }

    pub fn remove_heat_sink(&mut self) -> Option<Box<dyn HeatSink>> {
        self.sink_boundary = SinkBoundary::None;
        self.state = SolverState::NeedsFullRebuild;
        self.heat_sink.take()
    }

    fn check_stack(&self, stack: &StackDescription) -> Result<()> {
        if stack.dimensions().grid != self.dims.grid {
            return Err(IceError::config(
                "stack description does not match the grid of this thermal data",
            ));
        }
        if self.heat_sink.is_some() && stack.top_boundary() != TopBoundary::Adiabatic {
            return Err(IceError::config(
                "a heat sink cannot be combined with an ambient top boundary",
            ));
        }
        Ok(())
    }

    /// Bring matrix, sources and factorization up to date with `stack`.
    pub fn fill(&mut self, stack: &mut StackDescription) -> Result<FillAction> {
        self.check_stack(stack)?;
        let (sink_rebuild, sink_sources) = self.poll_heat_sink()?;

        let action = if self.state == SolverState::NeedsFullRebuild
            || stack.flow_rate_changed()
            || sink_rebuild
        {
            stack.fill_conductances(&mut self.conductances)?;
            self.apply_sink_conductances();
            stack.fill_capacities(self.config.delta_time, &mut self.capacities)?;
            self.matrix.fill(
                &self.dims,
                CellData {
                    conductances: &self.conductances,
                    capacities: &self.capacities,
                    kinds: &self.kinds,
                },
            )?;
            self.state = SolverState::NeedsRefactor;
            self.refresh_sources(stack)?;
            stack.clear_dirty_flags();
            self.stats.full_rebuilds += 1;
            FillAction::FullRebuild
        } else if stack.power_values_changed() || sink_sources {
            self.refresh_sources(stack)?;
            stack.clear_power_flag();
            self.stats.source_refreshes += 1;
            FillAction::SourcesRefreshed
        } else {
            FillAction::Unchanged
        };
        debug!(?action, "fill");

        if self.state != SolverState::Factored {
            let start = Instant::now();
            self.solver.factor(&self.matrix)?;
            self.state = SolverState::Factored;
            debug!(
                solver = self.solver.name(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "system factored"
            );
        }
        Ok(action)
    }

    /// Ask the heat sink for its contribution. Returns whether the matrix
    /// must be rebuilt and whether the sources must be refreshed.
    fn poll_heat_sink(&mut self) -> Result<(bool, bool)> {
        let Some(sink) = self.heat_sink.as_mut() else {
            return Ok((false, false));
        };
        let stride = self.dims.layer_stride();
        let top_start = (self.dims.n_layers() - 1) * stride;
        let update = sink.update(&self.temperatures[top_start..top_start + stride])?;

        let expected = |len: usize| -> Result<()> {
            if len != stride {
                return Err(IceError::config(format!(
                    "heat sink returned {} values for {} top cells",
                    len, stride
                )));
            }
            Ok(())
        };

        match update {
            HeatSinkUpdate::HeatFlows(flows) => {
                expected(flows.len())?;
                // leaving conductance mode: the sink term must go from the matrix too
                let was_conductance = matches!(self.sink_boundary, SinkBoundary::Conductances { .. });
                self.sink_boundary = SinkBoundary::HeatFlows(flows);
                Ok((was_conductance, true))
            }
            HeatSinkUpdate::Conductances {
                top,
                reference_temperature,
                changed,
            } => {
                expected(top.len())?;
                let reference_moved = !matches!(
                    &self.sink_boundary,
                    SinkBoundary::Conductances { reference_temperature: r, .. } if *r == reference_temperature
                );
                let was_conductance = matches!(self.sink_boundary, SinkBoundary::Conductances { .. });
                self.sink_boundary = SinkBoundary::Conductances {
                    top,
                    reference_temperature,
                };
                Ok((changed || !was_conductance, reference_moved))
            }
        }
    }

    fn apply_sink_conductances(&mut self) {
        if let SinkBoundary::Conductances { top, .. } = &self.sink_boundary {
            let start = (self.dims.n_layers() - 1) * self.dims.layer_stride();
            for (cell, g) in self.conductances[start..].iter_mut().zip(top) {
                cell.top = *g;
            }
        }
    }

    fn refresh_sources(&mut self, stack: &StackDescription) -> Result<()> {
        stack.fill_sources(&self.conductances, &mut self.sources)?;

        let start = (self.dims.n_layers() - 1) * self.dims.layer_stride();
        match &self.sink_boundary {
            SinkBoundary::None => {}
            SinkBoundary::Conductances {
                reference_temperature,
                ..
            } => {
                for cell in start..self.sources.len() {
                    self.sources[cell] += reference_temperature * self.conductances[cell].top;
                }
            }
            SinkBoundary::HeatFlows(flows) => {
                for (source, flow) in self.sources[start..].iter_mut().zip(flows) {
                    *source += flow;
                }
            }
        }

        self.update_rhs();
        Ok(())
    }

    /// `rhs = sources + capacities · temperatures`
    fn update_rhs(&mut self) {
        for (((b, s), c), t) in self
            .rhs
            .iter_mut()
            .zip(&self.sources)
            .zip(&self.capacities)
            .zip(&self.temperatures)
        {
            *b = s + c * t;
        }
    }

    /// Advance the simulation by `total_time` seconds, one implicit step of
    /// `delta_time` at a time. Returns the number of steps taken.
    ///
    /// A solver failure stops the loop at once; the temperatures keep the
    /// values of the last completed step.
    pub fn solve(&mut self, total_time: f64) -> Result<usize> {
        if self.state != SolverState::Factored {
            return Err(IceError::Solver(SolverError::NotFactored));
        }
        let steps = step_count(total_time, self.config.delta_time);
        for _ in 0..steps {
            let start = Instant::now();
            self.solution.copy_from_slice(&self.rhs);
            self.solver.solve(&mut self.solution)?;
            self.temperatures.copy_from_slice(&self.solution);
            self.update_rhs();
            self.time += self.config.delta_time;
            self.stats.steps += 1;
            trace!(
                time = self.time,
                elapsed_us = start.elapsed().as_micros() as u64,
                "step"
            );
        }
        Ok(steps)
    }

    /// One step of `delta_time`.
    pub fn solve_step(&mut self) -> Result<()> {
        self.solve(self.config.delta_time).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    /// Row-major within a layer, layers bottom to top.
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    pub fn sources(&self) -> &[f64] {
        &self.sources
    }

    pub fn capacities(&self) -> &[f64] {
        &self.capacities
    }

    pub fn conductances(&self) -> &[Conductances] {
        &self.conductances
    }

    pub fn cell_kinds(&self) -> &[CellKind] {
        &self.kinds
    }

    pub fn system_matrix(&self) -> &SystemMatrix {
        &self.matrix
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn stats(&self) -> FillStats {
        self.stats
    }

    pub fn factor_count(&self) -> usize {
        self.solver.factor_count()
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    /// Simulated time, s.
    pub fn time(&self) -> f64 {
        self.time
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn layer_temperatures(&self, layer: usize) -> &[f64] {
        let stride = self.dims.layer_stride();
        &self.temperatures[layer * stride..(layer + 1) * stride]
    }

    pub fn temperature_of_cell(&self, layer: usize, row: usize, column: usize) -> Result<f64> {
        if !self.dims.contains(layer, row, column) {
            return Err(IceError::CellOutOfRange { layer, row, column });
        }
        Ok(self.temperatures[self.dims.cell_index(layer, row, column)])
    }

    pub fn max_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64> {
        let (die, element) = stack.find_floorplan_element(die_id, element_id)?;
        let layer = self.source_layer(die)?;
        Ok(element.max_temperature(&self.dims, self.layer_temperatures(layer)))
    }

    pub fn min_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64> {
        let (die, element) = stack.find_floorplan_element(die_id, element_id)?;
        let layer = self.source_layer(die)?;
        Ok(element.min_temperature(&self.dims, self.layer_temperatures(layer)))
    }

    pub fn avg_temperature_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<f64> {
        let (die, element) = stack.find_floorplan_element(die_id, element_id)?;
        let layer = self.source_layer(die)?;
        Ok(element.avg_temperature(&self.dims, self.layer_temperatures(layer)))
    }

    pub fn min_avg_max_temperatures_of_floorplan_element(
        &self,
        stack: &StackDescription,
        die_id: &str,
        element_id: &str,
    ) -> Result<TemperatureSummary> {
        let (die, element) = stack.find_floorplan_element(die_id, element_id)?;
        let layer = self.layer_temperatures(self.source_layer(die)?);
        Ok(TemperatureSummary {
            min: element.min_temperature(&self.dims, layer),
            avg: element.avg_temperature(&self.dims, layer),
            max: element.max_temperature(&self.dims, layer),
        })
    }

    /// Maximum of every element of the die's floorplan, in floorplan order.
    pub fn all_max_temperatures_of_floorplan(
        &self,
        stack: &StackDescription,
        die_id: &str,
    ) -> Result<Vec<f64>> {
        let (element, die) = stack.find_die(die_id)?;
        let layer = self.layer_temperatures(self.source_layer(element)?);
        Ok(die
            .floorplan
            .elements()
            .iter()
            .map(|fe| fe.max_temperature(&self.dims, layer))
            .collect())
    }

    /// Summary over every cell covered by the die's floorplan.
    pub fn min_avg_max_temperatures_of_floorplan(
        &self,
        stack: &StackDescription,
        die_id: &str,
    ) -> Result<TemperatureSummary> {
        let (element, die) = stack.find_die(die_id)?;
        let layer = self.layer_temperatures(self.source_layer(element)?);
        let dims = &self.dims;
        TemperatureSummary::of(
            die.floorplan
                .elements()
                .iter()
                .filter_map(|fe| fe.span())
                .flat_map(|span| span.cells().collect::<Vec<_>>())
                .map(|(row, column)| layer[dims.cell_index_in_layer(row, column)]),
        )
        .ok_or_else(|| IceError::EmptyFloorplan {
            id: die_id.to_string(),
        })
    }

    /// Temperature of the coolant leaving channel number `outlet` (0-based,
    /// counting liquid columns west to east) of a channel element.
    pub fn temperature_of_channel_outlet(
        &self,
        stack: &StackDescription,
        channel_id: &str,
        outlet: usize,
    ) -> Result<f64> {
        let element = stack.find_element(channel_id)?;
        let column = outlet
            .checked_mul(2)
            .and_then(|c| c.checked_add(1))
            .filter(|&c| c < self.dims.n_columns());
        let column = match (&element.kind, column) {
            (StackElementKind::Channel, Some(column)) => column,
            _ => {
                return Err(IceError::NoSuchChannelOutlet {
                    id: channel_id.to_string(),
                    outlet,
                })
            }
        };
        let row = self.dims.n_rows() - 1;
        Ok(self.temperatures[self.dims.cell_index(element.layers_offset, row, column)])
    }

    fn source_layer(&self, element: &crate::stack::StackElement) -> Result<usize> {
        element.source_layer_index().ok_or_else(|| IceError::NotADie {
            id: element.id.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Debug dumps
    // ------------------------------------------------------------------

    pub fn dump_sources<W: Write>(&self, out: &mut W, precision: usize) -> std::io::Result<()> {
        dump::write_values(out, &self.sources, precision)
    }

    pub fn dump_temperatures<W: Write>(&self, out: &mut W, precision: usize) -> std::io::Result<()> {
        dump::write_values(out, &self.temperatures, precision)
    }

    /// Write `offsets.txt`, `indices.txt`, `values.txt` and `sources.txt`
    /// into `dir`, creating it if needed.
    pub fn dump_to_dir(&self, dir: &Path, precision: usize) -> Result<()> {
        fs::create_dir_all(dir)?;
        dump::write_indices_file(&dir.join("offsets.txt"), self.matrix.offsets())?;
        dump::write_indices_file(&dir.join("indices.txt"), self.matrix.indices())?;
        dump::write_values_file(&dir.join("values.txt"), self.matrix.values(), precision)?;
        dump::write_values_file(&dir.join("sources.txt"), &self.sources, precision)?;
        info!(dir = %dir.display(), "system dumped");
        Ok(())
    }
}

fn step_count(total_time: f64, delta_time: f64) -> usize {
    if total_time <= 0.0 {
        return 0;
    }
    ((total_time / delta_time) - 1e-9).ceil().max(1.0) as usize
}
