//! Compact transient thermal model of 3D stacked chips.
//!
//! A [`StackDescription`] lists dies, plain layers and microchannel layers
//! bottom to top. The chip footprint is cut into a grid of cells; every cell
//! becomes a node of a thermal RC network. [`ThermalData`] assembles the
//! backward-Euler system of that network as a fixed-pattern sparse matrix
//! and steps it in time.
//!
//! ```ignore
//! let mut stack = ice_core::config::StackConfig::from_json_file(path)?.build()?;
//! let mut tdata = ThermalData::new(&stack, ThermalConfig::default())?;
//! stack.insert_power_value("core_die", "cpu0", 1.5)?;
//! tdata.fill(&mut stack)?;
//! tdata.solve(0.1)?;
//! let t = tdata.max_temperature_of_floorplan_element(&stack, "core_die", "cpu0")?;
//! ```

pub mod channel;
pub mod conductances;
pub mod config;
pub mod die;
pub mod dimensions;
pub mod dump;
pub mod error;
pub mod floorplan;
pub mod heat_sink;
pub mod layer;
pub mod material;
pub mod options;
pub mod solver;
pub mod stack;
pub mod system_matrix;
pub mod thermal_data;

pub use error::{IceError, Result};
pub use options::{ThermalConfig, ThermalOptions};
pub use stack::{StackBuilder, StackDescription, StackElementKind, TopBoundary};
pub use thermal_data::{FillAction, SolverState, ThermalData};
