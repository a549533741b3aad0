pub mod dat;
pub mod error;
pub mod grid;
pub mod results;
pub mod slurm;
pub mod sweep;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HplTuneError, Result};
use crate::grid::{find_grid, GridShape};
use crate::sweep::{baseline_problem_size, sweep_points, SweepPoint};

/// file name the sweep plan is persisted under, inside the tree root
pub const PLAN_FILE_NAME: &str = "plan";


/// shape of the cluster the sweep is planned for
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub nodes: usize,
    pub cores_per_node: usize,
    pub mem_per_node_gib: f64,
}

impl ClusterSpec {
    pub fn new(nodes: usize, cores_per_node: usize, mem_per_node_gib: f64) -> Result<Self> {
        if nodes < 1 {
            return Err(HplTuneError::InvalidInput(
                "node count must be positive".to_string(),
            ));
        }
        if cores_per_node < 1 {
            return Err(HplTuneError::InvalidInput(
                "cores per node must be positive".to_string(),
            ));
        }
        if !(mem_per_node_gib > 0.0) {
            return Err(HplTuneError::InvalidInput(
                "memory per node must be positive".to_string(),
            ));
        }
        Ok(Self {
            nodes,
            cores_per_node,
            mem_per_node_gib,
        })
    }

    pub fn total_cores(&self) -> usize {
        self.nodes * self.cores_per_node
    }
}

/// one benchmark run: a sweep point pinned to the process grid, with the
/// directory name that keys its results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub point: SweepPoint,
    pub grid: GridShape,
    pub dir_name: String,
}

impl RunConfig {
    fn new(point: SweepPoint, grid: GridShape) -> Self {
        let dir_name = format!("NB{}_N{}_P{}_Q{}", point.nb, point.n, grid.p, grid.q);
        Self {
            point,
            grid,
            dir_name,
        }
    }
}

/// full sweep plan for one cluster shape: the process grid and one problem
/// size per blocking factor
#[derive(Debug, Serialize, Deserialize)]
pub struct Plan {
    pub cluster: ClusterSpec,
    pub grid: GridShape,
    pub points: Vec<SweepPoint>,
    pub time_limit_hours: usize,
}

impl Plan {
    pub fn new(cluster: ClusterSpec, time_limit_hours: usize) -> Result<Self> {
        let grid = find_grid(cluster.total_cores())?;
        let baseline = baseline_problem_size(cluster.nodes, cluster.mem_per_node_gib);
        let points = sweep_points(baseline);
        Ok(Self {
            cluster,
            grid,
            points,
            time_limit_hours,
        })
    }

    /// name of the configuration-tree root for this cluster shape
    pub fn root_label(&self) -> String {
        format!(
            "{}_nodes_{}_cores_tests",
            self.cluster.nodes,
            self.cluster.total_cores()
        )
    }

    /// one run configuration per sweep point, in ladder order
    pub fn run_configs(&self) -> Vec<RunConfig> {
        self.points
            .iter()
            .map(|&point| RunConfig::new(point, self.grid))
            .collect()
    }

    pub fn to_file(&self, filename: impl AsRef<Path>) -> Result<()> {
        let filename = filename.as_ref();
        let bytes = bincode::serialize(self)?;
        let mut f = File::create(filename).map_err(|e| HplTuneError::from_fs(filename, e))?;
        f.write_all(&bytes)
            .map_err(|e| HplTuneError::from_fs(filename, e))?;
        Ok(())
    }

    pub fn from_file(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        let mut f = File::open(filename).map_err(|e| HplTuneError::from_fs(filename, e))?;
        let mut bytes = vec![];
        f.read_to_end(&mut bytes)
            .map_err(|e| HplTuneError::from_fs(filename, e))?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
