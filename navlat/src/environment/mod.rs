/*
 * Copyright (C) 2022 Open Source Robotics Foundation
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
*/

//! The state space that the search engines explore.

pub mod levels;
pub use levels::*;

pub mod lattice;
pub use lattice::*;

use crate::{
    error::ThisError,
    motion::{DiscretePose, Pose, PrimitiveError},
};
use smallvec::SmallVec;
use std::{fmt, str::FromStr};

pub type Cost = u64;

/// Cost of a transition that can never be taken.
pub const INFINITE_COST: Cost = Cost::MAX;

/// Opaque handle of one configuration of the robot. Ids are assigned by the
/// environment, are dense, and stay valid for as long as the environment
/// lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kinds of environments that planning strategies are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentKind {
    /// 8-connected 2D grid.
    Grid2D,
    /// 2D grid with uncertain cells.
    Grid2DUncertain,
    /// (x, y, heading) lattice.
    XYTheta,
    /// (x, y, heading) lattice with additional footprint levels.
    XYThetaMultiLevel,
    /// Joint space of a planar arm.
    RobotArm,
}

impl EnvironmentKind {
    pub const ALL: [EnvironmentKind; 5] = [
        EnvironmentKind::Grid2D,
        EnvironmentKind::Grid2DUncertain,
        EnvironmentKind::XYTheta,
        EnvironmentKind::XYThetaMultiLevel,
        EnvironmentKind::RobotArm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentKind::Grid2D => "2d",
            EnvironmentKind::Grid2DUncertain => "2duu",
            EnvironmentKind::XYTheta => "xytheta",
            EnvironmentKind::XYThetaMultiLevel => "xythetamlev",
            EnvironmentKind::RobotArm => "robarm",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvironmentKind {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| EnvironmentError::UnknownEnvironmentKind(s.to_owned()))
    }
}

/// Buffer that successor and predecessor queries write into. Most lattice
/// states have fewer transitions than this, so the buffer rarely allocates.
pub type Transitions = SmallVec<[(StateId, Cost); 16]>;

/// The graph that a search engine explores.
pub trait SearchEnvironment {
    fn kind(&self) -> EnvironmentKind;

    /// Number of state ids. Every id below this count is valid.
    fn state_count(&self) -> usize;

    fn contains(&self, id: StateId) -> bool {
        id.index() < self.state_count()
    }

    /// Replace the contents of `out` with the feasible transitions leaving
    /// `id` and their costs.
    fn successors(&self, id: StateId, out: &mut Transitions);

    /// Replace the contents of `out` with the feasible transitions arriving at
    /// `id` and their costs.
    fn predecessors(&self, id: StateId, out: &mut Transitions);

    /// A lower bound on the cost of travelling from `from` to `to`.
    fn heuristic(&self, from: StateId, to: StateId) -> Cost;

    fn state_pose(&self, id: StateId) -> Option<DiscretePose>;
}

/// Environments whose states are embedded in continuous space and whose
/// transitions follow a continuous trajectory.
pub trait ContinuousStates {
    fn continuous_pose(&self, id: StateId) -> Option<Pose>;

    /// The poses that the robot passes through while moving from `from` to
    /// `to`, or None if no feasible transition connects the two states.
    fn intermediate_poses(&self, from: StateId, to: StateId) -> Option<Vec<Pose>>;
}

/// Which end of the plan a pose was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Goal,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::Goal => f.write_str("goal"),
        }
    }
}

/// The start and goal states of a frozen environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdpConfig {
    pub start: StateId,
    pub goal: StateId,
}

#[derive(ThisError, Debug)]
pub enum InitError {
    #[error("grid dimensions must be positive, but got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("cell size must be positive and finite, but got {0}")]
    InvalidCellSize(f64),
    #[error("nominal velocity must be positive and finite, but got {0}")]
    InvalidNominalVelocity(f64),
    #[error("time to turn 45 degrees must be non-negative and finite, but got {0}")]
    InvalidTurnTime(f64),
    #[error("the number of headings must be at least one")]
    NoAngles,
    #[error("unable to load motion primitives: {0}")]
    Primitives(#[from] PrimitiveError),
    #[error("motion primitives have resolution {resolution} but the grid uses cells of {cell_size}")]
    ResolutionMismatch { cell_size: f64, resolution: f64 },
    #[error("motion primitives cover {actual} headings but the environment uses {expected}")]
    AngleCountMismatch { expected: u32, actual: u32 },
    #[error("the state space of {width}x{height}x{num_angles} does not fit in memory")]
    StateSpaceTooLarge {
        width: usize,
        height: usize,
        num_angles: u32,
    },
}

#[derive(ThisError, Debug)]
pub enum EnvironmentError {
    #[error("environment initialization failed: {0}")]
    EnvironmentInit(#[from] InitError),
    #[error("the grid for the {level} has {actual} cells, expected {expected}")]
    GridSizeMismatch {
        level: Level,
        expected: usize,
        actual: usize,
    },
    #[error("no cost grid has been set for the {0}")]
    MissingGrid(Level),
    #[error("the {0} has not been registered")]
    UnknownLevel(Level),
    #[error(
        "level count {count} does not match the {footprints} footprints, \
        {inscribed} inscribed thresholds and {possibly_circumscribed} \
        possibly-circumscribed thresholds that were given"
    )]
    LevelConfigMismatch {
        count: usize,
        footprints: usize,
        inscribed: usize,
        possibly_circumscribed: usize,
    },
    #[error("requested {requested} additional levels but at most {max} are supported")]
    TooManyLevels { requested: usize, max: usize },
    #[error(
        "inscribed threshold {inscribed} is below the possibly-circumscribed \
        threshold {possibly_circumscribed}"
    )]
    ThresholdOrder {
        inscribed: u8,
        possibly_circumscribed: u8,
    },
    #[error("the {endpoint} pose {pose:?} has a non-finite coordinate")]
    NonFinitePose { endpoint: Endpoint, pose: Pose },
    #[error("the {endpoint} {pose} is outside of the {width}x{height} grid")]
    OutOfBounds {
        endpoint: Endpoint,
        pose: DiscretePose,
        width: usize,
        height: usize,
    },
    #[error("the {endpoint} {pose} is in collision (cell cost {cost})")]
    EndpointInCollision {
        endpoint: Endpoint,
        pose: DiscretePose,
        cost: u8,
    },
    #[error("the {0} was never set")]
    MissingEndpoint(Endpoint),
    #[error("unknown environment kind [{0}]")]
    UnknownEnvironmentKind(String),
}
