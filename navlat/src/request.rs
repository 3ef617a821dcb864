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

use crate::{
    algorithm::{SearchDirection, TerminationPolicy},
    environment::{
        EnvironmentBuilder, EnvironmentParams, LatticeEnvironment, Level, LevelConfig,
        LevelThresholds, MdpConfig,
    },
    error::PlanError,
    footprint::{Footprint, FootprintError},
    motion::{Point, Pose, PrimitiveSource},
    planner::DriverSettings,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything needed for one plan call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanRequest {
    /// Name of the search strategy, e.g. `arastar`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    pub width: usize,
    pub height: usize,
    /// Start pose in meters and radians.
    pub start: Pose,
    /// Goal pose in meters and radians.
    pub goal: Pose,
    /// Side length of a grid cell (meters)
    pub cell_size: f64,
    #[serde(default = "default_obstacle_threshold")]
    pub obstacle_threshold: u8,
    #[serde(default)]
    pub motion_primitives: PrimitiveSource,
    /// Row-major costs of the base grid.
    pub costs: Vec<u8>,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub settings: PlannerSettings,
}

impl PlanRequest {
    /// A request with the default robot and settings. Start and goal are both
    /// placed at the origin.
    pub fn new(
        strategy: impl Into<String>,
        width: usize,
        height: usize,
        cell_size: f64,
        costs: Vec<u8>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            width,
            height,
            start: Pose::new(0.0, 0.0, 0.0),
            goal: Pose::new(0.0, 0.0, 0.0),
            cell_size,
            obstacle_threshold: default_obstacle_threshold(),
            motion_primitives: PrimitiveSource::default(),
            costs,
            robot: RobotConfig::default(),
            settings: PlannerSettings::default(),
        }
    }

    pub fn environment_params(&self) -> EnvironmentParams {
        let mut params = EnvironmentParams::new(
            self.width,
            self.height,
            self.cell_size,
            self.obstacle_threshold,
        );
        params.nominal_velocity = self.settings.nominal_velocity;
        params.time_to_turn_45_degs = self.settings.time_to_turn_45_degs;
        params.num_angles = self.settings.num_angles;
        if let Some(thresholds) = self.robot.base_thresholds {
            params.base_thresholds = thresholds;
        }
        params
    }

    /// Assemble and freeze the multi-level environment, binding the start and
    /// goal. Additional levels without their own costs share the base grid.
    pub fn build_environment(&self) -> Result<(LatticeEnvironment, MdpConfig), PlanError> {
        let base = self.robot.footprint.to_footprint()?;
        let mut builder =
            EnvironmentBuilder::initialize(self.environment_params(), base, &self.motion_primitives)?;
        builder.set_grid(Level::Base, self.costs.clone())?;
        builder.set_start(&self.start)?;
        builder.set_goal(&self.goal)?;

        let levels = self
            .robot
            .additional_levels
            .iter()
            .map(|level| {
                Ok(LevelConfig {
                    footprint: level.footprint.to_footprint()?,
                    thresholds: level.thresholds,
                    costs: Some(level.costs.clone().unwrap_or_else(|| self.costs.clone())),
                })
            })
            .collect::<Result<Vec<_>, FootprintError>>()?;
        builder.add_levels_from(levels)?;

        Ok(builder.build_mdp_config()?)
    }
}

/// The physical description of the robot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RobotConfig {
    #[serde(default)]
    pub footprint: FootprintConfig,
    /// Thresholds of the base level. When omitted the obstacle threshold is
    /// used as the inscribed threshold and the footprint is always checked.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_thresholds: Option<LevelThresholds>,
    #[serde(default = "default_additional_levels")]
    pub additional_levels: Vec<LevelRequest>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            footprint: FootprintConfig::default(),
            base_thresholds: None,
            additional_levels: default_additional_levels(),
        }
    }
}

/// Written as `{type: rectangle, half_width, half_length}` or
/// `{type: polygon, points: [[x, y], ...]}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FootprintConfig {
    Rectangle { half_width: f64, half_length: f64 },
    Polygon {
        /// Vertices in robot-local coordinates (meters).
        points: Vec<[f64; 2]>,
    },
}

impl Default for FootprintConfig {
    fn default() -> Self {
        FootprintConfig::Rectangle {
            half_width: default_half_extent(),
            half_length: default_half_extent(),
        }
    }
}

impl FootprintConfig {
    pub fn to_footprint(&self) -> Result<Footprint, FootprintError> {
        match self {
            FootprintConfig::Rectangle {
                half_width,
                half_length,
            } => {
                let rectangle = Footprint::rectangle(*half_width, *half_length);
                Footprint::polygon(rectangle.points().to_vec())
            }
            FootprintConfig::Polygon { points } => {
                Footprint::polygon(points.iter().map(|[x, y]| Point::new(*x, *y)).collect())
            }
        }
    }
}

/// One additional level of the robot, e.g. its upper body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LevelRequest {
    #[serde(default)]
    pub footprint: FootprintConfig,
    #[serde(default = "default_level_thresholds")]
    pub thresholds: LevelThresholds,
    /// Row-major costs of this level. When omitted the base grid is reused.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub costs: Option<Vec<u8>>,
}

impl Default for LevelRequest {
    fn default() -> Self {
        Self {
            footprint: FootprintConfig::default(),
            thresholds: default_level_thresholds(),
            costs: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlannerSettings {
    /// Wall-clock budget of the search (seconds)
    #[serde(default = "default_time_budget")]
    pub time_budget: f64,
    #[serde(default = "default_initial_epsilon")]
    pub initial_epsilon: f64,
    #[serde(default)]
    pub termination: TerminationPolicy,
    #[serde(default)]
    pub direction: SearchDirection,
    /// Number of heading bins
    #[serde(default = "default_num_angles")]
    pub num_angles: u32,
    /// Driving speed (meters/sec)
    #[serde(default = "default_nominal_velocity")]
    pub nominal_velocity: f64,
    /// Time needed to turn in place by 45 degrees (seconds)
    #[serde(default = "default_time_to_turn_45_degs")]
    pub time_to_turn_45_degs: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_expansions: Option<usize>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            time_budget: default_time_budget(),
            initial_epsilon: default_initial_epsilon(),
            termination: TerminationPolicy::default(),
            direction: SearchDirection::default(),
            num_angles: default_num_angles(),
            nominal_velocity: default_nominal_velocity(),
            time_to_turn_45_degs: default_time_to_turn_45_degs(),
            max_expansions: None,
        }
    }
}

impl PlannerSettings {
    pub fn driver_settings(&self) -> DriverSettings {
        let time_budget = if self.time_budget > 0.0 {
            Duration::try_from_secs_f64(self.time_budget).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        DriverSettings {
            time_budget,
            initial_epsilon: self.initial_epsilon,
            termination: self.termination,
            max_expansions: self.max_expansions,
        }
    }
}

pub fn default_strategy() -> String {
    "arastar".to_owned()
}

pub fn default_obstacle_threshold() -> u8 {
    80
}

pub fn default_half_extent() -> f64 {
    0.02
}

pub fn default_level_thresholds() -> LevelThresholds {
    LevelThresholds::always_check_footprint(255)
}

pub fn default_additional_levels() -> Vec<LevelRequest> {
    vec![LevelRequest::default()]
}

pub fn default_time_budget() -> f64 {
    10.0
}

pub fn default_initial_epsilon() -> f64 {
    3.0
}

pub fn default_num_angles() -> u32 {
    16
}

pub fn default_nominal_velocity() -> f64 {
    1.0
}

pub fn default_time_to_turn_45_degs() -> f64 {
    4.0
}
