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

use super::{
    ContinuousStates, Cost, CostGrid, Endpoint, EnvironmentError, EnvironmentKind, InitError,
    Level, LevelConfig, LevelThresholds, MdpConfig, SearchEnvironment, StateId, Transitions,
    MAX_ADDITIONAL_LEVELS,
};
use crate::{
    footprint::{segment_cells, Footprint},
    motion::{Cell, DiscretePose, Discretization, MotionPrimitives, Point, Pose, PrimitiveSource},
};
use log::debug;
use std::f64::consts::FRAC_PI_4;

/// Converts action durations in seconds into integer costs.
const COST_PER_SECOND: f64 = 1000.0;

/// Physical parameters of the lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentParams {
    pub width: usize,
    pub height: usize,
    /// Side length of a grid cell in meters.
    pub cell_size: f64,
    /// Cells whose cost is at or above this value are obstacles on every level.
    pub obstacle_threshold: u8,
    /// Meters per second when driving.
    pub nominal_velocity: f64,
    /// Seconds needed to turn 45 degrees in place.
    pub time_to_turn_45_degs: f64,
    /// Number of heading bins. Loaded motion primitives must agree with it.
    pub num_angles: u32,
    pub base_thresholds: LevelThresholds,
}

impl EnvironmentParams {
    pub fn new(width: usize, height: usize, cell_size: f64, obstacle_threshold: u8) -> Self {
        Self {
            width,
            height,
            cell_size,
            obstacle_threshold,
            nominal_velocity: 1.0,
            time_to_turn_45_degs: 4.0,
            num_angles: 16,
            base_thresholds: LevelThresholds::always_check_footprint(obstacle_threshold),
        }
    }

    fn validate(&self) -> Result<(), InitError> {
        if self.width == 0 || self.height == 0 {
            return Err(InitError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(InitError::InvalidCellSize(self.cell_size));
        }

        if !(self.nominal_velocity.is_finite() && self.nominal_velocity > 0.0) {
            return Err(InitError::InvalidNominalVelocity(self.nominal_velocity));
        }

        if !(self.time_to_turn_45_degs.is_finite() && self.time_to_turn_45_degs >= 0.0) {
            return Err(InitError::InvalidTurnTime(self.time_to_turn_45_degs));
        }

        if self.num_angles == 0 {
            return Err(InitError::NoAngles);
        }

        let fits = self
            .width
            .checked_mul(self.height)
            .and_then(|cells| cells.checked_mul(self.num_angles as usize))
            .is_some_and(|states| states <= i32::MAX as usize);
        if !fits {
            return Err(InitError::StateSpaceTooLarge {
                width: self.width,
                height: self.height,
                num_angles: self.num_angles,
            });
        }

        Ok(())
    }

    pub fn discretization(&self) -> Discretization {
        Discretization::new(self.cell_size, self.num_angles)
    }
}

#[derive(Debug, Clone)]
struct LevelData {
    footprint: Footprint,
    thresholds: LevelThresholds,
    grid: Option<CostGrid>,
}

/// Assembles a multi-level lattice environment. Grids, levels and endpoints
/// may be set in any order, as long as the base grid comes first. Once
/// [`EnvironmentBuilder::build_mdp_config`] is called the environment is
/// frozen.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    params: EnvironmentParams,
    primitives: MotionPrimitives,
    levels: Vec<LevelData>,
    start: Option<DiscretePose>,
    goal: Option<DiscretePose>,
}

impl EnvironmentBuilder {
    pub fn initialize(
        params: EnvironmentParams,
        base_footprint: Footprint,
        source: &PrimitiveSource,
    ) -> Result<Self, EnvironmentError> {
        params.validate()?;
        let primitives = source
            .load(params.discretization())
            .map_err(InitError::from)?;
        Self::initialize_with_primitives(params, base_footprint, primitives)
    }

    pub fn initialize_with_primitives(
        params: EnvironmentParams,
        base_footprint: Footprint,
        primitives: MotionPrimitives,
    ) -> Result<Self, EnvironmentError> {
        params.validate()?;
        if (primitives.resolution() - params.cell_size).abs() > 1e-6 {
            return Err(InitError::ResolutionMismatch {
                cell_size: params.cell_size,
                resolution: primitives.resolution(),
            }
            .into());
        }

        if primitives.num_angles() != params.num_angles {
            return Err(InitError::AngleCountMismatch {
                expected: params.num_angles,
                actual: primitives.num_angles(),
            }
            .into());
        }

        debug!(
            "Initialized a {}x{} lattice with {} headings and {} motion primitives",
            params.width,
            params.height,
            params.num_angles,
            primitives.len(),
        );

        let base = LevelData {
            footprint: base_footprint,
            thresholds: params.base_thresholds,
            grid: None,
        };

        Ok(Self {
            params,
            primitives,
            levels: vec![base],
            start: None,
            goal: None,
        })
    }

    pub fn additional_level_count(&self) -> usize {
        self.levels.len() - 1
    }

    /// Bind a cost grid to a level. The base grid has to be set before the
    /// grid of any additional level.
    pub fn set_grid(&mut self, level: Level, costs: Vec<u8>) -> Result<(), EnvironmentError> {
        let slot = level.slot();
        if slot >= self.levels.len() {
            return Err(EnvironmentError::UnknownLevel(level));
        }

        if slot > 0 && self.levels[0].grid.is_none() {
            return Err(EnvironmentError::MissingGrid(Level::Base));
        }

        let grid = self.make_grid(level, costs)?;
        self.levels[slot].grid = Some(grid);
        Ok(())
    }

    /// Register `count` additional levels, each with its own footprint and
    /// pair of thresholds.
    pub fn add_levels(
        &mut self,
        count: usize,
        footprints: Vec<Footprint>,
        inscribed: &[u8],
        possibly_circumscribed: &[u8],
    ) -> Result<(), EnvironmentError> {
        if footprints.len() != count
            || inscribed.len() != count
            || possibly_circumscribed.len() != count
        {
            return Err(EnvironmentError::LevelConfigMismatch {
                count,
                footprints: footprints.len(),
                inscribed: inscribed.len(),
                possibly_circumscribed: possibly_circumscribed.len(),
            });
        }

        let configs = footprints
            .into_iter()
            .zip(inscribed.iter().zip(possibly_circumscribed))
            .map(|(footprint, (&inscribed, &possibly_circumscribed))| {
                Ok(LevelConfig::new(
                    footprint,
                    LevelThresholds::new(inscribed, possibly_circumscribed)?,
                ))
            })
            .collect::<Result<Vec<_>, EnvironmentError>>()?;

        self.add_levels_from(configs)
    }

    /// Register additional levels, binding the grids of those that carry one.
    /// Nothing is registered if any of the levels is rejected.
    pub fn add_levels_from(&mut self, configs: Vec<LevelConfig>) -> Result<(), EnvironmentError> {
        let requested = self.additional_level_count() + configs.len();
        if requested > MAX_ADDITIONAL_LEVELS {
            return Err(EnvironmentError::TooManyLevels {
                requested,
                max: MAX_ADDITIONAL_LEVELS,
            });
        }

        let first = self.additional_level_count();
        let mut levels = Vec::with_capacity(configs.len());
        for (i, config) in configs.into_iter().enumerate() {
            let grid = match config.costs {
                Some(costs) => {
                    if self.levels[0].grid.is_none() {
                        return Err(EnvironmentError::MissingGrid(Level::Base));
                    }
                    Some(self.make_grid(Level::Additional(first + i), costs)?)
                }
                None => None,
            };

            levels.push(LevelData {
                footprint: config.footprint,
                thresholds: config.thresholds,
                grid,
            });
        }

        debug!("Registered {} additional levels", levels.len());
        self.levels.extend(levels);
        Ok(())
    }

    /// Set the start from a continuous pose. Returns the discrete pose that
    /// the start was bound to.
    pub fn set_start(&mut self, pose: &Pose) -> Result<DiscretePose, EnvironmentError> {
        let start = self.bind_endpoint(Endpoint::Start, pose)?;
        self.start = Some(start);
        Ok(start)
    }

    /// Set the goal from a continuous pose. Returns the discrete pose that the
    /// goal was bound to.
    pub fn set_goal(&mut self, pose: &Pose) -> Result<DiscretePose, EnvironmentError> {
        let goal = self.bind_endpoint(Endpoint::Goal, pose)?;
        self.goal = Some(goal);
        Ok(goal)
    }

    /// Freeze the environment and report the ids of the start and goal.
    pub fn build_mdp_config(self) -> Result<(LatticeEnvironment, MdpConfig), EnvironmentError> {
        let Self {
            params,
            primitives,
            levels,
            start,
            goal,
        } = self;

        let mut frozen = Vec::with_capacity(levels.len());
        let mut footprints = Vec::with_capacity(levels.len());
        for (slot, level) in levels.into_iter().enumerate() {
            let id = if slot == 0 {
                Level::Base
            } else {
                Level::Additional(slot - 1)
            };
            let grid = level.grid.ok_or(EnvironmentError::MissingGrid(id))?;
            frozen.push(FrozenLevel {
                thresholds: level.thresholds,
                grid,
            });
            footprints.push(level.footprint);
        }

        let start = start.ok_or(EnvironmentError::MissingEndpoint(Endpoint::Start))?;
        let goal = goal.ok_or(EnvironmentError::MissingEndpoint(Endpoint::Goal))?;

        let environment = LatticeEnvironment::new(params, &primitives, &footprints, frozen);
        let config = MdpConfig {
            start: environment.state_id(&start).ok_or(EnvironmentError::OutOfBounds {
                endpoint: Endpoint::Start,
                pose: start,
                width: environment.width,
                height: environment.height,
            })?,
            goal: environment.state_id(&goal).ok_or(EnvironmentError::OutOfBounds {
                endpoint: Endpoint::Goal,
                pose: goal,
                width: environment.width,
                height: environment.height,
            })?,
        };

        debug!(
            "Froze environment with {} states, start {} -> {}, goal {} -> {}",
            environment.state_count(),
            start,
            config.start,
            goal,
            config.goal,
        );

        Ok((environment, config))
    }

    fn make_grid(&self, level: Level, costs: Vec<u8>) -> Result<CostGrid, EnvironmentError> {
        let expected = self.params.width * self.params.height;
        let actual = costs.len();
        CostGrid::new(self.params.width, self.params.height, costs).ok_or(
            EnvironmentError::GridSizeMismatch {
                level,
                expected,
                actual,
            },
        )
    }

    fn bind_endpoint(
        &self,
        endpoint: Endpoint,
        pose: &Pose,
    ) -> Result<DiscretePose, EnvironmentError> {
        let base = &self.levels[0];
        let grid = base
            .grid
            .as_ref()
            .ok_or(EnvironmentError::MissingGrid(Level::Base))?;

        if !(pose.x.is_finite() && pose.y.is_finite() && pose.theta.is_finite()) {
            return Err(EnvironmentError::NonFinitePose {
                endpoint,
                pose: *pose,
            });
        }

        let discrete = self.params.discretization().discretize(pose);
        let cost = grid
            .cost(discrete.x, discrete.y)
            .ok_or(EnvironmentError::OutOfBounds {
                endpoint,
                pose: discrete,
                width: self.params.width,
                height: self.params.height,
            })?;

        if cost >= self.params.obstacle_threshold || cost >= base.thresholds.inscribed() {
            return Err(EnvironmentError::EndpointInCollision {
                endpoint,
                pose: discrete,
                cost,
            });
        }

        debug!("Bound the {endpoint} ({}, {}, {}) to {discrete}", pose.x, pose.y, pose.theta);
        Ok(discrete)
    }
}

#[derive(Debug, Clone)]
struct FrozenLevel {
    thresholds: LevelThresholds,
    grid: CostGrid,
}

/// A motion primitive prepared for fast feasibility checks. All cells are
/// relative to the source cell of the action.
#[derive(Debug, Clone)]
struct Action {
    dx: i32,
    dy: i32,
    start_theta: i32,
    end_theta: i32,
    base_cost: Cost,
    /// Cells crossed by the path of the reference point.
    interm_cells: Vec<Cell>,
    /// Cells covered by each level's footprint along the action.
    swept_cells: Vec<Vec<Cell>>,
    /// Poses along the action relative to the center of the source cell.
    intermediate_poses: Vec<Pose>,
}

/// The frozen multi-level (x, y, heading) lattice.
#[derive(Debug, Clone)]
pub struct LatticeEnvironment {
    width: usize,
    height: usize,
    discretization: Discretization,
    obstacle_threshold: u8,
    nominal_velocity: f64,
    levels: Vec<FrozenLevel>,
    /// Actions indexed by the heading they start from.
    actions: Vec<Vec<Action>>,
    /// For every heading, the actions that end in it, as (start heading,
    /// action index) pairs.
    arrivals: Vec<Vec<(usize, usize)>>,
}

impl LatticeEnvironment {
    fn new(
        params: EnvironmentParams,
        primitives: &MotionPrimitives,
        footprints: &[Footprint],
        levels: Vec<FrozenLevel>,
    ) -> Self {
        let discretization = params.discretization();
        let cell_size = params.cell_size;
        let center = Point::new(cell_size / 2.0, cell_size / 2.0);
        let num_angles = params.num_angles as usize;

        let mut actions: Vec<Vec<Action>> = vec![Vec::new(); num_angles];
        let mut arrivals: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_angles];
        for primitive in primitives.iter() {
            let (dx, dy) = (primitive.end_pose.x, primitive.end_pose.y);
            let (start_theta, end_theta) = (primitive.start_angle, primitive.end_pose.theta);
            if dx == 0 && dy == 0 && start_theta == end_theta {
                continue;
            }

            let world_poses: Vec<Pose> = primitive
                .intermediate_poses
                .iter()
                .map(|p| Pose::new(center.x + p.x, center.y + p.y, p.theta))
                .collect();

            let mut interm_cells = Vec::new();
            for pair in world_poses.windows(2) {
                segment_cells(pair[0].point(), pair[1].point(), cell_size, &mut interm_cells);
            }
            interm_cells.sort();
            interm_cells.dedup();

            let swept_cells = footprints
                .iter()
                .map(|footprint| {
                    let mut cells: Vec<Cell> = world_poses
                        .iter()
                        .flat_map(|pose| footprint.cells_at(pose, cell_size))
                        .collect();
                    cells.sort();
                    cells.dedup();
                    cells
                })
                .collect();

            let distance = primitive.linear_distance(cell_size);
            let turns = {
                let diff = (end_theta - start_theta).rem_euclid(params.num_angles as i32);
                diff.min(params.num_angles as i32 - diff) as f64 * discretization.angle_bin()
                    / FRAC_PI_4
            };
            let seconds = f64::max(
                distance / params.nominal_velocity,
                turns * params.time_to_turn_45_degs,
            );
            // The float to integer cast saturates, so the products must too.
            let base_cost = ((COST_PER_SECOND * seconds).ceil() as Cost)
                .max(1)
                .saturating_mul(primitive.cost_multiplier.max(1) as Cost);

            let action = Action {
                dx,
                dy,
                start_theta,
                end_theta,
                base_cost,
                interm_cells,
                swept_cells,
                intermediate_poses: primitive.intermediate_poses.clone(),
            };

            let index = actions[start_theta as usize].len();
            arrivals[end_theta as usize].push((start_theta as usize, index));
            actions[start_theta as usize].push(action);
        }

        Self {
            width: params.width,
            height: params.height,
            discretization,
            obstacle_threshold: params.obstacle_threshold,
            nominal_velocity: params.nominal_velocity,
            levels,
            actions,
            arrivals,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn discretization(&self) -> Discretization {
        self.discretization
    }

    pub fn num_angles(&self) -> u32 {
        self.discretization.num_angles
    }

    /// Number of additional levels, not counting the base.
    pub fn additional_level_count(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn obstacle_threshold(&self) -> u8 {
        self.obstacle_threshold
    }

    /// The cost of a cell on one level, or None if either is unknown.
    pub fn cell_cost(&self, level: Level, cell: Cell) -> Option<u8> {
        self.levels.get(level.slot())?.grid.cost(cell.x, cell.y)
    }

    pub fn state_id(&self, pose: &DiscretePose) -> Option<StateId> {
        if pose.x < 0 || pose.y < 0 || pose.theta < 0 {
            return None;
        }

        let (x, y, theta) = (pose.x as usize, pose.y as usize, pose.theta as usize);
        if x >= self.width || y >= self.height || theta >= self.num_angles() as usize {
            return None;
        }

        Some(StateId::new(x + self.width * (y + self.height * theta)))
    }

    pub fn pose_of(&self, id: StateId) -> Option<DiscretePose> {
        if !self.contains(id) {
            return None;
        }

        let index = id.index();
        let x = index % self.width;
        let y = (index / self.width) % self.height;
        let theta = index / (self.width * self.height);
        Some(DiscretePose::new(x as i32, y as i32, theta as i32))
    }

    /// Check the action from `(x, y)` against one level. Returns the highest
    /// cell cost the action touches, or None if it is infeasible.
    fn level_cost(&self, level: usize, action: &Action, x: i32, y: i32) -> Option<u8> {
        let FrozenLevel { thresholds, grid } = &self.levels[level];
        let obstacle = self.obstacle_threshold;

        let source = grid.cost(x, y).filter(|c| *c < obstacle)?;
        let end = grid
            .cost(x + action.dx, y + action.dy)
            .filter(|c| *c < obstacle && *c < thresholds.inscribed())?;

        let mut max_cost = source.max(end);
        for cell in &action.interm_cells {
            let cost = grid
                .cost(x + cell.x, y + cell.y)
                .filter(|c| *c < thresholds.inscribed())?;
            max_cost = max_cost.max(cost);
        }

        if max_cost >= thresholds.possibly_circumscribed() {
            for cell in &action.swept_cells[level] {
                grid.cost(x + cell.x, y + cell.y).filter(|c| *c < obstacle)?;
            }
        }

        Some(max_cost)
    }

    /// The cost of taking `action` from the cell `(x, y)`, or None if it is
    /// infeasible at any level.
    fn action_cost(&self, action: &Action, x: i32, y: i32) -> Option<Cost> {
        let mut max_cost = 0;
        for level in 0..self.levels.len() {
            max_cost = max_cost.max(self.level_cost(level, action, x, y)?);
        }

        Some(action.base_cost.saturating_mul(max_cost as Cost + 1))
    }

    fn end_state(&self, action: &Action, x: i32, y: i32) -> Option<StateId> {
        self.state_id(&DiscretePose::new(
            x + action.dx,
            y + action.dy,
            action.end_theta,
        ))
    }
}

impl SearchEnvironment for LatticeEnvironment {
    fn kind(&self) -> EnvironmentKind {
        if self.additional_level_count() > 0 {
            EnvironmentKind::XYThetaMultiLevel
        } else {
            EnvironmentKind::XYTheta
        }
    }

    fn state_count(&self) -> usize {
        self.width * self.height * self.num_angles() as usize
    }

    fn successors(&self, id: StateId, out: &mut Transitions) {
        out.clear();
        let Some(pose) = self.pose_of(id) else {
            return;
        };

        for action in &self.actions[pose.theta as usize] {
            let Some(cost) = self.action_cost(action, pose.x, pose.y) else {
                continue;
            };

            if let Some(next) = self.end_state(action, pose.x, pose.y) {
                out.push((next, cost));
            }
        }
    }

    fn predecessors(&self, id: StateId, out: &mut Transitions) {
        out.clear();
        let Some(pose) = self.pose_of(id) else {
            return;
        };

        for (start_theta, index) in &self.arrivals[pose.theta as usize] {
            let action = &self.actions[*start_theta][*index];
            let (x, y) = (pose.x - action.dx, pose.y - action.dy);
            let Some(cost) = self.action_cost(action, x, y) else {
                continue;
            };

            if let Some(previous) = self.state_id(&DiscretePose::new(x, y, action.start_theta)) {
                out.push((previous, cost));
            }
        }
    }

    fn heuristic(&self, from: StateId, to: StateId) -> Cost {
        let (Some(from), Some(to)) = (self.pose_of(from), self.pose_of(to)) else {
            return 0;
        };

        let distance = (from.x - to.x) as f64 * self.discretization.cell_size;
        let distance =
            distance.hypot((from.y - to.y) as f64 * self.discretization.cell_size);
        (COST_PER_SECOND * distance / self.nominal_velocity).floor() as Cost
    }

    fn state_pose(&self, id: StateId) -> Option<DiscretePose> {
        self.pose_of(id)
    }
}

impl ContinuousStates for LatticeEnvironment {
    fn continuous_pose(&self, id: StateId) -> Option<Pose> {
        self.pose_of(id).map(|p| self.discretization.continuous(&p))
    }

    fn intermediate_poses(&self, from: StateId, to: StateId) -> Option<Vec<Pose>> {
        let source = self.pose_of(from)?;
        let center = self.discretization.continuous(&source);
        self.actions[source.theta as usize]
            .iter()
            .filter(|action| self.end_state(action, source.x, source.y) == Some(to))
            .filter_map(|action| {
                self.action_cost(action, source.x, source.y)
                    .map(|cost| (cost, action))
            })
            .min_by_key(|(cost, _)| *cost)
            .map(|(_, action)| {
                action
                    .intermediate_poses
                    .iter()
                    .map(|p| Pose::new(center.x + p.x, center.y + p.y, p.theta))
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{environment::INFINITE_COST, motion::MotionPrimitive};

    /// Four headings, and one primitive per heading that drives one cell
    /// straight ahead.
    fn straight_primitives(cell_size: f64) -> MotionPrimitives {
        let primitives = (0..4)
            .map(|angle| {
                let (dx, dy) = [(1, 0), (0, 1), (-1, 0), (0, -1)][angle as usize];
                let theta = angle as f64 * std::f64::consts::FRAC_PI_2;
                MotionPrimitive {
                    id: 0,
                    start_angle: angle,
                    end_pose: DiscretePose::new(dx, dy, angle),
                    cost_multiplier: 1,
                    intermediate_poses: vec![
                        Pose::new(0.0, 0.0, theta),
                        Pose::new(dx as f64 * cell_size, dy as f64 * cell_size, theta),
                    ],
                }
            })
            .collect();
        MotionPrimitives::new(cell_size, 4, primitives).unwrap()
    }

    fn params(width: usize, height: usize) -> EnvironmentParams {
        let mut params = EnvironmentParams::new(width, height, 0.1, 100);
        params.num_angles = 4;
        params
    }

    fn builder(width: usize, height: usize) -> EnvironmentBuilder {
        EnvironmentBuilder::initialize_with_primitives(
            params(width, height),
            Footprint::rectangle(0.02, 0.02),
            straight_primitives(0.1),
        )
        .unwrap()
    }

    fn center(x: i32, y: i32) -> Pose {
        Pose::new(x as f64 * 0.1 + 0.05, y as f64 * 0.1 + 0.05, 0.0)
    }

    #[test]
    fn initialization_rejects_bad_parameters() {
        let result = EnvironmentBuilder::initialize_with_primitives(
            params(0, 5),
            Footprint::rectangle(0.02, 0.02),
            straight_primitives(0.1),
        );
        assert!(matches!(
            result,
            Err(EnvironmentError::EnvironmentInit(InitError::InvalidDimensions { .. }))
        ));

        let result = EnvironmentBuilder::initialize_with_primitives(
            params(5, 5),
            Footprint::rectangle(0.02, 0.02),
            straight_primitives(0.2),
        );
        assert!(matches!(
            result,
            Err(EnvironmentError::EnvironmentInit(InitError::ResolutionMismatch { .. }))
        ));

        let result = EnvironmentBuilder::initialize(
            EnvironmentParams::new(5, 5, 0.1, 100),
            Footprint::rectangle(0.02, 0.02),
            &PrimitiveSource::Inline {
                text: "resolution_m: 0.1\nnumberofangles: nope".to_owned(),
            },
        );
        assert!(matches!(
            result,
            Err(EnvironmentError::EnvironmentInit(InitError::Primitives(_)))
        ));
    }

    #[test]
    fn grids_are_checked_against_levels() {
        let mut builder = builder(3, 3);
        let footprint = Footprint::rectangle(0.02, 0.02);
        builder
            .add_levels(1, vec![footprint.clone()], &[255], &[0])
            .unwrap();

        assert!(matches!(
            builder.set_grid(Level::Additional(0), vec![0; 9]),
            Err(EnvironmentError::MissingGrid(Level::Base))
        ));
        assert!(matches!(
            builder.set_grid(Level::Base, vec![0; 8]),
            Err(EnvironmentError::GridSizeMismatch {
                expected: 9,
                actual: 8,
                ..
            })
        ));
        builder.set_grid(Level::Base, vec![0; 9]).unwrap();
        builder.set_grid(Level::Additional(0), vec![0; 9]).unwrap();
        assert!(matches!(
            builder.set_grid(Level::Additional(1), vec![0; 9]),
            Err(EnvironmentError::UnknownLevel(Level::Additional(1)))
        ));

        assert!(matches!(
            builder.add_levels(2, vec![footprint], &[255, 255], &[0, 0]),
            Err(EnvironmentError::LevelConfigMismatch { count: 2, .. })
        ));
        assert!(matches!(
            builder.add_levels(
                8,
                vec![Footprint::rectangle(0.02, 0.02); 8],
                &[255; 8],
                &[0; 8]
            ),
            Err(EnvironmentError::TooManyLevels {
                requested: 9,
                max: 8
            })
        ));
        assert_eq!(builder.additional_level_count(), 1);
    }

    #[test]
    fn endpoints_must_be_free_and_inside() {
        let mut builder = builder(3, 3);
        assert!(matches!(
            builder.set_start(&center(0, 0)),
            Err(EnvironmentError::MissingGrid(Level::Base))
        ));

        let mut costs = vec![0; 9];
        costs[4] = 100;
        builder.set_grid(Level::Base, costs).unwrap();

        assert!(matches!(
            builder.set_start(&center(1, 1)),
            Err(EnvironmentError::EndpointInCollision { cost: 100, .. })
        ));
        assert!(matches!(
            builder.set_goal(&center(3, 0)),
            Err(EnvironmentError::OutOfBounds {
                endpoint: Endpoint::Goal,
                ..
            })
        ));
        assert!(matches!(
            builder.clone().build_mdp_config(),
            Err(EnvironmentError::MissingEndpoint(Endpoint::Start))
        ));

        assert_eq!(
            builder.set_start(&center(0, 0)).unwrap(),
            DiscretePose::new(0, 0, 0)
        );
        assert_eq!(
            builder.set_goal(&center(2, 2)).unwrap(),
            DiscretePose::new(2, 2, 0)
        );
        let (environment, config) = builder.build_mdp_config().unwrap();
        assert_eq!(environment.pose_of(config.start), Some(DiscretePose::new(0, 0, 0)));
        assert_eq!(environment.pose_of(config.goal), Some(DiscretePose::new(2, 2, 0)));
    }

    #[test]
    fn state_ids_are_dense_and_reversible() {
        let mut builder = builder(4, 3);
        builder.set_grid(Level::Base, vec![0; 12]).unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(3, 2)).unwrap();
        let (environment, _) = builder.build_mdp_config().unwrap();

        assert_eq!(environment.state_count(), 4 * 3 * 4);
        for index in 0..environment.state_count() {
            let id = StateId::new(index);
            let pose = environment.pose_of(id).unwrap();
            assert_eq!(environment.state_id(&pose), Some(id));
        }
        assert_eq!(environment.pose_of(StateId::new(48)), None);
        assert_eq!(environment.state_id(&DiscretePose::new(4, 0, 0)), None);
    }

    #[test]
    fn action_cost_scales_with_cell_cost() {
        let mut builder = builder(3, 1);
        builder.set_grid(Level::Base, vec![0, 9, 0]).unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(2, 0)).unwrap();
        let (environment, config) = builder.build_mdp_config().unwrap();

        let mut out = Transitions::new();
        environment.successors(config.start, &mut out);
        // 0.1 m at 1 m/s is 100 ms, scaled by the highest cell cost plus one.
        assert_eq!(out.as_slice(), &[(StateId::new(1), 1000)]);

        environment.predecessors(config.goal, &mut out);
        assert_eq!(out.as_slice(), &[(StateId::new(1), 1000)]);

        assert_eq!(environment.heuristic(config.start, config.goal), 200);
    }

    #[test]
    fn slow_robots_saturate_action_costs() {
        let mut params = params(3, 1);
        params.nominal_velocity = 1e-20;
        let mut builder = EnvironmentBuilder::initialize_with_primitives(
            params,
            Footprint::rectangle(0.02, 0.02),
            straight_primitives(0.1),
        )
        .unwrap();
        builder.set_grid(Level::Base, vec![0, 9, 0]).unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(2, 0)).unwrap();
        let (environment, config) = builder.build_mdp_config().unwrap();

        let mut out = Transitions::new();
        environment.successors(config.start, &mut out);
        assert_eq!(out.as_slice(), &[(StateId::new(1), INFINITE_COST)]);
        assert_eq!(environment.heuristic(config.start, config.goal), INFINITE_COST);
    }

    #[test]
    fn non_finite_endpoints_are_rejected() {
        let mut builder = builder(3, 3);
        builder.set_grid(Level::Base, vec![0; 9]).unwrap();
        for pose in [
            Pose::new(f64::NAN, 0.05, 0.0),
            Pose::new(0.05, f64::NEG_INFINITY, 0.0),
            Pose::new(0.05, 0.05, f64::INFINITY),
        ] {
            assert!(matches!(
                builder.set_start(&pose),
                Err(EnvironmentError::NonFinitePose {
                    endpoint: Endpoint::Start,
                    ..
                })
            ));
        }
        assert!(matches!(
            builder.set_goal(&Pose::new(0.15, f64::NAN, 0.0)),
            Err(EnvironmentError::NonFinitePose {
                endpoint: Endpoint::Goal,
                ..
            })
        ));
    }

    #[test]
    fn obstacles_on_any_level_block_actions() {
        let mut builder = builder(3, 1);
        builder.set_grid(Level::Base, vec![0, 0, 0]).unwrap();
        builder
            .add_levels_from(vec![LevelConfig::new(
                Footprint::rectangle(0.02, 0.02),
                LevelThresholds::new(255, 0).unwrap(),
            )
            .with_costs(vec![0, 100, 0])])
            .unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(2, 0)).unwrap();
        let (environment, config) = builder.build_mdp_config().unwrap();
        assert_eq!(environment.kind(), EnvironmentKind::XYThetaMultiLevel);

        let mut out = Transitions::new();
        environment.successors(config.start, &mut out);
        assert!(out.is_empty());
        environment.predecessors(config.goal, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn inscribed_cells_block_the_center_line_only() {
        // The upper body level treats costs of 50 or more as a certain
        // collision of its reference point.
        let mut builder = builder(3, 1);
        builder.set_grid(Level::Base, vec![0, 0, 0]).unwrap();
        builder
            .add_levels(1, vec![Footprint::rectangle(0.02, 0.02)], &[50], &[10])
            .unwrap();
        builder.set_grid(Level::Additional(0), vec![0, 60, 0]).unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(2, 0)).unwrap();
        let (environment, config) = builder.build_mdp_config().unwrap();

        let mut out = Transitions::new();
        environment.successors(config.start, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn intermediate_poses_follow_the_primitive() {
        let mut builder = builder(3, 1);
        builder.set_grid(Level::Base, vec![0; 3]).unwrap();
        builder.set_start(&center(0, 0)).unwrap();
        builder.set_goal(&center(2, 0)).unwrap();
        let (environment, config) = builder.build_mdp_config().unwrap();

        let poses = environment
            .intermediate_poses(config.start, StateId::new(1))
            .unwrap();
        assert_eq!(poses.len(), 2);
        assert!((poses[0].x - 0.05).abs() < 1e-9);
        assert!((poses[1].x - 0.15).abs() < 1e-9);
        assert!(environment
            .intermediate_poses(config.start, config.goal)
            .is_none());
    }
}
