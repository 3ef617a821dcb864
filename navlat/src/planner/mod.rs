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

pub mod driver;
pub use driver::{DriverError, DriverSettings, SearchDriver};

use crate::{
    algorithm::{
        AdStar, AnaStar, AraStar, BindError, SearchDirection, SearchEngine, SearchError,
        SearchOutcome, SearchStats, Strategy, StrategyError, TerminationPolicy,
    },
    environment::{ContinuousStates, MdpConfig, SearchEnvironment, StateId},
    error::PlanError,
    motion::{DiscretePose, Pose},
    path::PathExtractor,
    request::PlanRequest,
};
use log::{debug, info, warn};
use std::time::Duration;

/// A search engine bound to an environment, one variant per strategy that can
/// be constructed.
pub enum Engine<'e, E> {
    AraStar(AraStar<'e, E>),
    AdStar(AdStar<'e, E>),
    AnaStar(AnaStar<'e, E>),
}

macro_rules! for_each_engine {
    ($engine:expr, $inner:ident => $body:expr) => {
        match $engine {
            Engine::AraStar($inner) => $body,
            Engine::AdStar($inner) => $body,
            Engine::AnaStar($inner) => $body,
        }
    };
}

impl<'e, E: SearchEnvironment> SearchEngine for Engine<'e, E> {
    fn strategy(&self) -> Strategy {
        for_each_engine!(self, engine => engine.strategy())
    }

    fn set_start(&mut self, state: StateId) -> Result<(), BindError> {
        for_each_engine!(self, engine => engine.set_start(state))
    }

    fn set_goal(&mut self, state: StateId) -> Result<(), BindError> {
        for_each_engine!(self, engine => engine.set_goal(state))
    }

    fn set_initial_epsilon(&mut self, epsilon: f64) -> Result<(), SearchError> {
        for_each_engine!(self, engine => engine.set_initial_epsilon(epsilon))
    }

    fn set_termination(&mut self, policy: TerminationPolicy) {
        for_each_engine!(self, engine => engine.set_termination(policy))
    }

    fn set_expansion_limit(&mut self, limit: Option<usize>) {
        for_each_engine!(self, engine => engine.set_expansion_limit(limit))
    }

    fn replan(&mut self, budget: Duration) -> Result<SearchOutcome, SearchError> {
        for_each_engine!(self, engine => engine.replan(budget))
    }
}

/// Construct the engine for a strategy, bound to a frozen environment. Nothing
/// is constructed when the strategy does not apply to the environment.
pub fn select_engine<'e, E: SearchEnvironment>(
    strategy: Strategy,
    environment: &'e E,
    direction: SearchDirection,
) -> Result<Engine<'e, E>, StrategyError> {
    let kind = environment.kind();
    if !strategy.supports(kind) {
        warn!("The {strategy} strategy does not support {kind} environments");
        return Err(StrategyError::UnsupportedStrategyForEnvironment {
            strategy,
            environment: kind,
        });
    }

    debug!("Initializing the {strategy} engine for a {direction:?} search");
    match strategy {
        Strategy::AraStar => Ok(Engine::AraStar(AraStar::new(environment, direction))),
        Strategy::AdStar => Ok(Engine::AdStar(AdStar::new(environment, direction))),
        Strategy::AnaStar => Ok(Engine::AnaStar(AnaStar::new(environment, direction))),
        Strategy::Ppcp | Strategy::RStar | Strategy::ValueIteration => {
            warn!("No engine is available for the {strategy} strategy");
            Err(StrategyError::EngineUnavailable(strategy))
        }
    }
}

/// The result of one plan call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    pub solved: bool,
    /// Discrete poses from start to goal. Empty when no solution was found.
    pub path: Vec<DiscretePose>,
    pub state_ids: Vec<StateId>,
    /// Cell centers and headings of `path` in meters and radians.
    pub waypoints: Vec<Pose>,
    /// The full trajectory through the intermediate poses of every action.
    pub interpolated: Vec<Pose>,
    pub stats: SearchStats,
}

/// Build the environment described by a request, search it and convert the
/// solution back into poses.
pub fn plan(request: &PlanRequest) -> Result<PlanResult, PlanError> {
    let strategy: Strategy = request.strategy.parse()?;
    let (environment, config) = request.build_environment()?;
    plan_with(
        strategy,
        &environment,
        &config,
        request.settings.direction,
        &request.settings.driver_settings(),
    )
}

/// Search an environment that has already been built.
pub fn plan_with<E: SearchEnvironment + ContinuousStates>(
    strategy: Strategy,
    environment: &E,
    config: &MdpConfig,
    direction: SearchDirection,
    settings: &DriverSettings,
) -> Result<PlanResult, PlanError> {
    let mut engine = select_engine(strategy, environment, direction)?;
    let outcome = SearchDriver::new(&mut engine, settings.clone()).run(config)?;

    let extractor = PathExtractor::new(environment);
    let state_ids = outcome.solution;
    let path = extractor
        .discrete(&state_ids)
        .collect::<Result<Vec<_>, _>>()?;
    let waypoints = extractor
        .continuous(&state_ids)
        .collect::<Result<Vec<_>, _>>()?;
    let interpolated = extractor.interpolated(&state_ids)?;

    if outcome.solved {
        info!(
            "Planned a path through {} states ({} interpolated poses)",
            path.len(),
            interpolated.len(),
        );
    } else {
        info!("No path was found");
    }

    Ok(PlanResult {
        solved: outcome.solved,
        path,
        state_ids,
        waypoints,
        interpolated,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::test_graphs::ToyGraph,
        environment::{EnvironmentError, EnvironmentKind},
        request::LevelRequest,
    };

    fn free_request(strategy: &str) -> PlanRequest {
        let mut request = PlanRequest::new(strategy, 10, 10, 0.1, vec![0; 100]);
        request.start = Pose::new(0.05, 0.05, 0.0);
        request.goal = Pose::new(0.95, 0.95, 0.0);
        request.settings.time_budget = 5.0;
        request
    }

    fn assert_connects_endpoints(result: &PlanResult) {
        assert!(result.solved);
        assert_eq!(result.path.first(), Some(&DiscretePose::new(0, 0, 0)));
        assert_eq!(result.path.last(), Some(&DiscretePose::new(9, 9, 0)));
        assert_eq!(result.path.len(), result.state_ids.len());
        assert_eq!(result.path.len(), result.waypoints.len());
        assert!(result.interpolated.len() >= result.path.len());
    }

    #[test]
    fn constructible_strategies_get_their_engine() {
        let graph = ToyGraph::chain(3);
        for strategy in [Strategy::AraStar, Strategy::AdStar, Strategy::AnaStar] {
            let engine = select_engine(strategy, &graph, SearchDirection::Forward).unwrap();
            assert_eq!(engine.strategy(), strategy);
        }
    }

    #[test]
    fn inapplicable_strategies_are_refused() {
        // The toy graph reports itself as a plain 2D grid.
        let graph = ToyGraph::chain(3);
        assert!(matches!(
            select_engine(Strategy::Ppcp, &graph, SearchDirection::Forward),
            Err(StrategyError::UnsupportedStrategyForEnvironment { .. })
        ));
        assert!(matches!(
            select_engine(Strategy::RStar, &graph, SearchDirection::Forward),
            Err(StrategyError::EngineUnavailable(Strategy::RStar))
        ));
    }

    #[test]
    fn free_grid_is_solved_by_every_constructible_engine() {
        for strategy in ["arastar", "adstar", "anastar"] {
            let mut request = free_request(strategy);
            request.settings.termination = TerminationPolicy::FirstSolution;
            let result = plan(&request).unwrap();
            assert_connects_endpoints(&result);
            assert!(result.stats.solution_cost.is_some());
        }
    }

    #[test]
    fn full_budget_search_ends_at_epsilon_one() {
        let result = plan(&free_request("arastar")).unwrap();
        assert_connects_endpoints(&result);
        assert_eq!(result.stats.final_epsilon, 1.0);

        let waypoint = result.waypoints[0];
        assert!((waypoint.x - 0.05).abs() < 1e-9);
        assert!((waypoint.y - 0.05).abs() < 1e-9);
    }

    #[test]
    fn backward_search_still_reports_a_forward_path() {
        let mut request = free_request("arastar");
        request.settings.direction = SearchDirection::Backward;
        assert_connects_endpoints(&plan(&request).unwrap());
    }

    #[test]
    fn blocked_endpoints_are_rejected() {
        let mut request = free_request("arastar");
        request.costs = vec![250; 100];
        let err = plan(&request).unwrap_err();
        assert!(err.is_setup_error());
        assert!(matches!(
            err,
            PlanError::Environment(EnvironmentError::EndpointInCollision { .. })
        ));
    }

    #[test]
    fn obstacles_on_an_additional_level_are_avoided() {
        // A wall at x = 5 exists only for the upper level, with a gap at the top.
        let mut upper = vec![0; 100];
        for y in 0..9 {
            upper[y * 10 + 5] = 200;
        }

        let mut request = free_request("arastar");
        request.goal = Pose::new(0.95, 0.05, 0.0);
        request.settings.termination = TerminationPolicy::FirstSolution;
        request.robot.additional_levels = vec![LevelRequest {
            costs: Some(upper),
            ..Default::default()
        }];

        let result = plan(&request).unwrap();
        assert!(result.solved);
        assert_eq!(result.path.last(), Some(&DiscretePose::new(9, 0, 0)));
        assert!(result.path.iter().all(|pose| pose.x != 5 || pose.y == 9));
    }

    #[test]
    fn endpoints_bind_the_same_way_every_time() {
        let mut request = free_request("arastar");
        request.settings.termination = TerminationPolicy::FirstSolution;
        let first_plan = plan(&request).unwrap();
        let second_plan = plan(&request).unwrap();
        assert_connects_endpoints(&first_plan);
        assert_connects_endpoints(&second_plan);
        assert_eq!(first_plan.path.first(), second_plan.path.first());
        assert_eq!(first_plan.path.last(), second_plan.path.last());
        assert_eq!(
            first_plan.state_ids.first(),
            second_plan.state_ids.first()
        );
        assert_eq!(first_plan.state_ids.last(), second_plan.state_ids.last());

        let (first_env, first) = request.build_environment().unwrap();
        let (_, second) = request.build_environment().unwrap();
        assert_eq!(first, second);
        assert_eq!(first_env.pose_of(first.start), Some(DiscretePose::new(0, 0, 0)));
        assert_eq!(first_env.pose_of(first.goal), Some(DiscretePose::new(9, 9, 0)));
        assert_eq!(first_env.kind(), EnvironmentKind::XYThetaMultiLevel);
    }

    #[test]
    fn saturated_action_costs_leave_the_goal_unsolved() {
        for strategy in ["arastar", "adstar"] {
            let mut request = free_request(strategy);
            request.settings.nominal_velocity = 1e-20;
            let result = plan(&request).unwrap();
            assert!(!result.solved);
            assert!(result.path.is_empty());
        }
    }

    #[test]
    fn strategies_without_lattice_support_are_refused() {
        for strategy in ["rstar", "vi", "ppcp"] {
            assert!(matches!(
                plan(&free_request(strategy)),
                Err(PlanError::Strategy(
                    StrategyError::UnsupportedStrategyForEnvironment { .. }
                ))
            ));
        }

        assert!(matches!(
            plan(&free_request("dijkstra")),
            Err(PlanError::Strategy(StrategyError::UnknownStrategy(_)))
        ));
    }

    #[test]
    fn unreachable_goal_is_reported_as_unsolved() {
        let mut request = free_request("arastar");
        for x in 0..10 {
            request.costs[5 * 10 + x] = 200;
        }

        let result = plan(&request).unwrap();
        assert!(!result.solved);
        assert!(result.path.is_empty());
        assert!(result.interpolated.is_empty());
    }
}
