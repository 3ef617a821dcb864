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
    algorithm::{BindError, SearchEngine, SearchError, SearchOutcome, TerminationPolicy},
    environment::MdpConfig,
    error::ThisError,
};
use log::{debug, info};
use std::time::Duration;

/// How a single search should be run.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub time_budget: Duration,
    pub initial_epsilon: f64,
    pub termination: TerminationPolicy,
    pub max_expansions: Option<usize>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(10),
            initial_epsilon: 3.0,
            termination: TerminationPolicy::FullBudget,
            max_expansions: None,
        }
    }
}

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("the search engine rejected the start state: {0}")]
    StartBindingFailed(#[source] BindError),
    #[error("the search engine rejected the goal state: {0}")]
    GoalBindingFailed(#[source] BindError),
    #[error("initial epsilon must be a finite number no smaller than 1.0, but got {0}")]
    InvalidEpsilon(f64),
    #[error("the search failed: {0}")]
    Search(#[from] SearchError),
}

/// Binds the endpoints and settings to an engine, then runs it once.
pub struct SearchDriver<'a, S: ?Sized> {
    engine: &'a mut S,
    settings: DriverSettings,
}

impl<'a, S: SearchEngine + ?Sized> SearchDriver<'a, S> {
    pub fn new(engine: &'a mut S, settings: DriverSettings) -> Self {
        Self { engine, settings }
    }

    pub fn run(self, config: &MdpConfig) -> Result<SearchOutcome, DriverError> {
        let Self { engine, settings } = self;
        engine
            .set_start(config.start)
            .map_err(DriverError::StartBindingFailed)?;
        engine
            .set_goal(config.goal)
            .map_err(DriverError::GoalBindingFailed)?;
        engine
            .set_initial_epsilon(settings.initial_epsilon)
            .map_err(|_| DriverError::InvalidEpsilon(settings.initial_epsilon))?;
        engine.set_termination(settings.termination);
        engine.set_expansion_limit(settings.max_expansions);

        debug!(
            "Running {} from {} to {} with epsilon {} and a budget of {:?}",
            engine.strategy(),
            config.start,
            config.goal,
            settings.initial_epsilon,
            settings.time_budget,
        );

        let outcome = engine.replan(settings.time_budget)?;
        info!(
            "{} {} after {} expansions in {:?} (solutions: {}, cost: {:?}, epsilon: {})",
            engine.strategy(),
            if outcome.solved {
                "found a solution"
            } else {
                "found no solution"
            },
            outcome.stats.expansions,
            outcome.stats.elapsed,
            outcome.stats.solutions,
            outcome.stats.solution_cost,
            outcome.stats.final_epsilon,
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::{test_graphs::ToyGraph, AraStar, SearchDirection},
        environment::StateId,
    };

    fn config(start: usize, goal: usize) -> MdpConfig {
        MdpConfig {
            start: StateId::new(start),
            goal: StateId::new(goal),
        }
    }

    #[test]
    fn binding_errors_name_the_endpoint() {
        let graph = ToyGraph::chain(4);
        let mut engine = AraStar::new(&graph, SearchDirection::Forward);

        let result = SearchDriver::new(&mut engine, DriverSettings::default()).run(&config(9, 3));
        assert_eq!(
            result,
            Err(DriverError::StartBindingFailed(BindError::UnknownState(
                StateId::new(9)
            )))
        );

        let result = SearchDriver::new(&mut engine, DriverSettings::default()).run(&config(0, 9));
        assert!(matches!(result, Err(DriverError::GoalBindingFailed(_))));
    }

    #[test]
    fn epsilon_below_one_is_rejected() {
        let graph = ToyGraph::chain(4);
        let mut engine = AraStar::new(&graph, SearchDirection::Forward);
        let settings = DriverSettings {
            initial_epsilon: 0.5,
            ..Default::default()
        };
        let result = SearchDriver::new(&mut engine, settings).run(&config(0, 3));
        assert_eq!(result, Err(DriverError::InvalidEpsilon(0.5)));
    }

    #[test]
    fn driver_runs_the_engine_to_a_solution() {
        let graph = ToyGraph::chain(4);
        let mut engine = AraStar::new(&graph, SearchDirection::Forward);
        let outcome = SearchDriver::new(&mut engine, DriverSettings::default())
            .run(&config(0, 3))
            .unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.solution.len(), 4);
    }

    #[test]
    fn exhausted_budget_is_not_an_error() {
        let graph = ToyGraph::chain(4);
        let mut engine = AraStar::new(&graph, SearchDirection::Forward);
        let settings = DriverSettings {
            time_budget: Duration::ZERO,
            ..Default::default()
        };
        let outcome = SearchDriver::new(&mut engine, settings)
            .run(&config(0, 3))
            .unwrap();
        assert!(!outcome.solved);
    }
}
