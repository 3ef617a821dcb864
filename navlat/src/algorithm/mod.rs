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

//! Anytime heuristic search engines over a [`SearchEnvironment`].

pub mod space;

pub mod ara_star;
pub use ara_star::AraStar;

pub mod ad_star;
pub use ad_star::AdStar;

pub mod ana_star;
pub use ana_star::AnaStar;

use crate::{
    environment::{Cost, EnvironmentKind, StateId},
    error::ThisError,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// The closed set of search strategies that can be requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Anytime Dynamic A*.
    AdStar,
    /// Anytime Repairing A*.
    AraStar,
    /// Probabilistic planning with clear preferences.
    Ppcp,
    /// Randomized A*.
    RStar,
    /// Value iteration.
    ValueIteration,
    /// Anytime Nonparametric A*.
    AnaStar,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::AdStar,
        Strategy::AraStar,
        Strategy::Ppcp,
        Strategy::RStar,
        Strategy::ValueIteration,
        Strategy::AnaStar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::AdStar => "adstar",
            Strategy::AraStar => "arastar",
            Strategy::Ppcp => "ppcp",
            Strategy::RStar => "rstar",
            Strategy::ValueIteration => "vi",
            Strategy::AnaStar => "anastar",
        }
    }

    /// Whether the strategy may be used on an environment of this kind.
    pub fn supports(&self, kind: EnvironmentKind) -> bool {
        use EnvironmentKind::*;
        match self {
            Strategy::AdStar | Strategy::AraStar | Strategy::AnaStar => {
                !matches!(kind, Grid2DUncertain)
            }
            Strategy::RStar => matches!(kind, Grid2D | RobotArm),
            Strategy::Ppcp | Strategy::ValueIteration => matches!(kind, Grid2DUncertain),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == lower)
            .ok_or_else(|| StrategyError::UnknownStrategy(s.to_owned()))
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("unknown planning strategy [{0}]")]
    UnknownStrategy(String),
    #[error("the {strategy} strategy cannot be used on a {environment} environment")]
    UnsupportedStrategyForEnvironment {
        strategy: Strategy,
        environment: EnvironmentKind,
    },
    #[error("no search engine is available for the {0} strategy")]
    EngineUnavailable(Strategy),
}

/// Which end of the problem the search grows from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDirection {
    /// Grow the search tree from the start towards the goal.
    #[default]
    Forward,
    /// Grow the search tree from the goal back towards the start.
    Backward,
}

/// When an anytime engine should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Return as soon as any solution is found.
    FirstSolution,
    /// Keep improving the solution until the budget runs out or the solution
    /// is proven optimal.
    #[default]
    FullBudget,
}

/// The `Measure` trait can be implemented by search memory types to provide an
/// indication of how large their current level of effort is. This may be used
/// to halt search efforts that have grown excessively large.
pub trait Measure {
    fn size(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchStats {
    /// Number of states expanded since the engine was last reset.
    pub expansions: usize,
    /// Number of solutions found, each one at least as good as the previous.
    pub solutions: usize,
    /// Suboptimality bound of the last solution.
    pub final_epsilon: f64,
    pub solution_cost: Option<Cost>,
    /// Wall-clock time spent in the last call to `replan`.
    pub elapsed: Duration,
}

impl Default for SearchStats {
    fn default() -> Self {
        Self {
            expansions: 0,
            solutions: 0,
            final_epsilon: f64::INFINITY,
            solution_cost: None,
            elapsed: Duration::ZERO,
        }
    }
}

impl Measure for SearchStats {
    fn size(&self) -> usize {
        self.expansions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub solved: bool,
    /// The best solution found, ordered from start to goal. Empty when
    /// nothing was found.
    pub solution: Vec<StateId>,
    pub stats: SearchStats,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("state {0} does not exist in the environment")]
    UnknownState(StateId),
}

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("the search has no start state")]
    MissingStart,
    #[error("the search has no goal state")]
    MissingGoal,
    #[error("epsilon must be a finite number no smaller than 1.0, but got {0}")]
    InvalidEpsilon(f64),
}

pub(crate) fn validate_epsilon(epsilon: f64) -> Result<f64, SearchError> {
    if epsilon.is_finite() && epsilon >= 1.0 {
        Ok(epsilon)
    } else {
        Err(SearchError::InvalidEpsilon(epsilon))
    }
}

/// The capabilities that the search driver needs from an engine.
pub trait SearchEngine {
    fn strategy(&self) -> Strategy;

    fn set_start(&mut self, state: StateId) -> Result<(), BindError>;

    fn set_goal(&mut self, state: StateId) -> Result<(), BindError>;

    /// Set the inflation of the heuristic for the first solution. Engines that
    /// do not inflate their heuristic accept and ignore any valid value.
    fn set_initial_epsilon(&mut self, epsilon: f64) -> Result<(), SearchError>;

    fn set_termination(&mut self, policy: TerminationPolicy);

    /// Cap the total number of expansions, or remove the cap with None.
    fn set_expansion_limit(&mut self, limit: Option<usize>);

    /// Search for at most `budget` of wall-clock time. Calling this again
    /// without changing the start, goal or epsilon continues to improve the
    /// previous solution.
    fn replan(&mut self, budget: Duration) -> Result<SearchOutcome, SearchError>;
}

#[cfg(test)]
pub(crate) mod test_graphs {
    use crate::environment::{
        Cost, EnvironmentKind, SearchEnvironment, StateId, Transitions,
    };
    use crate::motion::DiscretePose;

    /// A weighted directed graph with an admissible heuristic given per state
    /// as a distance to the last state.
    pub struct ToyGraph {
        pub edges: Vec<Vec<(usize, Cost)>>,
        pub heuristic: Vec<Cost>,
    }

    impl ToyGraph {
        /// Two routes from 0 to 4: 0-1-4 costs 10, 0-2-3-4 costs 6. Once the
        /// heuristic is inflated it favours the expensive route, so inflated
        /// searches find that one first.
        pub fn two_routes() -> Self {
            Self {
                edges: vec![
                    vec![(1, 2), (2, 2)],
                    vec![(4, 8)],
                    vec![(3, 2)],
                    vec![(4, 2)],
                    vec![],
                ],
                heuristic: vec![5, 3, 4, 2, 0],
            }
        }

        /// A chain 0 -> 1 -> ... -> n-1 with unit costs.
        pub fn chain(n: usize) -> Self {
            Self {
                edges: (0..n)
                    .map(|i| if i + 1 < n { vec![(i + 1, 1)] } else { vec![] })
                    .collect(),
                heuristic: (0..n).map(|i| (n - 1 - i) as Cost).collect(),
            }
        }

        /// A graph where the last state cannot be reached.
        pub fn disconnected() -> Self {
            Self {
                edges: vec![vec![(1, 1)], vec![(0, 1)], vec![]],
                heuristic: vec![0, 0, 0],
            }
        }

        pub fn last(&self) -> StateId {
            StateId::new(self.edges.len() - 1)
        }
    }

    impl SearchEnvironment for ToyGraph {
        fn kind(&self) -> EnvironmentKind {
            EnvironmentKind::Grid2D
        }

        fn state_count(&self) -> usize {
            self.edges.len()
        }

        fn successors(&self, id: StateId, out: &mut Transitions) {
            out.clear();
            for (next, cost) in &self.edges[id.index()] {
                out.push((StateId::new(*next), *cost));
            }
        }

        fn predecessors(&self, id: StateId, out: &mut Transitions) {
            out.clear();
            for (from, edges) in self.edges.iter().enumerate() {
                for (to, cost) in edges {
                    if *to == id.index() {
                        out.push((StateId::new(from), *cost));
                    }
                }
            }
        }

        /// Only meaningful towards the last state, which is how the tests use
        /// it in both directions.
        fn heuristic(&self, from: StateId, to: StateId) -> Cost {
            let last = self.edges.len() - 1;
            if to.index() == last {
                self.heuristic[from.index()]
            } else if from.index() == 0 {
                // Backward searches estimate the distance from the start.
                self.heuristic[0].saturating_sub(self.heuristic[to.index()])
            } else {
                0
            }
        }

        fn state_pose(&self, id: StateId) -> Option<DiscretePose> {
            Some(DiscretePose::new(id.index() as i32, 0, 0))
        }
    }

    pub fn ids(ids: &[usize]) -> Vec<StateId> {
        ids.iter().map(|i| StateId::new(*i)).collect()
    }
}
