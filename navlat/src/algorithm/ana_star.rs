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
    space::{Endpoints, Frontier, NodeTable, QueueEntry, SearchNode, SearchSpace},
    validate_epsilon, BindError, SearchDirection, SearchEngine, SearchError, SearchOutcome,
    SearchStats, Strategy, TerminationPolicy,
};
use crate::{
    environment::{Cost, SearchEnvironment, StateId, Transitions, INFINITE_COST},
    halt::{ExpansionLimit, Halt, TimeLimit},
};
use float_ord::FloatOrd;
use log::{debug, trace};
use std::{cmp::Reverse, time::Duration};

/// The largest `e(s) = (G - g(s)) / h(s)` comes first, ties broken by the
/// smaller heuristic.
type Key = (Reverse<FloatOrd<f64>>, Cost);

#[derive(Debug, Clone)]
struct Node {
    state: StateId,
    g: Cost,
    h: Cost,
    parent: Option<usize>,
    open: bool,
    version: u32,
}

impl SearchNode for Node {
    fn state(&self) -> StateId {
        self.state
    }

    fn parent(&self) -> Option<usize> {
        self.parent
    }
}

enum Improvement {
    Improved,
    Exhausted,
    Halted,
}

/// Anytime Nonparametric A*. Always expands the state with the greatest
/// potential to improve on the current solution, so it needs no inflation
/// factor. The initial epsilon is accepted but has no effect.
pub struct AnaStar<'e, E> {
    space: SearchSpace<'e, E>,
    nodes: NodeTable<Node>,
    open: Frontier<Key>,
    /// Cost of the best solution so far.
    best_cost: Cost,
    termination: TerminationPolicy,
    halting: (TimeLimit, ExpansionLimit),
    stats: SearchStats,
    best: Option<Vec<StateId>>,
    needs_reset: bool,
    exhausted: bool,
    buffer: Transitions,
}

impl<'e, E: SearchEnvironment> AnaStar<'e, E> {
    pub fn new(environment: &'e E, direction: SearchDirection) -> Self {
        Self {
            space: SearchSpace::new(environment, direction),
            nodes: NodeTable::default(),
            open: Frontier::default(),
            best_cost: INFINITE_COST,
            termination: TerminationPolicy::default(),
            halting: (TimeLimit::default(), ExpansionLimit::default()),
            stats: SearchStats::default(),
            best: None,
            needs_reset: true,
            exhausted: false,
            buffer: Transitions::new(),
        }
    }

    fn reset(&mut self, endpoints: &Endpoints) {
        self.nodes.clear();
        self.open.clear();
        self.best_cost = INFINITE_COST;
        self.stats = SearchStats::default();
        self.best = None;
        self.exhausted = false;
        self.needs_reset = false;

        let h = self.space.heuristic(endpoints.root, endpoints);
        let root = self.nodes.get_or_insert_with(endpoints.root, || Node {
            state: endpoints.root,
            g: 0,
            h,
            parent: None,
            open: false,
            version: 0,
        });
        self.push_open(root);
    }

    fn potential(&self, node: &Node) -> f64 {
        if node.h == 0 {
            return f64::INFINITY;
        }

        let best = if self.best_cost == INFINITE_COST {
            f64::INFINITY
        } else {
            self.best_cost as f64
        };
        (best - node.g as f64) / node.h as f64
    }

    fn push_open(&mut self, index: usize) {
        let key = {
            let node = self.nodes.node(index);
            (Reverse(FloatOrd(self.potential(node))), node.h)
        };
        let node = self.nodes.node_mut(index);
        node.open = true;
        node.version += 1;
        self.open.push(key, index, node.version);
    }

    fn is_current(nodes: &NodeTable<Node>, entry: &QueueEntry<Key>) -> bool {
        let node = nodes.node(entry.node);
        node.open && node.version == entry.version
    }

    fn improve_solution(&mut self, endpoints: &Endpoints) -> Improvement {
        loop {
            if self.halting.halt(&self.stats) {
                return Improvement::Halted;
            }

            let nodes = &self.nodes;
            let Some(top) = self.open.pop(|entry| Self::is_current(nodes, entry)) else {
                return Improvement::Exhausted;
            };

            let index = top.node;
            let (state, g) = {
                let node = self.nodes.node_mut(index);
                node.open = false;
                (node.state, node.g)
            };

            if state == endpoints.target {
                self.best_cost = g;
                return Improvement::Improved;
            }

            self.stats.expansions += 1;
            trace!("ANA* expanding {state} with g = {g}");

            let mut transitions = std::mem::take(&mut self.buffer);
            self.space.expand(state, &mut transitions);
            for (next, cost) in transitions.iter().copied() {
                let space = &self.space;
                let child = self.nodes.get_or_insert_with(next, || Node {
                    state: next,
                    g: INFINITE_COST,
                    h: space.heuristic(next, endpoints),
                    parent: None,
                    open: false,
                    version: 0,
                });

                let new_g = g.saturating_add(cost);
                let best_cost = self.best_cost;
                let node = self.nodes.node_mut(child);
                if new_g >= node.g {
                    continue;
                }

                node.g = new_g;
                node.parent = Some(index);
                if new_g.saturating_add(node.h) < best_cost {
                    self.push_open(child);
                }
            }
            self.buffer = transitions;
        }
    }

    /// Drop the states that can no longer lead to a better solution and re-key
    /// the rest. Returns the suboptimality bound of the current solution.
    fn prune(&mut self) -> f64 {
        let best_cost = self.best_cost;
        let open: Vec<(usize, Cost)> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.open)
            .map(|(index, node)| (index, node.g.saturating_add(node.h)))
            .collect();

        self.open.clear();
        let mut lower_bound = INFINITE_COST;
        for (index, f) in open {
            if f < best_cost {
                lower_bound = lower_bound.min(f);
                self.push_open(index);
            } else {
                self.nodes.node_mut(index).open = false;
            }
        }

        if lower_bound == INFINITE_COST || lower_bound == 0 {
            1.0
        } else {
            (best_cost as f64 / lower_bound as f64).max(1.0)
        }
    }

    fn record_solution(&mut self, endpoints: &Endpoints) {
        let Some(target) = self.nodes.find(endpoints.target) else {
            return;
        };

        self.stats.solutions += 1;
        self.stats.solution_cost = Some(self.best_cost);
        self.best = Some(self.space.orient(self.nodes.retrace(target)));
        self.stats.final_epsilon = self.prune();
        debug!(
            "ANA* found a solution of cost {} within a factor of {:.2} of optimal after {} expansions",
            self.best_cost, self.stats.final_epsilon, self.stats.expansions,
        );
    }
}

impl<'e, E: SearchEnvironment> SearchEngine for AnaStar<'e, E> {
    fn strategy(&self) -> Strategy {
        Strategy::AnaStar
    }

    fn set_start(&mut self, state: StateId) -> Result<(), BindError> {
        self.needs_reset |= self.space.set_start(state)?;
        Ok(())
    }

    fn set_goal(&mut self, state: StateId) -> Result<(), BindError> {
        self.needs_reset |= self.space.set_goal(state)?;
        Ok(())
    }

    fn set_initial_epsilon(&mut self, epsilon: f64) -> Result<(), SearchError> {
        validate_epsilon(epsilon).map(|_| ())
    }

    fn set_termination(&mut self, policy: TerminationPolicy) {
        self.termination = policy;
    }

    fn set_expansion_limit(&mut self, limit: Option<usize>) {
        self.halting.1 = ExpansionLimit(limit);
    }

    fn replan(&mut self, budget: Duration) -> Result<SearchOutcome, SearchError> {
        let endpoints = self.space.endpoints()?;
        self.halting.0.restart(budget);
        if self.needs_reset {
            self.reset(&endpoints);
        }

        while !self.exhausted {
            match self.improve_solution(&endpoints) {
                Improvement::Improved => {
                    self.record_solution(&endpoints);
                    if self.termination == TerminationPolicy::FirstSolution {
                        break;
                    }
                }
                Improvement::Exhausted => {
                    if self.best.is_some() {
                        self.stats.final_epsilon = 1.0;
                    }
                    self.exhausted = true;
                }
                Improvement::Halted => {
                    debug!("ANA* halted after {} expansions", self.stats.expansions);
                    break;
                }
            }
        }

        self.stats.elapsed = self.halting.0.elapsed();
        Ok(SearchOutcome {
            solved: self.best.is_some(),
            solution: self.best.clone().unwrap_or_default(),
            stats: self.stats.clone(),
        })
    }
}
