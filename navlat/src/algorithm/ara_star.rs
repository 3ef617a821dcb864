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
    space::{
        run_passes, Endpoints, Frontier, InflatedSearch, Inflation, NodeTable, Pass, QueueEntry,
        SearchNode, SearchSpace,
    },
    validate_epsilon, BindError, SearchDirection, SearchEngine, SearchError, SearchOutcome,
    Strategy, TerminationPolicy,
};
use crate::{
    environment::{Cost, SearchEnvironment, StateId, Transitions, INFINITE_COST},
    halt::{ExpansionLimit, Halt, TimeLimit},
};
use float_ord::FloatOrd;
use log::trace;
use std::time::Duration;

type Key = (FloatOrd<f64>, Cost);

#[derive(Debug, Clone)]
struct Node {
    state: StateId,
    g: Cost,
    h: Cost,
    parent: Option<usize>,
    open: bool,
    /// The improvement pass in which this node was last expanded.
    closed_in: u32,
    incons: bool,
    version: u32,
}

impl Node {
    fn new(state: StateId, h: Cost) -> Self {
        Self {
            state,
            g: INFINITE_COST,
            h,
            parent: None,
            open: false,
            closed_in: 0,
            incons: false,
            version: 0,
        }
    }
}

impl SearchNode for Node {
    fn state(&self) -> StateId {
        self.state
    }

    fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// Anytime Repairing A*. Runs a series of weighted A* searches with a
/// shrinking inflation factor, reusing the work of the previous pass each time.
pub struct AraStar<'e, E> {
    space: SearchSpace<'e, E>,
    nodes: NodeTable<Node>,
    open: Frontier<Key>,
    incons: Vec<usize>,
    inflation: Inflation,
    pass: u32,
    halting: (TimeLimit, ExpansionLimit),
    needs_reset: bool,
    buffer: Transitions,
}

impl<'e, E: SearchEnvironment> AraStar<'e, E> {
    pub fn new(environment: &'e E, direction: SearchDirection) -> Self {
        Self {
            space: SearchSpace::new(environment, direction),
            nodes: NodeTable::default(),
            open: Frontier::default(),
            incons: Vec::new(),
            inflation: Inflation::default(),
            pass: 1,
            halting: (TimeLimit::default(), ExpansionLimit::default()),
            needs_reset: true,
            buffer: Transitions::new(),
        }
    }

    fn reset(&mut self, endpoints: &Endpoints) {
        self.nodes.clear();
        self.open.clear();
        self.incons.clear();
        self.inflation.restart();
        self.pass = 1;
        self.needs_reset = false;

        let h = self.space.heuristic(endpoints.root, endpoints);
        let root = self
            .nodes
            .get_or_insert_with(endpoints.root, || Node::new(endpoints.root, h));
        self.nodes.node_mut(root).g = 0;
        self.push_open(root);
    }

    fn key(&self, index: usize) -> Key {
        let node = self.nodes.node(index);
        (
            FloatOrd(node.g as f64 + self.inflation.epsilon * node.h as f64),
            node.g,
        )
    }

    fn push_open(&mut self, index: usize) {
        let key = self.key(index);
        let node = self.nodes.node_mut(index);
        node.open = true;
        node.version += 1;
        self.open.push(key, index, node.version);
    }

    fn is_current(nodes: &NodeTable<Node>, entry: &QueueEntry<Key>) -> bool {
        let node = nodes.node(entry.node);
        node.open && node.version == entry.version
    }

    fn target_cost(&self, endpoints: &Endpoints) -> Cost {
        self.nodes
            .find(endpoints.target)
            .map(|index| self.nodes.node(index).g)
            .unwrap_or(INFINITE_COST)
    }

    fn expand(&mut self, index: usize, endpoints: &Endpoints) {
        let (state, g) = {
            let node = self.nodes.node_mut(index);
            node.open = false;
            node.closed_in = self.pass;
            (node.state, node.g)
        };
        self.inflation.stats.expansions += 1;
        trace!("ARA* expanding {state} with g = {g}");

        let mut transitions = std::mem::take(&mut self.buffer);
        self.space.expand(state, &mut transitions);
        for (next, cost) in transitions.iter().copied() {
            let space = &self.space;
            let child = self
                .nodes
                .get_or_insert_with(next, || Node::new(next, space.heuristic(next, endpoints)));

            let new_g = g.saturating_add(cost);
            let node = self.nodes.node_mut(child);
            if new_g >= node.g {
                continue;
            }

            node.g = new_g;
            node.parent = Some(index);
            if node.closed_in != self.pass {
                self.push_open(child);
            } else if !node.incons {
                node.incons = true;
                self.incons.push(child);
            }
        }
        self.buffer = transitions;
    }
}

impl<'e, E: SearchEnvironment> InflatedSearch for AraStar<'e, E> {
    const NAME: &'static str = "ARA*";

    fn inflation(&self) -> &Inflation {
        &self.inflation
    }

    fn inflation_mut(&mut self) -> &mut Inflation {
        &mut self.inflation
    }

    fn improve_path(&mut self, endpoints: &Endpoints) -> Pass {
        loop {
            let target_cost = self.target_cost(endpoints) as f64;
            let nodes = &self.nodes;
            let Some(top) = self.open.peek(|entry| Self::is_current(nodes, entry)) else {
                return Pass::Finished;
            };

            if top.key.0 >= FloatOrd(target_cost) {
                return Pass::Finished;
            }

            if self.halting.halt(&self.inflation.stats) {
                return Pass::Halted;
            }

            let nodes = &self.nodes;
            let Some(top) = self.open.pop(|entry| Self::is_current(nodes, entry)) else {
                return Pass::Finished;
            };
            self.expand(top.node, endpoints);
        }
    }

    /// Move the inconsistent states back into the open list and re-key
    /// everything for the new epsilon.
    fn start_pass(&mut self) {
        self.pass += 1;
        for index in std::mem::take(&mut self.incons) {
            let node = self.nodes.node_mut(index);
            node.incons = false;
            node.open = true;
        }

        self.open.clear();
        let open: Vec<usize> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.open)
            .map(|(index, _)| index)
            .collect();
        for index in open {
            self.push_open(index);
        }
    }

    fn target(&self, endpoints: &Endpoints) -> Option<(usize, Cost)> {
        let index = self.nodes.find(endpoints.target)?;
        Some((index, self.nodes.node(index).g))
    }

    fn path_to(&self, node: usize) -> Vec<StateId> {
        self.space.orient(self.nodes.retrace(node))
    }
}

impl<'e, E: SearchEnvironment> SearchEngine for AraStar<'e, E> {
    fn strategy(&self) -> Strategy {
        Strategy::AraStar
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
        let epsilon = validate_epsilon(epsilon)?;
        if epsilon != self.inflation.initial_epsilon {
            self.inflation.initial_epsilon = epsilon;
            self.needs_reset = true;
        }
        Ok(())
    }

    fn set_termination(&mut self, policy: TerminationPolicy) {
        self.inflation.termination = policy;
    }

    fn set_expansion_limit(&mut self, limit: Option<usize>) {
        self.halting.1 = ExpansionLimit(limit);
    }

    fn replan(&mut self, budget: Duration) -> Result<SearchOutcome, SearchError> {
        let endpoints = self.space.endpoints()?;
        self.halting.0.restart(budget);
        let resume = !self.needs_reset;
        if self.needs_reset {
            self.reset(&endpoints);
        }

        run_passes(self, &endpoints, resume);
        self.inflation.stats.elapsed = self.halting.0.elapsed();
        Ok(self.inflation.outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::test_graphs::{ids, ToyGraph};

    fn engine(graph: &ToyGraph, direction: SearchDirection) -> AraStar<'_, ToyGraph> {
        let mut engine = AraStar::new(graph, direction);
        engine.set_start(StateId::new(0)).unwrap();
        engine.set_goal(graph.last()).unwrap();
        engine.set_initial_epsilon(3.0).unwrap();
        engine
    }

    #[test]
    fn first_solution_is_bounded_suboptimal() {
        let graph = ToyGraph::two_routes();
        let mut engine = engine(&graph, SearchDirection::Forward);
        engine.set_termination(TerminationPolicy::FirstSolution);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.solution, ids(&[0, 1, 4]));
        assert_eq!(outcome.stats.solution_cost, Some(10));
        assert_eq!(outcome.stats.final_epsilon, 3.0);
    }

    #[test]
    fn full_budget_reaches_the_optimal_solution() {
        let graph = ToyGraph::two_routes();
        let mut engine = engine(&graph, SearchDirection::Forward);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.solution, ids(&[0, 2, 3, 4]));
        assert_eq!(outcome.stats.solution_cost, Some(6));
        assert_eq!(outcome.stats.solutions, 2);
        assert_eq!(outcome.stats.final_epsilon, 1.0);
    }

    #[test]
    fn replanning_improves_a_first_solution() {
        let graph = ToyGraph::two_routes();
        let mut engine = engine(&graph, SearchDirection::Forward);
        engine.set_termination(TerminationPolicy::FirstSolution);
        let first = engine.replan(Duration::from_secs(10)).unwrap();
        assert_eq!(first.stats.solution_cost, Some(10));

        engine.set_termination(TerminationPolicy::FullBudget);
        let improved = engine.replan(Duration::from_secs(10)).unwrap();
        assert_eq!(improved.solution, ids(&[0, 2, 3, 4]));
    }

    #[test]
    fn backward_search_returns_a_start_to_goal_path() {
        let graph = ToyGraph::two_routes();
        let mut engine = engine(&graph, SearchDirection::Backward);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.solution, ids(&[0, 2, 3, 4]));
        assert_eq!(outcome.stats.solution_cost, Some(6));
    }

    #[test]
    fn unreachable_goal_is_not_an_error() {
        let graph = ToyGraph::disconnected();
        let mut engine = engine(&graph, SearchDirection::Forward);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert!(!outcome.solved);
        assert!(outcome.solution.is_empty());
        assert_eq!(outcome.stats.expansions, 2);
    }

    #[test]
    fn halting_before_any_solution_leaves_it_unsolved() {
        let graph = ToyGraph::chain(50);
        let mut engine = engine(&graph, SearchDirection::Forward);
        engine.set_expansion_limit(Some(10));
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert!(!outcome.solved);
        assert_eq!(outcome.stats.expansions, 10);

        let outcome = engine.replan(Duration::ZERO).unwrap();
        assert!(!outcome.solved);
    }

    #[test]
    fn endpoints_must_be_bound_before_searching() {
        let graph = ToyGraph::chain(3);
        let mut engine = AraStar::new(&graph, SearchDirection::Forward);
        assert_eq!(
            engine.replan(Duration::from_secs(1)),
            Err(SearchError::MissingStart)
        );
        assert_eq!(
            engine.set_goal(StateId::new(7)),
            Err(BindError::UnknownState(StateId::new(7)))
        );
        assert_eq!(
            engine.set_initial_epsilon(0.9),
            Err(SearchError::InvalidEpsilon(0.9))
        );
    }
}
