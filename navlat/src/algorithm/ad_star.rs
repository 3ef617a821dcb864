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

/// Primary key `g + ε·h`, ties broken by the smaller `g`.
type Key = (FloatOrd<f64>, Cost);

#[derive(Debug, Clone)]
struct Node {
    state: StateId,
    /// Cost of the best known path from the root.
    g: Cost,
    /// Value of `g` when the node was last expanded.
    v: Cost,
    h: Cost,
    parent: Option<usize>,
    open: bool,
    closed_in: u32,
    version: u32,
}

impl Node {
    fn new(state: StateId, h: Cost) -> Self {
        Self {
            state,
            g: INFINITE_COST,
            v: INFINITE_COST,
            h,
            parent: None,
            open: false,
            closed_in: 0,
            version: 0,
        }
    }

    fn consistent(&self) -> bool {
        self.v == self.g
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

/// Anytime D*. Every state remembers the value it had when it was last
/// expanded, and a state is queued whenever that value no longer agrees with
/// its current cost. Between passes the inflation shrinks and every
/// inconsistent state is queued again.
///
/// The environments in this crate never change after they are frozen, so only
/// overconsistent states (cheaper than when last expanded) can arise.
pub struct AdStar<'e, E> {
    space: SearchSpace<'e, E>,
    nodes: NodeTable<Node>,
    open: Frontier<Key>,
    inflation: Inflation,
    pass: u32,
    halting: (TimeLimit, ExpansionLimit),
    needs_reset: bool,
    buffer: Transitions,
}

impl<'e, E: SearchEnvironment> AdStar<'e, E> {
    pub fn new(environment: &'e E, direction: SearchDirection) -> Self {
        Self {
            space: SearchSpace::new(environment, direction),
            nodes: NodeTable::default(),
            open: Frontier::default(),
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
        self.inflation.restart();
        self.pass = 1;
        self.needs_reset = false;

        let h = self.space.heuristic(endpoints.root, endpoints);
        let root = self
            .nodes
            .get_or_insert_with(endpoints.root, || Node::new(endpoints.root, h));
        self.nodes.node_mut(root).g = 0;
        self.update_membership(root);
    }

    fn key(&self, node: &Node) -> Key {
        (
            FloatOrd(node.g as f64 + self.inflation.epsilon * node.h as f64),
            node.g,
        )
    }

    /// Queue the node if it is inconsistent and was not already expanded in
    /// this pass. Consistent nodes leave the queue.
    fn update_membership(&mut self, index: usize) {
        let key = self.key(self.nodes.node(index));
        let pass = self.pass;
        let node = self.nodes.node_mut(index);
        if node.consistent() {
            node.open = false;
        } else if node.closed_in != pass {
            node.open = true;
            node.version += 1;
            self.open.push(key, index, node.version);
        }
    }

    fn is_current(nodes: &NodeTable<Node>, entry: &QueueEntry<Key>) -> bool {
        let node = nodes.node(entry.node);
        node.open && node.version == entry.version
    }

    fn target_key(&self, endpoints: &Endpoints) -> Key {
        match self.nodes.find(endpoints.target) {
            Some(index) => {
                let g = self.nodes.node(index).g;
                (FloatOrd(g as f64), g)
            }
            None => (FloatOrd(f64::INFINITY), INFINITE_COST),
        }
    }

    fn expand(&mut self, index: usize, endpoints: &Endpoints) {
        let (state, v) = {
            let node = self.nodes.node_mut(index);
            node.open = false;
            node.closed_in = self.pass;
            node.v = node.g;
            (node.state, node.v)
        };
        self.inflation.stats.expansions += 1;
        trace!("AD* expanding {state} with v = {v}");

        let mut transitions = std::mem::take(&mut self.buffer);
        self.space.expand(state, &mut transitions);
        for (next, cost) in transitions.iter().copied() {
            let space = &self.space;
            let child = self
                .nodes
                .get_or_insert_with(next, || Node::new(next, space.heuristic(next, endpoints)));

            let new_g = v.saturating_add(cost);
            let node = self.nodes.node_mut(child);
            if new_g < node.g {
                node.g = new_g;
                node.parent = Some(index);
                self.update_membership(child);
            }
        }
        self.buffer = transitions;
    }
}

impl<'e, E: SearchEnvironment> InflatedSearch for AdStar<'e, E> {
    const NAME: &'static str = "AD*";

    fn inflation(&self) -> &Inflation {
        &self.inflation
    }

    fn inflation_mut(&mut self) -> &mut Inflation {
        &mut self.inflation
    }

    fn improve_path(&mut self, endpoints: &Endpoints) -> Pass {
        loop {
            let target_key = self.target_key(endpoints);
            let nodes = &self.nodes;
            let Some(top) = self.open.peek(|entry| Self::is_current(nodes, entry)) else {
                return Pass::Finished;
            };

            if top.key >= target_key {
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

    /// Re-key the queue for the current epsilon and bring back every state
    /// whose value changed after it was expanded.
    fn start_pass(&mut self) {
        self.pass += 1;
        self.open.clear();
        let inconsistent: Vec<usize> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.consistent())
            .map(|(index, _)| index)
            .collect();
        for index in inconsistent {
            self.update_membership(index);
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

impl<'e, E: SearchEnvironment> SearchEngine for AdStar<'e, E> {
    fn strategy(&self) -> Strategy {
        Strategy::AdStar
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

    fn engine(graph: &ToyGraph, direction: SearchDirection) -> AdStar<'_, ToyGraph> {
        let mut engine = AdStar::new(graph, direction);
        engine.set_start(StateId::new(0)).unwrap();
        engine.set_goal(graph.last()).unwrap();
        engine.set_initial_epsilon(3.0).unwrap();
        engine
    }

    #[test]
    fn inflated_pass_takes_the_expensive_route() {
        let graph = ToyGraph::two_routes();
        let mut engine = engine(&graph, SearchDirection::Forward);
        engine.set_termination(TerminationPolicy::FirstSolution);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.solution, ids(&[0, 1, 4]));
        assert_eq!(outcome.stats.final_epsilon, 3.0);
    }

    #[test]
    fn improvement_passes_find_the_optimum() {
        for direction in [SearchDirection::Forward, SearchDirection::Backward] {
            let graph = ToyGraph::two_routes();
            let mut engine = engine(&graph, direction);
            let outcome = engine.replan(Duration::from_secs(10)).unwrap();
            assert!(outcome.solved);
            assert_eq!(outcome.solution, ids(&[0, 2, 3, 4]));
            assert_eq!(outcome.stats.solution_cost, Some(6));
            assert_eq!(outcome.stats.final_epsilon, 1.0);
        }
    }

    #[test]
    fn chain_is_solved_in_one_pass() {
        let graph = ToyGraph::chain(20);
        let mut engine = engine(&graph, SearchDirection::Forward);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.solution, (0..20).map(StateId::new).collect::<Vec<_>>());
        assert_eq!(outcome.stats.solution_cost, Some(19));
        assert_eq!(outcome.stats.solutions, 1);
    }

    #[test]
    fn unreachable_goal_exhausts_the_search() {
        let graph = ToyGraph::disconnected();
        let mut engine = engine(&graph, SearchDirection::Backward);
        let outcome = engine.replan(Duration::from_secs(10)).unwrap();
        assert!(!outcome.solved);
        assert_eq!(outcome.stats.expansions, 1);
    }
}
