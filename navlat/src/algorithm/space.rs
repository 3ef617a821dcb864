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

//! Pieces shared by the search engines: the view of the environment from the
//! root of the search tree, the node arena and the priority queue.

use super::{
    BindError, SearchDirection, SearchError, SearchOutcome, SearchStats, TerminationPolicy,
};
use crate::environment::{Cost, SearchEnvironment, StateId, Transitions, INFINITE_COST};
use log::debug;
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

/// The two ends of the search tree. The root is where the tree grows from and
/// the target is the state the tree is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub root: StateId,
    pub target: StateId,
}

/// An environment together with a search direction and the bound endpoints.
#[derive(Debug)]
pub struct SearchSpace<'e, E> {
    environment: &'e E,
    direction: SearchDirection,
    start: Option<StateId>,
    goal: Option<StateId>,
}

impl<'e, E: SearchEnvironment> SearchSpace<'e, E> {
    pub fn new(environment: &'e E, direction: SearchDirection) -> Self {
        Self {
            environment,
            direction,
            start: None,
            goal: None,
        }
    }

    /// Returns true if the start is different from before.
    pub fn set_start(&mut self, state: StateId) -> Result<bool, BindError> {
        Self::bind(self.environment, &mut self.start, state)
    }

    /// Returns true if the goal is different from before.
    pub fn set_goal(&mut self, state: StateId) -> Result<bool, BindError> {
        Self::bind(self.environment, &mut self.goal, state)
    }

    fn bind(
        environment: &E,
        slot: &mut Option<StateId>,
        state: StateId,
    ) -> Result<bool, BindError> {
        if !environment.contains(state) {
            return Err(BindError::UnknownState(state));
        }

        let changed = *slot != Some(state);
        *slot = Some(state);
        Ok(changed)
    }

    pub fn endpoints(&self) -> Result<Endpoints, SearchError> {
        let start = self.start.ok_or(SearchError::MissingStart)?;
        let goal = self.goal.ok_or(SearchError::MissingGoal)?;
        Ok(match self.direction {
            SearchDirection::Forward => Endpoints {
                root: start,
                target: goal,
            },
            SearchDirection::Backward => Endpoints {
                root: goal,
                target: start,
            },
        })
    }

    /// The neighbors that the search tree can grow into from `state`.
    pub fn expand(&self, state: StateId, out: &mut Transitions) {
        match self.direction {
            SearchDirection::Forward => self.environment.successors(state, out),
            SearchDirection::Backward => self.environment.predecessors(state, out),
        }
    }

    /// Estimated cost between `state` and the target of the search.
    pub fn heuristic(&self, state: StateId, endpoints: &Endpoints) -> Cost {
        match self.direction {
            SearchDirection::Forward => self.environment.heuristic(state, endpoints.target),
            SearchDirection::Backward => self.environment.heuristic(endpoints.target, state),
        }
    }

    /// Turn a sequence retraced from the target back to the root into a path
    /// from start to goal.
    pub fn orient(&self, mut retraced: Vec<StateId>) -> Vec<StateId> {
        if self.direction == SearchDirection::Forward {
            retraced.reverse();
        }

        retraced
    }
}

pub trait SearchNode {
    fn state(&self) -> StateId;
    fn parent(&self) -> Option<usize>;
}

/// Arena of search nodes with a lookup from state to node.
#[derive(Debug)]
pub struct NodeTable<N> {
    lookup: HashMap<StateId, usize>,
    nodes: Vec<N>,
}

impl<N> Default for NodeTable<N> {
    fn default() -> Self {
        Self {
            lookup: HashMap::new(),
            nodes: Vec::new(),
        }
    }
}

impl<N: SearchNode> NodeTable<N> {
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.nodes.clear();
    }

    pub fn find(&self, state: StateId) -> Option<usize> {
        self.lookup.get(&state).copied()
    }

    pub fn get_or_insert_with(&mut self, state: StateId, make: impl FnOnce() -> N) -> usize {
        if let Some(index) = self.lookup.get(&state) {
            return *index;
        }

        let index = self.nodes.len();
        self.nodes.push(make());
        self.lookup.insert(state, index);
        index
    }

    pub fn node(&self, index: usize) -> &N {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut N {
        &mut self.nodes[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &N)> {
        self.nodes.iter().enumerate()
    }

    /// States from the given node back to the root of the tree.
    pub fn retrace(&self, from: usize) -> Vec<StateId> {
        let mut states = Vec::new();
        let mut next = Some(from);
        while let Some(index) = next {
            if states.len() > self.nodes.len() {
                // Every edge has a positive cost, so this means the parent
                // chain is corrupted.
                break;
            }

            let node = &self.nodes[index];
            states.push(node.state());
            next = node.parent();
        }

        states
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry<K> {
    pub key: K,
    pub node: usize,
    /// Entries whose version no longer matches their node are stale.
    pub version: u32,
}

impl<K: Ord> Ord for QueueEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so that the binary heap pops the smallest key first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl<K: Ord> PartialOrd for QueueEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-priority queue with lazy deletion of stale entries.
#[derive(Debug)]
pub struct Frontier<K> {
    heap: BinaryHeap<QueueEntry<K>>,
}

impl<K: Ord> Default for Frontier<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<K: Ord> Frontier<K> {
    pub fn push(&mut self, key: K, node: usize, version: u32) {
        self.heap.push(QueueEntry { key, node, version });
    }

    /// Pop the smallest entry for which `is_current` holds, discarding stale
    /// entries along the way.
    pub fn pop(&mut self, mut is_current: impl FnMut(&QueueEntry<K>) -> bool) -> Option<QueueEntry<K>> {
        while let Some(entry) = self.heap.pop() {
            if is_current(&entry) {
                return Some(entry);
            }
        }

        None
    }

    /// Peek at the smallest entry for which `is_current` holds, discarding
    /// stale entries along the way.
    pub fn peek(&mut self, mut is_current: impl FnMut(&QueueEntry<K>) -> bool) -> Option<&QueueEntry<K>> {
        while let Some(entry) = self.heap.peek() {
            if is_current(entry) {
                break;
            }
            self.heap.pop();
        }

        self.heap.peek()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// How much epsilon shrinks between consecutive improvement passes.
pub const EPSILON_DECREMENT: f64 = 0.2;

/// How far a weighted pass got before it returned.
pub enum Pass {
    Finished,
    Halted,
}

/// The inflation schedule and incumbent solution of an engine that runs a
/// series of weighted A* passes with a shrinking epsilon.
#[derive(Debug, Clone)]
pub struct Inflation {
    pub initial_epsilon: f64,
    pub epsilon: f64,
    pub termination: TerminationPolicy,
    pub stats: SearchStats,
    pub best: Option<Vec<StateId>>,
    /// No later pass can change the result.
    pub exhausted: bool,
}

impl Default for Inflation {
    fn default() -> Self {
        Self {
            initial_epsilon: 1.0,
            epsilon: 1.0,
            termination: TerminationPolicy::default(),
            stats: SearchStats::default(),
            best: None,
            exhausted: false,
        }
    }
}

impl Inflation {
    /// Forget every solution and go back to the initial epsilon.
    pub fn restart(&mut self) {
        self.epsilon = self.initial_epsilon;
        self.stats = SearchStats::default();
        self.best = None;
        self.exhausted = false;
    }

    fn shrink(&mut self) {
        self.epsilon = (self.epsilon - EPSILON_DECREMENT).max(1.0);
    }

    pub fn outcome(&self) -> SearchOutcome {
        SearchOutcome {
            solved: self.best.is_some(),
            solution: self.best.clone().unwrap_or_default(),
            stats: self.stats.clone(),
        }
    }
}

/// An engine whose search is a sequence of weighted passes.
pub trait InflatedSearch {
    const NAME: &'static str;

    fn inflation(&self) -> &Inflation;

    fn inflation_mut(&mut self) -> &mut Inflation;

    /// Expand states until the current pass can no longer improve the path to
    /// the target, or until the search is halted.
    fn improve_path(&mut self, endpoints: &Endpoints) -> Pass;

    /// Queue the states of the next pass, keyed for the current epsilon.
    fn start_pass(&mut self);

    /// The node that reached the target and its cost, if any.
    fn target(&self, endpoints: &Endpoints) -> Option<(usize, Cost)>;

    /// The path to a node, ordered from start to goal.
    fn path_to(&self, node: usize) -> Vec<StateId>;
}

/// Run passes until the solution is proven at epsilon 1, the search is
/// halted, or the termination policy asks to stop. When `resume` is set the
/// work of the previous call is continued with a smaller epsilon.
pub fn run_passes<S: InflatedSearch>(search: &mut S, endpoints: &Endpoints, resume: bool) {
    let inflation = search.inflation_mut();
    if resume && inflation.best.is_some() && !inflation.exhausted && inflation.epsilon > 1.0 {
        inflation.shrink();
        search.start_pass();
    }

    while !search.inflation().exhausted {
        if let Pass::Halted = search.improve_path(endpoints) {
            debug!("{} halted at epsilon {:.2}", S::NAME, search.inflation().epsilon);
            break;
        }

        if !record_solution(search, endpoints) || search.inflation().epsilon <= 1.0 {
            search.inflation_mut().exhausted = true;
            break;
        }

        if search.inflation().termination == TerminationPolicy::FirstSolution {
            break;
        }

        search.inflation_mut().shrink();
        search.start_pass();
    }
}

/// Returns false if the target has not been reached.
fn record_solution<S: InflatedSearch>(search: &mut S, endpoints: &Endpoints) -> bool {
    let Some((node, cost)) = search
        .target(endpoints)
        .filter(|(_, cost)| *cost != INFINITE_COST)
    else {
        return false;
    };

    let improved = search
        .inflation()
        .stats
        .solution_cost
        .map_or(true, |best| cost < best);
    let path = improved.then(|| search.path_to(node));

    let inflation = search.inflation_mut();
    inflation.stats.final_epsilon = inflation.epsilon;
    if let Some(path) = path {
        inflation.stats.solutions += 1;
        inflation.stats.solution_cost = Some(cost);
        inflation.best = Some(path);
        debug!(
            "{} found a solution of cost {cost} with epsilon {:.2} after {} expansions",
            S::NAME,
            inflation.epsilon,
            inflation.stats.expansions,
        );
    }

    true
}
