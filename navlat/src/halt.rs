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

use crate::algorithm::Measure;
use std::time::{Duration, Instant};

/// A trait to define conditions in which a search should be halted. The
/// settings can be changed in between calls to `SearchEngine::replan()`.
pub trait Halt<Mem>: Clone {
    /// Check whether the current search should be interrupted.
    fn halt(&mut self, memory: &Mem) -> bool;
}

/// If an empty tuple is given for the options then we treat that as an
/// indication that we should let the search continue without halting for any
/// reason.
impl<Mem> Halt<Mem> for () {
    fn halt(&mut self, _: &Mem) -> bool {
        false
    }
}

/// Halt the search once a wall-clock budget has been used up. The clock starts
/// when the limit is created or restarted.
#[derive(Debug, Clone)]
pub struct TimeLimit {
    budget: Duration,
    started: Instant,
}

impl TimeLimit {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: Instant::now(),
        }
    }

    pub fn restart(&mut self, budget: Duration) {
        self.budget = budget;
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }
}

impl Default for TimeLimit {
    fn default() -> Self {
        Self::new(Duration::MAX)
    }
}

impl<Mem> Halt<Mem> for TimeLimit {
    fn halt(&mut self, _: &Mem) -> bool {
        self.expired()
    }
}

/// The maximum size that the Memory's Measure can reach before the search
/// quits. For search statistics this caps the number of expansions.
#[derive(Debug, Default, Clone)]
pub struct ExpansionLimit(pub Option<usize>);

impl<Mem: Measure> Halt<Mem> for ExpansionLimit {
    fn halt(&mut self, memory: &Mem) -> bool {
        if let Some(limit) = self.0 {
            return memory.size() >= limit;
        }

        false
    }
}

/// Tuples of Halt<M> will also implement Halt<M> with a boolean-or
/// combination of each tuple element's result. We currently limit the tuple
/// size to 8 elements, but that limit can be overcome using nested tuples.
macro_rules! or_tuple_halt {
    ( $( $name:ident )+ ) => {
        paste::item! {
            impl<Mem, $($name: Halt<Mem>),+> Halt<Mem> for ($($name,)+) {
                fn halt(
                    &mut self,
                    memory: &Mem,
                ) -> bool {
                    let ($([<$name:lower>],)+) = self;
                    false $(|| [<$name:lower>].halt(memory))+
                }
            }
        }
    };
}

or_tuple_halt! { A }
or_tuple_halt! { A B }
or_tuple_halt! { A B C }
or_tuple_halt! { A B C D }
or_tuple_halt! { A B C D E }
or_tuple_halt! { A B C D E F }
or_tuple_halt! { A B C D E F G }
or_tuple_halt! { A B C D E F G H }
