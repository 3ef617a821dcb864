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

//! Multi-level (x, y, heading) lattice planning for robots with footprints.
//!
//! A [`PlanRequest`] describes a cost grid, a robot footprint and any number of
//! additional articulated levels. [`plan`] turns it into a frozen
//! [`LatticeEnvironment`], picks a search engine for the requested
//! [`Strategy`], drives it under a wall-clock budget and converts the solution
//! back into discrete poses.

pub mod error;
pub use error::PlanError;

pub mod halt;
pub use halt::Halt;

pub mod footprint;
pub use footprint::Footprint;

pub mod motion;

pub mod environment;
pub use environment::{LatticeEnvironment, SearchEnvironment, StateId};

pub mod algorithm;
pub use algorithm::{SearchEngine, Strategy};

pub mod planner;
pub use planner::{plan, plan_with, PlanResult};

pub mod path;
pub use path::PathExtractor;

pub mod request;
pub use request::PlanRequest;

pub mod prelude {
    pub use super::{
        algorithm::{SearchDirection, SearchEngine, SearchOutcome, Strategy, TerminationPolicy},
        environment::{
            EnvironmentBuilder, EnvironmentKind, EnvironmentParams, LatticeEnvironment, Level,
            LevelConfig, LevelThresholds, MdpConfig, SearchEnvironment, StateId,
        },
        footprint::Footprint,
        motion::{Cell, DiscretePose, Discretization, MotionPrimitives, Pose, PrimitiveSource},
        path::PathExtractor,
        planner::{plan, plan_with, PlanResult},
        request::PlanRequest,
    };
}
