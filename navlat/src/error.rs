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

pub use anyhow::Error as Anyhow;
pub use std::error::Error as StdError;
pub use thiserror::Error as ThisError;

use crate::{
    algorithm::StrategyError, environment::EnvironmentError, footprint::FootprintError,
    path::PathError, planner::driver::DriverError,
};

/// Everything that can go wrong while setting up or running a single plan
/// call. Not finding a solution within the time budget is not an error; it is
/// reported through [`crate::PlanResult::solved`].
#[derive(ThisError, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Footprint(#[from] FootprintError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Path(#[from] PathError),
}

impl PlanError {
    /// True for errors caused by a malformed request rather than by a failure
    /// inside the search itself.
    pub fn is_setup_error(&self) -> bool {
        match self {
            PlanError::Driver(DriverError::Search(_)) | PlanError::Path(_) => false,
            _ => true,
        }
    }
}
