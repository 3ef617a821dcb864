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

use super::EnvironmentError;
use crate::footprint::Footprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper limit on the number of additional levels an environment may carry.
pub const MAX_ADDITIONAL_LEVELS: usize = 8;

/// Identifies one of the coupled footprint levels of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// The level of the robot's base footprint, checked with the base grid.
    Base,
    /// An additional level, e.g. the upper body, indexed from zero.
    Additional(usize),
}

impl Level {
    /// Position of this level in a list that starts with the base level.
    pub(crate) fn slot(&self) -> usize {
        match self {
            Level::Base => 0,
            Level::Additional(i) => i + 1,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Base => f.write_str("base level"),
            Level::Additional(i) => write!(f, "additional level {i}"),
        }
    }
}

/// Cell cost thresholds of one level. A cell cost at or above `inscribed`
/// means that the robot certainly collides if its reference point is in that
/// cell. A cost at or above `possibly_circumscribed` means that it might
/// collide, so the whole footprint has to be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct LevelThresholds {
    inscribed: u8,
    possibly_circumscribed: u8,
}

impl LevelThresholds {
    pub fn new(inscribed: u8, possibly_circumscribed: u8) -> Result<Self, EnvironmentError> {
        if inscribed < possibly_circumscribed {
            return Err(EnvironmentError::ThresholdOrder {
                inscribed,
                possibly_circumscribed,
            });
        }

        Ok(Self {
            inscribed,
            possibly_circumscribed,
        })
    }

    /// Thresholds that treat every cost below `inscribed` as possibly in
    /// collision, so the footprint is always checked.
    pub fn always_check_footprint(inscribed: u8) -> Self {
        Self {
            inscribed,
            possibly_circumscribed: 0,
        }
    }

    pub fn inscribed(&self) -> u8 {
        self.inscribed
    }

    pub fn possibly_circumscribed(&self) -> u8 {
        self.possibly_circumscribed
    }
}

#[derive(Deserialize)]
struct RawThresholds {
    inscribed: u8,
    possibly_circumscribed: u8,
}

impl TryFrom<RawThresholds> for LevelThresholds {
    type Error = EnvironmentError;
    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        LevelThresholds::new(raw.inscribed, raw.possibly_circumscribed)
    }
}

/// Row-major grid of cell costs: the cost of cell `(x, y)` is stored at
/// `x + y * width`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostGrid {
    width: usize,
    height: usize,
    costs: Vec<u8>,
}

impl CostGrid {
    /// Returns None if the number of costs does not match the dimensions.
    pub fn new(width: usize, height: usize, costs: Vec<u8>) -> Option<Self> {
        if width.checked_mul(height)? != costs.len() {
            return None;
        }

        Some(Self {
            width,
            height,
            costs,
        })
    }

    /// The cost of a cell, or None if the cell is outside of the grid.
    pub fn cost(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 {
            return None;
        }

        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }

        self.costs.get(x + y * self.width).copied()
    }
}

/// Everything needed to register one additional level at once.
#[derive(Debug, Clone)]
pub struct LevelConfig {
    pub footprint: Footprint,
    pub thresholds: LevelThresholds,
    /// The level's grid. Levels registered without one must receive a grid
    /// through `EnvironmentBuilder::set_grid` before the environment is built.
    pub costs: Option<Vec<u8>>,
}

impl LevelConfig {
    pub fn new(footprint: Footprint, thresholds: LevelThresholds) -> Self {
        Self {
            footprint,
            thresholds,
            costs: None,
        }
    }

    pub fn with_costs(mut self, costs: Vec<u8>) -> Self {
        self.costs = Some(costs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(LevelThresholds::new(255, 0).is_ok());
        assert!(LevelThresholds::new(100, 100).is_ok());
        assert!(matches!(
            LevelThresholds::new(10, 20),
            Err(EnvironmentError::ThresholdOrder {
                inscribed: 10,
                possibly_circumscribed: 20
            })
        ));
    }

    #[test]
    fn thresholds_are_validated_when_deserialized() {
        let ok: LevelThresholds =
            serde_yaml::from_str("{inscribed: 200, possibly_circumscribed: 50}").unwrap();
        assert_eq!(ok.inscribed(), 200);
        assert_eq!(ok.possibly_circumscribed(), 50);

        let bad: Result<LevelThresholds, _> =
            serde_yaml::from_str("{inscribed: 10, possibly_circumscribed: 50}");
        assert!(bad.is_err());
    }

    #[test]
    fn grid_lookup_is_row_major() {
        let grid = CostGrid::new(3, 2, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(grid.cost(2, 0), Some(2));
        assert_eq!(grid.cost(0, 1), Some(3));
        assert_eq!(grid.cost(3, 0), None);
        assert_eq!(grid.cost(0, -1), None);
        assert!(CostGrid::new(3, 2, vec![0; 5]).is_none());
    }

    #[test]
    fn levels_are_ordered_after_the_base() {
        assert_eq!(Level::Base.slot(), 0);
        assert_eq!(Level::Additional(2).slot(), 3);
        assert_eq!(Level::Additional(0).to_string(), "additional level 0");
    }
}
