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

pub type Point = nalgebra::geometry::Point2<f64>;
pub type Position = nalgebra::geometry::Isometry2<f64>;

pub mod pose;
pub use pose::*;

pub mod primitive;
pub use primitive::*;

use serde::{Deserialize, Serialize};

/// One square of the cost grid, identified by its column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    /// Make a new cell from a pair of indices.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Get the cell that this point is inside of. Points that are perfectly on
    /// the edge between two cells will be biased towards the cell with the
    /// higher index value.
    pub fn from_point(p: Point, cell_size: f64) -> Self {
        Self {
            x: (p.x / cell_size).floor() as i32,
            y: (p.y / cell_size).floor() as i32,
        }
    }

    /// Get the point in the center of the cell.
    pub fn to_center_point(&self, cell_size: f64) -> Point {
        Point::new(
            cell_size * (self.x as f64 + 0.5),
            cell_size * (self.y as f64 + 0.5),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_on_cell_edges_belong_to_the_higher_cell() {
        assert_eq!(Cell::from_point(Point::new(0.2, 0.1), 0.1), Cell::new(2, 1));
        assert_eq!(Cell::from_point(Point::new(-0.01, 0.0), 0.1), Cell::new(-1, 0));
    }

    #[test]
    fn center_point_lies_inside_its_cell() {
        let cell = Cell::new(-3, 7);
        assert_eq!(Cell::from_point(cell.to_center_point(0.25), 0.25), cell);
        assert_eq!(Cell::from_point(cell.to_center_point(1.0), 1.0), cell);
    }
}
