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

use crate::{
    error::ThisError,
    motion::{Cell, Point, Pose},
};

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum FootprintError {
    #[error("a footprint needs at least 3 points, but {points} were given")]
    InvalidFootprint { points: usize },
    #[error("footprint point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },
}

/// The outline of one part of the robot (its base, or an upper body level) in
/// robot-local coordinates. The robot's reference point is the origin and its
/// heading points along +x.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    points: Vec<Point>,
}

impl Footprint {
    /// A rectangle centered on the reference point, listed counter-clockwise
    /// starting from the rear right corner.
    pub fn rectangle(half_width: f64, half_length: f64) -> Self {
        let (w, l) = (half_width, half_length);
        Self {
            points: vec![
                Point::new(-l, -w),
                Point::new(l, -w),
                Point::new(l, w),
                Point::new(-l, w),
            ],
        }
    }

    pub fn polygon(points: Vec<Point>) -> Result<Self, FootprintError> {
        if points.len() < 3 {
            return Err(FootprintError::InvalidFootprint {
                points: points.len(),
            });
        }

        if let Some(index) = points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(FootprintError::NonFiniteCoordinate { index });
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The footprint placed at a pose in the world frame.
    pub fn transformed(&self, pose: &Pose) -> Vec<Point> {
        let isometry = pose.to_isometry();
        self.points.iter().map(|p| isometry * p).collect()
    }

    /// Every grid cell that the footprint touches when the robot stands at
    /// `pose`. Cells are returned sorted and without duplicates.
    pub fn cells_at(&self, pose: &Pose, cell_size: f64) -> Vec<Cell> {
        let polygon = self.transformed(pose);
        let mut cells = vec![Cell::from_point(pose.point(), cell_size)];

        for i in 0..polygon.len() {
            let (a, b) = (polygon[i], polygon[(i + 1) % polygon.len()]);
            segment_cells(a, b, cell_size, &mut cells);
        }

        let (min, max) = polygon.iter().fold(
            (Cell::new(i32::MAX, i32::MAX), Cell::new(i32::MIN, i32::MIN)),
            |(min, max), p| {
                let c = Cell::from_point(*p, cell_size);
                (
                    Cell::new(min.x.min(c.x), min.y.min(c.y)),
                    Cell::new(max.x.max(c.x), max.y.max(c.y)),
                )
            },
        );

        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let cell = Cell::new(x, y);
                if contains(&polygon, cell.to_center_point(cell_size)) {
                    cells.push(cell);
                }
            }
        }

        cells.sort();
        cells.dedup();
        cells
    }
}

/// Push every cell visited while walking from `a` to `b` in steps of a quarter
/// cell.
pub(crate) fn segment_cells(a: Point, b: Point, cell_size: f64, cells: &mut Vec<Cell>) {
    let length = (b - a).norm();
    let steps = (length / (cell_size / 4.0)).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let s = i as f64 / steps as f64;
        cells.push(Cell::from_point(a + (b - a) * s, cell_size));
    }
}

/// Even-odd point in polygon test.
fn contains(polygon: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > p.y) != (pj.y > p.y) {
            let x = pi.x + (p.y - pi.y) * (pj.x - pi.x) / (pj.y - pi.y);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn rectangle_corners_are_counter_clockwise() {
        let footprint = Footprint::rectangle(0.02, 0.03);
        assert_eq!(
            footprint.points(),
            &[
                Point::new(-0.03, -0.02),
                Point::new(0.03, -0.02),
                Point::new(0.03, 0.02),
                Point::new(-0.03, 0.02),
            ]
        );
    }

    #[test]
    fn polygons_need_three_finite_points() {
        assert_eq!(
            Footprint::polygon(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]),
            Err(FootprintError::InvalidFootprint { points: 2 })
        );
        assert_eq!(
            Footprint::polygon(vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, f64::NAN),
                Point::new(0.0, 1.0),
            ]),
            Err(FootprintError::NonFiniteCoordinate { index: 1 })
        );
        assert!(Footprint::polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ])
        .is_ok());
    }

    #[test]
    fn small_footprint_occupies_its_own_cell() {
        let footprint = Footprint::rectangle(0.02, 0.02);
        let cells = footprint.cells_at(&Pose::new(0.15, 0.25, 0.3), 0.1);
        assert_eq!(cells, vec![Cell::new(1, 2)]);
    }

    #[test]
    fn rotated_footprint_covers_the_rotated_cells() {
        // Three cells long along the heading, one cell wide.
        let footprint = Footprint::rectangle(0.04, 0.14);
        let along_x = footprint.cells_at(&Pose::new(0.55, 0.55, 0.0), 0.1);
        assert_eq!(
            along_x,
            vec![Cell::new(4, 5), Cell::new(5, 5), Cell::new(6, 5)]
        );

        let along_y = footprint.cells_at(&Pose::new(0.55, 0.55, FRAC_PI_2), 0.1);
        assert_eq!(
            along_y,
            vec![Cell::new(5, 4), Cell::new(5, 5), Cell::new(5, 6)]
        );
    }

    #[test]
    fn large_footprint_fills_its_interior() {
        let footprint = Footprint::rectangle(0.25, 0.25);
        let cells = footprint.cells_at(&Pose::new(0.55, 0.55, 0.0), 0.1);
        for y in 3..=7 {
            for x in 3..=7 {
                assert!(cells.contains(&Cell::new(x, y)), "missing ({x}, {y})");
            }
        }
        assert!(!cells.contains(&Cell::new(9, 9)));
    }
}
