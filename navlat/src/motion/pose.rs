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

use super::{Point, Position};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A pose in continuous coordinates: meters for the position and radians for
/// the heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn to_isometry(&self) -> Position {
        Position::new(nalgebra::Vector2::new(self.x, self.y), self.theta)
    }
}

/// A pose on the lattice: grid cell indices plus a heading bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscretePose {
    pub x: i32,
    pub y: i32,
    pub theta: i32,
}

impl DiscretePose {
    pub fn new(x: i32, y: i32, theta: i32) -> Self {
        Self { x, y, theta }
    }
}

impl std::fmt::Display for DiscretePose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.theta)
    }
}

/// Converts between continuous and discrete poses. Positions map onto square
/// cells of `cell_size` meters and headings onto `num_angles` equal bins, the
/// first of which is centered on zero radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discretization {
    pub cell_size: f64,
    pub num_angles: u32,
}

impl Discretization {
    pub fn new(cell_size: f64, num_angles: u32) -> Self {
        Self {
            cell_size,
            num_angles,
        }
    }

    /// Width of one heading bin in radians.
    pub fn angle_bin(&self) -> f64 {
        TAU / self.num_angles as f64
    }

    pub fn cont_to_disc_xy(&self, value: f64) -> i32 {
        (value / self.cell_size).floor() as i32
    }

    /// The continuous coordinate of a discrete index is the center of its cell.
    pub fn disc_to_cont_xy(&self, value: i32) -> f64 {
        value as f64 * self.cell_size + self.cell_size / 2.0
    }

    pub fn cont_to_disc_theta(&self, theta: f64) -> i32 {
        let bin = self.angle_bin();
        let index = (normalize_angle(theta + bin / 2.0) / bin).floor() as i32;
        index.rem_euclid(self.num_angles as i32)
    }

    pub fn disc_to_cont_theta(&self, theta: i32) -> f64 {
        theta.rem_euclid(self.num_angles as i32) as f64 * self.angle_bin()
    }

    /// Wrap an arbitrary heading index into `[0, num_angles)`.
    pub fn wrap_theta(&self, theta: i32) -> i32 {
        theta.rem_euclid(self.num_angles as i32)
    }

    pub fn discretize(&self, pose: &Pose) -> DiscretePose {
        DiscretePose {
            x: self.cont_to_disc_xy(pose.x),
            y: self.cont_to_disc_xy(pose.y),
            theta: self.cont_to_disc_theta(pose.theta),
        }
    }

    pub fn continuous(&self, pose: &DiscretePose) -> Pose {
        Pose {
            x: self.disc_to_cont_xy(pose.x),
            y: self.disc_to_cont_xy(pose.y),
            theta: self.disc_to_cont_theta(pose.theta),
        }
    }
}

/// Normalize an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// The smallest unsigned difference between two angles, in `[0, π]`.
pub fn min_unsigned_angle_diff(a: f64, b: f64) -> f64 {
    let diff = normalize_angle(a - b);
    if diff > PI {
        TAU - diff
    } else {
        diff
    }
}

/// The signed rotation that takes `from` onto `to` along the shorter arc.
pub fn signed_angle_diff(from: f64, to: f64) -> f64 {
    let diff = normalize_angle(to - from);
    if diff > PI {
        diff - TAU
    } else {
        diff
    }
}
