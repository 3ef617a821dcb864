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

use super::{min_unsigned_angle_diff, signed_angle_diff, DiscretePose, Discretization, Pose};
use crate::error::ThisError;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};

/// Number of intermediate poses sampled along each generated primitive.
const GENERATED_INTERMEDIATE_POSES: usize = 10;

/// Cost multipliers of the generated primitive set. Turning in place and
/// driving backwards are discouraged relative to driving forward.
const FORWARD_COST_MULT: u32 = 1;
const ARC_COST_MULT: u32 = 2;
const BACKWARD_COST_MULT: u32 = 5;
const TURN_IN_PLACE_COST_MULT: u32 = 5;

/// A short precomputed maneuver on the lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPrimitive {
    pub id: usize,
    /// Heading bin that the maneuver starts from.
    pub start_angle: i32,
    /// Cell offset of the end pose relative to the start cell, plus the
    /// absolute heading bin at the end (wrapped into `[0, num_angles)`).
    pub end_pose: DiscretePose,
    pub cost_multiplier: u32,
    /// Poses sampled along the maneuver. Positions are in meters relative to
    /// the center of the start cell, headings are absolute radians.
    pub intermediate_poses: Vec<Pose>,
}

impl MotionPrimitive {
    /// Distance travelled between the centers of the start and end cells.
    pub fn linear_distance(&self, cell_size: f64) -> f64 {
        (self.end_pose.x as f64).hypot(self.end_pose.y as f64) * cell_size
    }
}

/// Where the motion primitives of an environment come from. Written as
/// `{type: file, path: ...}`, `{type: inline, text: ...}` or `{type: generated}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveSource {
    /// A motion primitive file in the `.mprim` text format.
    File { path: PathBuf },
    /// The contents of a motion primitive file.
    Inline { text: String },
    /// Generate a unicycle-like set matching the environment's discretization.
    #[default]
    Generated,
}

impl PrimitiveSource {
    pub fn load(&self, discretization: Discretization) -> Result<MotionPrimitives, PrimitiveError> {
        match self {
            PrimitiveSource::File { path } => {
                let text = std::fs::read_to_string(path).map_err(|source| PrimitiveError::Io {
                    path: path.clone(),
                    source,
                })?;
                MotionPrimitives::parse(&text)
            }
            PrimitiveSource::Inline { text } => MotionPrimitives::parse(text),
            PrimitiveSource::Generated => MotionPrimitives::generate(discretization),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum PrimitiveError {
    #[error("unable to read motion primitive file [{path}]: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected the field [{expected}]")]
    MissingField { line: usize, expected: &'static str },
    #[error("line {line}: unable to parse [{value}] as {expected}")]
    InvalidValue {
        line: usize,
        value: String,
        expected: &'static str,
    },
    #[error("unexpected end of input while looking for [{expected}]")]
    UnexpectedEnd { expected: &'static str },
    #[error("resolution must be positive and finite, but got {0}")]
    InvalidResolution(f64),
    #[error("the number of angles must be at least one")]
    NoAngles,
    #[error("primitive {id} starts at angle {angle}, outside of [0, {num_angles})")]
    AngleOutOfRange { id: usize, angle: i32, num_angles: u32 },
    #[error("primitive {id} has no intermediate poses")]
    NoIntermediatePoses { id: usize },
    #[error("primitive {id} ends at {end} but its last intermediate pose lands on {actual}")]
    InconsistentEndpoint {
        id: usize,
        end: DiscretePose,
        actual: DiscretePose,
    },
    #[error("no motion primitive starts at angle {0}")]
    UncoveredAngle(i32),
}

/// The full set of motion primitives available to an environment.
#[derive(Debug, Clone)]
pub struct MotionPrimitives {
    resolution: f64,
    num_angles: u32,
    primitives: Vec<MotionPrimitive>,
}

impl MotionPrimitives {
    /// Assemble a primitive set, checking that every primitive is consistent
    /// with the discretization and that every heading has at least one
    /// primitive.
    pub fn new(
        resolution: f64,
        num_angles: u32,
        mut primitives: Vec<MotionPrimitive>,
    ) -> Result<Self, PrimitiveError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(PrimitiveError::InvalidResolution(resolution));
        }
        if num_angles == 0 {
            return Err(PrimitiveError::NoAngles);
        }

        let discretization = Discretization::new(resolution, num_angles);
        for primitive in &mut primitives {
            if primitive.start_angle < 0 || primitive.start_angle >= num_angles as i32 {
                return Err(PrimitiveError::AngleOutOfRange {
                    id: primitive.id,
                    angle: primitive.start_angle,
                    num_angles,
                });
            }

            primitive.end_pose.theta = discretization.wrap_theta(primitive.end_pose.theta);
            let last = primitive
                .intermediate_poses
                .last()
                .ok_or(PrimitiveError::NoIntermediatePoses { id: primitive.id })?;
            let actual = discretization.discretize(&Pose::new(
                discretization.disc_to_cont_xy(0) + last.x,
                discretization.disc_to_cont_xy(0) + last.y,
                last.theta,
            ));
            if actual != primitive.end_pose {
                return Err(PrimitiveError::InconsistentEndpoint {
                    id: primitive.id,
                    end: primitive.end_pose,
                    actual,
                });
            }
        }

        for angle in 0..num_angles as i32 {
            if !primitives.iter().any(|p| p.start_angle == angle) {
                return Err(PrimitiveError::UncoveredAngle(angle));
            }
        }

        Ok(Self {
            resolution,
            num_angles,
            primitives,
        })
    }

    /// Parse the `.mprim` text format.
    pub fn parse(text: &str) -> Result<Self, PrimitiveError> {
        let mut reader = Reader::new(text);
        let resolution: f64 = reader.field("resolution_m")?;
        let num_angles: u32 = reader.field("numberofangles")?;
        let total: usize = reader.field("totalnumberofprimitives")?;

        let mut primitives = Vec::with_capacity(total);
        for _ in 0..total {
            let id: usize = reader.field("primID")?;
            let start_angle: i32 = reader.field("startangle_c")?;
            let (line, end) = reader.raw_field("endpose_c")?;
            let end = parse_triple::<i32>(line, end, "an integer end pose")?;
            let cost_multiplier: u32 = reader.field("additionalactioncostmult")?;
            let count: usize = reader.field("intermediateposes")?;

            let mut intermediate_poses = Vec::with_capacity(count);
            for _ in 0..count {
                let (line, values) = reader.next_line("an intermediate pose")?;
                let [x, y, theta] = parse_triple::<f64>(line, values, "an intermediate pose")?;
                intermediate_poses.push(Pose::new(x, y, theta));
            }

            primitives.push(MotionPrimitive {
                id,
                start_angle,
                end_pose: DiscretePose::new(end[0], end[1], end[2]),
                cost_multiplier,
                intermediate_poses,
            });
        }

        Self::new(resolution, num_angles, primitives)
    }

    /// Generate a primitive set for the given discretization: for every
    /// heading, drive one lattice step forward, drive forward while turning by
    /// one heading bin either way, back up one step, and turn in place by one
    /// bin either way.
    pub fn generate(discretization: Discretization) -> Result<Self, PrimitiveError> {
        let Discretization {
            cell_size,
            num_angles,
        } = discretization;
        if num_angles == 0 {
            return Err(PrimitiveError::NoAngles);
        }

        let mut primitives = Vec::new();
        for angle in 0..num_angles as i32 {
            let heading = discretization.disc_to_cont_theta(angle);
            let (dx, dy) = lattice_direction(heading, discretization.angle_bin());
            let maneuvers = [
                (dx, dy, 0, FORWARD_COST_MULT),
                (dx, dy, 1, ARC_COST_MULT),
                (dx, dy, -1, ARC_COST_MULT),
                (-dx, -dy, 0, BACKWARD_COST_MULT),
                (0, 0, 1, TURN_IN_PLACE_COST_MULT),
                (0, 0, -1, TURN_IN_PLACE_COST_MULT),
            ];

            for (mx, my, turn, cost_multiplier) in maneuvers {
                let end_theta = discretization.wrap_theta(angle + turn);
                let end_heading = discretization.disc_to_cont_theta(end_theta);
                let rotation = signed_angle_diff(heading, end_heading);
                let intermediate_poses = (0..GENERATED_INTERMEDIATE_POSES)
                    .map(|i| {
                        let s = i as f64 / (GENERATED_INTERMEDIATE_POSES - 1) as f64;
                        Pose::new(
                            s * mx as f64 * cell_size,
                            s * my as f64 * cell_size,
                            super::normalize_angle(heading + s * rotation),
                        )
                    })
                    .collect();

                primitives.push(MotionPrimitive {
                    id: primitives.len(),
                    start_angle: angle,
                    end_pose: DiscretePose::new(mx, my, end_theta),
                    cost_multiplier,
                    intermediate_poses,
                });
            }
        }

        Self::new(cell_size, num_angles, primitives)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn num_angles(&self) -> u32 {
        self.num_angles
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotionPrimitive> {
        self.primitives.iter()
    }
}

/// The smallest integer cell offset whose direction is within a quarter of a
/// heading bin of `heading`.
fn lattice_direction(heading: f64, bin: f64) -> (i32, i32) {
    let (s, c) = heading.sin_cos();
    let scale = 1.0 / c.abs().max(s.abs());
    let offset = |k: f64| {
        (
            (c * scale * k).round() as i32,
            (s * scale * k).round() as i32,
        )
    };

    for k in 1..=4 {
        let (dx, dy) = offset(k as f64);
        let error = min_unsigned_angle_diff((dy as f64).atan2(dx as f64), heading);
        if error <= bin / 4.0 + 1e-9 {
            return (dx, dy);
        }
    }

    offset(4.0)
}

struct Reader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
        }
    }

    fn next_line(&mut self, expected: &'static str) -> Result<(usize, &'a str), PrimitiveError> {
        for (index, line) in self.lines.by_ref() {
            let line = line.trim();
            if !line.is_empty() {
                return Ok((index + 1, line));
            }
        }

        Err(PrimitiveError::UnexpectedEnd { expected })
    }

    fn raw_field(&mut self, key: &'static str) -> Result<(usize, &'a str), PrimitiveError> {
        let (line, text) = self.next_line(key)?;
        text.strip_prefix(key)
            .and_then(|rest| rest.trim_start().strip_prefix(':'))
            .map(|value| (line, value.trim()))
            .ok_or(PrimitiveError::MissingField {
                line,
                expected: key,
            })
    }

    fn field<T: FromStr>(&mut self, key: &'static str) -> Result<T, PrimitiveError> {
        let (line, value) = self.raw_field(key)?;
        value.parse().map_err(|_| PrimitiveError::InvalidValue {
            line,
            value: value.to_owned(),
            expected: key,
        })
    }
}

fn parse_triple<T: FromStr + Copy + Default>(
    line: usize,
    text: &str,
    expected: &'static str,
) -> Result<[T; 3], PrimitiveError> {
    let invalid = || PrimitiveError::InvalidValue {
        line,
        value: text.to_owned(),
        expected,
    };

    let mut values = [T::default(); 3];
    let mut tokens = text.split_whitespace();
    for value in &mut values {
        *value = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(invalid)?;
    }

    if tokens.next().is_some() {
        return Err(invalid());
    }

    Ok(values)
}
