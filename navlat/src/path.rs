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
    environment::{ContinuousStates, SearchEnvironment, StateId},
    error::ThisError,
    motion::{DiscretePose, Pose},
};

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("state {0} is not part of the environment")]
    UnknownState(StateId),
    #[error("no feasible action leads from state {from} to state {to}")]
    DisconnectedPath { from: StateId, to: StateId },
}

/// Converts a sequence of state ids back into poses.
pub struct PathExtractor<'e, E> {
    environment: &'e E,
}

impl<'e, E: SearchEnvironment> PathExtractor<'e, E> {
    pub fn new(environment: &'e E) -> Self {
        Self { environment }
    }

    /// The discrete pose of every state, in order.
    pub fn discrete<'a>(
        &'a self,
        ids: &'a [StateId],
    ) -> impl Iterator<Item = Result<DiscretePose, PathError>> + 'a {
        let environment: &'a E = self.environment;
        ids.iter().map(move |id| {
            environment
                .state_pose(*id)
                .ok_or(PathError::UnknownState(*id))
        })
    }
}

impl<'e, E: SearchEnvironment + ContinuousStates> PathExtractor<'e, E> {
    /// The continuous pose of every state, in order.
    pub fn continuous<'a>(
        &'a self,
        ids: &'a [StateId],
    ) -> impl Iterator<Item = Result<Pose, PathError>> + 'a {
        let environment: &'a E = self.environment;
        ids.iter().map(move |id| {
            environment
                .continuous_pose(*id)
                .ok_or(PathError::UnknownState(*id))
        })
    }

    /// The poses the robot passes through while following the states, using
    /// the cheapest feasible action between each consecutive pair.
    pub fn interpolated(&self, ids: &[StateId]) -> Result<Vec<Pose>, PathError> {
        let Some(first) = ids.first() else {
            return Ok(Vec::new());
        };

        if ids.len() == 1 {
            let pose = self
                .environment
                .continuous_pose(*first)
                .ok_or(PathError::UnknownState(*first))?;
            return Ok(vec![pose]);
        }

        let mut poses = Vec::new();
        for pair in ids.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            for id in [from, to] {
                if !self.environment.contains(id) {
                    return Err(PathError::UnknownState(id));
                }
            }

            let segment = self
                .environment
                .intermediate_poses(from, to)
                .ok_or(PathError::DisconnectedPath { from, to })?;

            // Each segment starts where the previous one ended.
            let skip = usize::from(!poses.is_empty());
            poses.extend(segment.into_iter().skip(skip));
        }

        Ok(poses)
    }
}
