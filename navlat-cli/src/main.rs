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

use anyhow::Context;
use clap::{Parser, ValueEnum};
use navlat::{
    algorithm::{SearchDirection, TerminationPolicy},
    motion::PrimitiveSource,
    plan, PlanRequest,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "navlat")]
#[command(about = "Plan a path for a footprint robot over a multi-level cost grid")]
struct Args {
    /// YAML file describing the planning request
    request: PathBuf,

    /// Override the search strategy of the request
    #[arg(short, long)]
    strategy: Option<String>,

    /// Override the time budget (seconds)
    #[arg(short, long)]
    time_budget: Option<f64>,

    /// Override the initial epsilon
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Stop at the first solution instead of improving it
    #[arg(long)]
    first_solution: bool,

    /// Override the search direction
    #[arg(short, long, value_enum)]
    direction: Option<Direction>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Forward,
    Backward,
}

impl From<Direction> for SearchDirection {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Forward => SearchDirection::Forward,
            Direction::Backward => SearchDirection::Backward,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut request = load_request(&args.request)?;
    if let Some(strategy) = args.strategy {
        request.strategy = strategy;
    }
    if let Some(time_budget) = args.time_budget {
        request.settings.time_budget = time_budget;
    }
    if let Some(epsilon) = args.epsilon {
        request.settings.initial_epsilon = epsilon;
    }
    if args.first_solution {
        request.settings.termination = TerminationPolicy::FirstSolution;
    }
    if let Some(direction) = args.direction {
        request.settings.direction = direction.into();
    }

    let result = plan(&request).map_err(|err| {
        let context = if err.is_setup_error() {
            format!("invalid request [{}]", args.request.display())
        } else {
            format!("planning [{}] failed", args.request.display())
        };
        anyhow::Error::new(err).context(context)
    })?;

    if !result.solved {
        println!("No solution was found");
        return Ok(());
    }

    println!("Solution found:");
    for (discrete, pose) in result.path.iter().zip(&result.waypoints) {
        println!(
            "{} {} {}\t\t{:.3} {:.3} {:.3}",
            discrete.x, discrete.y, discrete.theta, pose.x, pose.y, pose.theta,
        );
    }

    println!(
        "cost: {:?}, expansions: {}, epsilon: {}, time: {:?}",
        result.stats.solution_cost,
        result.stats.expansions,
        result.stats.final_epsilon,
        result.stats.elapsed,
    );

    Ok(())
}

/// Read a request. A relative motion primitive file is resolved against the
/// directory of the request file.
fn load_request(path: &Path) -> anyhow::Result<PlanRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read [{}]", path.display()))?;
    let mut request: PlanRequest = serde_yaml::from_str(&text)
        .with_context(|| format!("unable to parse [{}]", path.display()))?;

    if let PrimitiveSource::File { path: file } = &mut request.motion_primitives {
        if file.is_relative() {
            if let Some(dir) = path.parent() {
                *file = dir.join(&*file);
            }
        }
    }

    info!(
        "Loaded a {}x{} request for the {} strategy from [{}]",
        request.width,
        request.height,
        request.strategy,
        path.display(),
    );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> PlanRequest {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn bundled_requests_build_their_environments() {
        let free = parse(include_str!("../requests/free_10x10.yaml"));
        let (environment, _) = free.build_environment().unwrap();
        assert_eq!((environment.width(), environment.height()), (10, 10));

        let wall = parse(include_str!("../requests/upper_body_wall.yaml"));
        let (environment, _) = wall.build_environment().unwrap();
        assert_eq!(environment.additional_level_count(), 1);
    }

    #[test]
    fn upper_body_goes_around_the_shelf() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("requests/upper_body_wall.yaml");
        let request = load_request(&path).unwrap();
        let result = plan(&request).unwrap();
        assert!(result.solved);
        assert!(result.path.iter().all(|pose| pose.x != 5 || pose.y == 9));
        assert_eq!(result.path.last().map(|pose| (pose.x, pose.y)), Some((9, 0)));
    }

    #[test]
    fn relative_primitive_files_follow_the_request() {
        let dir = std::env::temp_dir().join(format!("navlat-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("request.yaml");
        std::fs::write(
            &path,
            "width: 1\nheight: 1\ncell_size: 0.1\nstart: {x: 0.05, y: 0.05}\n\
             goal: {x: 0.05, y: 0.05}\ncosts: [0]\n\
             motion_primitives: {type: file, path: unicycle.mprim}\n",
        )
        .unwrap();

        let request = load_request(&path).unwrap();
        assert_eq!(
            request.motion_primitives,
            PrimitiveSource::File {
                path: dir.join("unicycle.mprim")
            }
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
