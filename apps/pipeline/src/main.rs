// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A broadcast pipeline mapped onto a tiled architecture.
//!
//! A source feeds a mergeable multicast stage fanning out to a set of
//! workers, which all feed one sink. The multicast is collapsed into a
//! composite channel before the run, so the broadcast costs one memory
//! transaction per round. Prints the committed schedule, the throughput
//! bound, and the per-resource utilization.

use anyhow::Result;
use structopt::StructOpt;

use tilesim::analysis::{collapse_multicasts, recurrence_bound, repetition_vector};
use tilesim::bindings::{self, BindingPolicy};
use tilesim::{
    ActorId, ActorKind, ActorProperties, Application, ChannelConfiguration, Kernel,
    TimingSimulation, topologies,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "pipeline", about = "broadcast pipeline timing simulation")]
struct Opt {
    /// number of worker actors fed by the broadcast
    #[structopt(long, default_value = "3")]
    workers: usize,

    /// number of tiles in the architecture
    #[structopt(long, default_value = "2")]
    tiles: usize,

    /// processors per tile
    #[structopt(long, default_value = "3")]
    processors: usize,

    /// kernel iterations to simulate
    #[structopt(long, default_value = "8")]
    iterations: usize,

    /// bind actors randomly (with this seed) instead of one-to-one
    #[structopt(long)]
    seed: Option<u64>,

    /// dump the application graph as graphviz and exit
    #[structopt(long)]
    graphviz: bool,
}

struct PipelineApp {
    app: Application,
    source: ActorId,
    workers: Vec<ActorId>,
    sink: ActorId,
}

fn build_app(workers: usize) -> PipelineApp {
    let mut app = Application::new("broadcast-pipeline");
    let source = app.add_actor(
        "source",
        &ActorProperties { execution_time: 2.0, ..Default::default() },
    );
    let mcast = app.add_actor(
        "mcast",
        &ActorProperties {
            kind: ActorKind::Multicast,
            mergeable: true,
            execution_time: 0.5,
            ..Default::default()
        },
    );
    let sink = app.add_actor(
        "sink",
        &ActorProperties { execution_time: 1.0, ..Default::default() },
    );
    let config = ChannelConfiguration { capacity: 2, token_size: 64, ..Default::default() };
    app.add_channel(source, mcast, &config).expect("wiring the source");
    let workers = (0..workers)
        .map(|i| {
            let worker = app.add_actor(
                &format!("worker{}", i),
                &ActorProperties { execution_time: 4.0, ..Default::default() },
            );
            app.add_channel(mcast, worker, &config).expect("wiring a worker");
            app.add_channel(worker, sink, &config).expect("wiring the sink");
            worker
        })
        .collect();
    PipelineApp {
        app,
        source,
        workers,
        sink,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let PipelineApp {
        mut app,
        source,
        workers,
        sink,
    } = build_app(opt.workers);

    let reps = repetition_vector(&app)?;
    let bound = recurrence_bound(&app);
    log::info!(
        "repetition vector: [{}]",
        reps.values().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "throughput bound: {} ({} cycles)",
        bound.recurrence_bound,
        bound.cycles.len()
    );

    let composites = collapse_multicasts(&mut app)?;
    println!("collapsed {} multicast stage(s)", composites.len());
    if opt.graphviz {
        println!("{}", app.to_graphviz());
        return Ok(());
    }

    let mut arch = topologies::homogeneous("tiles", opt.tiles, opt.processors);
    let policy = match opt.seed {
        Some(seed) => BindingPolicy::Random { seed },
        None => BindingPolicy::OneToOne,
    };
    let mut bindings = bindings::assign(&app, &arch, &policy)?;
    bindings::assign_channel_memories(&mut app, &arch, &mut bindings)?;

    let mut kernel = Kernel::new(0, 2);
    kernel.assign(0, source);
    for worker in workers.iter() {
        kernel.assign(1, *worker);
    }
    kernel.assign(2, sink);

    let mut sim = TimingSimulation::new(&arch);
    let report = sim.run(&mut app, &mut arch, &mut bindings, &kernel, opt.iterations)?;

    println!("committed schedule ({} actions):", report.actions.len());
    println!("{:>10} {:>10}  actor @ processor", "start", "due");
    for action in report.actions.iter() {
        println!(
            "{:>10.2} {:>10.2}  {} ({}) @ {}",
            action.start,
            action.due,
            app.actor(action.actor).name(),
            action.actor,
            action.processor
        );
    }
    println!("makespan: {:.2} ns", report.makespan);
    for (memory, utilization) in report.memory_utilization.iter() {
        println!(
            "memory {} ({}): {:.1}% occupied",
            memory,
            arch.memory(*memory).name(),
            utilization * 100.0
        );
    }
    for (interconnect, utilization) in report.interconnect_utilization.iter() {
        println!(
            "interconnect {} ({}): {:.1}% busy",
            interconnect,
            arch.interconnect(*interconnect).name(),
            utilization * 100.0
        );
    }
    let sink_fires = report.actions.iter().filter(|a| a.actor == sink).count();
    println!(
        "sink completed {}/{} iterations",
        sink_fires, opt.iterations
    );
    Ok(())
}
