#![warn(clippy::pedantic)]
#![warn(clippy::all)]

use std::fs::read_to_string;
use std::path::Path;

use async_std::channel;
use async_std::task;
use chrono::Local;

use rustatron::actuator::ActuatorFiles;
use rustatron::communications::OptimizerComms;
use rustatron::configs;
use rustatron::feed::{watch_image_dir, ObjectiveFeed};
use rustatron::optimizer::{AscentOptimizer, DegenerateStep, TRACK_IDS};
use rustatron::util::find_file;

fn main() {
    let cfg_path = find_file(Path::new("config.toml")).expect("Failed to locate config.toml");
    println!("Reading config file {}", cfg_path.display());
    let cfg_text = read_to_string(&cfg_path).expect("Failed to open config file!");
    let cfg: toml::Value = cfg_text.parse().expect("Failed to parse config file");

    let mut actuator =
        configs::actuator_from_config(&cfg).expect("Failed to load actuator parameter files");
    let mut optimizer = configs::optimizer_from_config(&cfg, &actuator.state)
        .expect("Failed to construct optimizer from config file");
    let mut comms = task::block_on(configs::comms_from_config(&cfg))
        .expect("Failed to construct sockets from config file");
    let camera = configs::camera_from_config(&cfg).expect("Failed to read camera settings");

    let (frame_tx, frame_rx) = channel::bounded(8);
    let mut feed = configs::feed_from_config(&cfg, frame_rx);
    task::spawn(watch_image_dir(camera, frame_tx));

    let values = optimizer.current_values();
    println!(
        "[{}] initial values are: focus {}, second_dispersion {}, third_dispersion {}",
        Local::now(),
        values[0],
        values[1],
        values[2]
    );
    let directions = optimizer.initial_directions();
    println!(
        "[{}] initial directions are: focus {}, second_dispersion {}, third_dispersion {}",
        Local::now(),
        directions[0],
        directions[1],
        directions[2]
    );
    println!("Waiting for images ...");

    task::block_on(run_loop(
        &mut optimizer,
        &mut feed,
        &mut actuator,
        &mut comms,
    ));
}

async fn run_loop(
    optimizer: &mut AscentOptimizer,
    feed: &mut ObjectiveFeed,
    actuator: &mut ActuatorFiles,
    comms: &mut OptimizerComms,
) {
    let mut convergence_announced = false;
    while let Some(sample) = feed.next_sample().await {
        let report = optimizer.tick(sample);

        if let Err(e) = actuator.persist(report.values[0], report.values[1], report.values[2]) {
            eprintln!(
                "[{}] Failed to persist actuator files: error [{}]",
                Local::now(),
                e
            );
        }

        for (idx, &degenerate) in report.degenerate.iter().enumerate() {
            if degenerate {
                eprintln!(
                    "[{}] {}",
                    Local::now(),
                    DegenerateStep {
                        track: TRACK_IDS[idx]
                    }
                );
            }
        }

        println!(
            "[{}] tick {}: mean count {:.2} for group of {}",
            Local::now(),
            report.iteration,
            report.sample,
            feed.group_size()
        );
        println!(
            "[{}] current values are: focus {}, second_dispersion {}, third_dispersion {} (total gradient {:.3})",
            Local::now(),
            report.values[0],
            report.values[1],
            report.values[2],
            report.total_gradient
        );
        if report.converged && !convergence_announced {
            println!("[{}] Convergence achieved", Local::now());
            convergence_announced = true;
        }

        if comms.should_publish_logs(optimizer.tick_count()) {
            match comms.publish_logs(optimizer).await {
                Ok(()) => {}
                Err(x) => {
                    eprintln!("[{}] Failed to publish logs: error [{}]", Local::now(), x);
                }
            }
        }
        while let Some(request) = comms.handle_socket_request(optimizer).await {
            println!("[{}] Handled socket request <{}>", Local::now(), request);
        }
    }
    println!(
        "[{}] objective feed exhausted; leaving last persisted values in place",
        Local::now()
    );
}
