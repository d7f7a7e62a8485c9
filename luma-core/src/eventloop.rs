//! The emulation worker loop.
//!
//! The worker owns the hardware aggregate. A mutex-guarded queue of boxed
//! command closures is the only way in: once per step, before
//! fetch-decode-execute, the worker swaps the queue out and runs every
//! command against the hardware. A command returning `ControlFlow::Break`
//! stops the loop.
//!
//! Simulated time is pinned to the wall clock: when the simulation runs more
//! than 5 ms ahead it sleeps off the drift, and when it falls more than
//! 100 ms behind (a host scheduling spike) the baseline is reset rather than
//! trying to catch up without bound.

use crate::hardware::Hardware;
use crate::time;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) type Command = Box<dyn FnOnce(&mut Hardware) -> ControlFlow<()> + Send>;

pub(crate) type CommandQueue = Arc<Mutex<Vec<Command>>>;

const MAX_LEAD: Duration = Duration::from_millis(5);
const MAX_LAG: Duration = Duration::from_millis(100);
const PERFORMANCE_LOG_INTERVAL: Duration = Duration::from_secs(10);

pub(crate) fn run(mut hardware: Box<Hardware>, commands: CommandQueue) {
    let mut current_commands: Vec<Command> = Vec::new();

    let mut simulated_ticks: u64 = 0;
    let mut wall_start = Instant::now();

    let mut performance_ticks: u64 = 0;
    let mut performance_sleep = Duration::ZERO;
    let mut performance_start = Instant::now();

    log::info!("emulation worker started");

    loop {
        {
            let mut queue = commands.lock().unwrap_or_else(PoisonError::into_inner);
            if !queue.is_empty() {
                std::mem::swap(&mut current_commands, &mut *queue);
            }
        }
        for command in current_commands.drain(..) {
            if command(&mut hardware).is_break() {
                log::info!("stop command received, emulation worker exiting");
                // Unfulfilled commands are dropped so their reply channels
                // report closure instead of blocking forever
                commands
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                return;
            }
        }

        let time = hardware.tick();

        simulated_ticks += time;
        let wall = wall_start.elapsed();
        let simulated = time::ticks_to_duration(simulated_ticks);
        if simulated > wall + MAX_LEAD {
            // Too fast: sleep off the drift and rebaseline
            let sleep_start = Instant::now();
            thread::sleep(simulated - wall);
            performance_sleep += sleep_start.elapsed();

            let new_wall = wall_start.elapsed();
            simulated_ticks = simulated_ticks.saturating_sub(time::duration_to_ticks(new_wall));
            wall_start = Instant::now();
        } else if wall > simulated + MAX_LAG {
            // Too slow: resync instead of accumulating an unbounded debt
            simulated_ticks = 0;
            wall_start = Instant::now();
        }

        performance_ticks += time;
        let performance_elapsed = performance_start.elapsed();
        if performance_elapsed > PERFORMANCE_LOG_INTERVAL {
            let simulated = time::ticks_to_duration(performance_ticks);
            let busy = performance_elapsed.saturating_sub(performance_sleep);
            let speed = 100.0 * simulated.as_secs_f64() / busy.as_secs_f64().max(f64::EPSILON);
            log::debug!(
                "simulated {:?} in {:?} of wall time ({speed:.0}% of real time while busy)",
                simulated,
                performance_elapsed
            );
            if speed < 110.0 {
                log::warn!("simulation speed is marginal ({speed:.0}% of real time)");
            }
            performance_ticks = 0;
            performance_sleep = Duration::ZERO;
            performance_start = Instant::now();
        }
    }
}
