/*!
 * RTOS Shim Demo
 *
 * Boots the simulated host and runs a producer/consumer pair, an
 * event-group rendezvous and a periodic timer through the shim API.
 */

use rtos_shim::monitoring::span_operation;
use rtos_shim::{
    init_tracing, SchedulerHooks, Shim, ShimConfig, SimConfig, SimKernel, TaskSpec, MAX_DELAY,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

const ITEMS: u32 = 8;
const PRODUCER_DONE: u32 = 1 << 0;
const CONSUMER_DONE: u32 = 1 << 1;
const ALL_DONE: u32 = PRODUCER_DONE | CONSUMER_DONE;

fn main() -> miette::Result<()> {
    init_tracing();

    let config = ShimConfig::from_env()?;
    let kernel = SimKernel::new(SimConfig::default());
    let shim = Shim::new(kernel.clone(), config);
    info!(tick_rate_hz = shim.tick_rate_hz(), "rtos shim demo starting");

    let queue = shim.queue_create(4, std::mem::size_of::<u32>())?;
    let rendezvous = shim.event_group_create()?;

    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    let heartbeat = shim.timer_create("heartbeat", 50, true, None, move |timer| {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        info!(timer = timer.name(), n, "heartbeat");
    })?;

    {
        let (task_shim, queue, rendezvous) = (shim.clone(), queue.clone(), rendezvous.clone());
        shim.task_create(TaskSpec::new("producer").with_priority(2), move || {
            for item in 0..ITEMS {
                if let Err(error) = queue.send_to_back(&item.to_le_bytes(), MAX_DELAY) {
                    tracing::error!(%error, "send failed");
                }
                task_shim.delay(10);
            }
            rendezvous.set_bits(PRODUCER_DONE);
            info!("producer finished");
        })?;
    }

    {
        let (queue, rendezvous) = (queue.clone(), rendezvous.clone());
        shim.task_create(TaskSpec::new("consumer").with_priority(2), move || {
            let mut sum = 0u32;
            let mut buf = [0u8; 4];
            for _ in 0..ITEMS {
                match queue.receive(&mut buf, MAX_DELAY) {
                    Ok(()) => sum += u32::from_le_bytes(buf),
                    Err(error) => tracing::error!(%error, "receive failed"),
                }
            }
            info!(sum, "consumer drained queue");
            rendezvous.set_bits(CONSUMER_DONE);
        })?;
    }

    heartbeat.start(0)?;
    shim.start_scheduler(SchedulerHooks::new())?;

    {
        let span = span_operation("rendezvous");
        let bits = rendezvous.sync(0, ALL_DONE, 5_000);
        span.record_result(bits & ALL_DONE == ALL_DONE);
        info!(bits, "tasks met at the rendezvous");
    }

    heartbeat.stop(0)?;
    info!(
        heartbeats = fired.load(Ordering::Relaxed),
        tasks = shim.number_of_tasks(),
        heap = ?kernel.heap_stats(),
        "demo complete"
    );
    Ok(())
}
