use std::time::Duration;

use cubism::{logging, Context, ContextConfig, FetchResult, FutureSource, ListenerKey, Timestamp};

// Two synthetic series scrolling in real time, plus their difference.
//
// Usage:
//   cargo run --example random_walk -- [path/to/config.yaml] [seconds]
//
// Set RUST_LOG=cubism=debug to see every fetch and tick.

/// Deterministic noise in [-0.5, 0.5) for step index `n`.
fn noise(seed: u64, n: i64) -> f64 {
    let mut x = (n as u64) ^ seed;
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64 - 0.5
}

/// Walk over the last 64 steps, so overlapping fetches agree on every sample.
fn walk(seed: u64, t: Timestamp, step: i64) -> f64 {
    let n = t.div_euclid(step);
    (0..64).map(|k| noise(seed, n - k)).sum()
}

fn main() -> cubism::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ContextConfig::load(path)?,
        None => ContextConfig::default()
            .with_step(1_000)
            .with_size(60)
            .with_server_delay(500)
            .with_client_delay(200),
    };
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let ctx = Context::with_config(config)?;
        let size = ctx.size();

        let synthetic = |seed: u64| {
            FutureSource::new(move |start: Timestamp, stop: Timestamp, step: i64| async move {
                // Pretend to be a remote backend.
                tokio::time::sleep(Duration::from_millis(40)).await;
                let values: Vec<f64> = (0..(stop - start) / step)
                    .map(|j| walk(seed, start + j * step, step))
                    .collect();
                FetchResult::Ok(values)
            })
        };

        let east = ctx.metric(synthetic(1), "east");
        let west = ctx.metric(synthetic(2), "west");
        let delta = (&east - &west).alias("east - west");

        for metric in [east.clone(), west.clone()] {
            let name = metric.name();
            let m = metric.clone();
            metric.on(ListenerKey::change("print"), move |_| {
                let [min, max] = m.extent();
                println!(
                    "{name:>5}: last {:>7.3}  extent [{min:.3}, {max:.3}]",
                    m.value_at(size - 1)
                );
            });
        }

        let d = delta.clone();
        ctx.on_change("delta", move |window| {
            println!("{window} {}: {:.3}", d.name(), d.value_at(size - 1));
        });
        let d = delta.clone();
        ctx.on_focus("rule", move |focus| {
            if let Some(i) = focus {
                println!("focus {i}: {} = {:.3}", d.name(), d.value_at(i));
            }
        });

        ctx.start();
        tokio::time::sleep(Duration::from_secs(seconds / 2)).await;
        ctx.set_focus(Some(size / 2))?;
        tokio::time::sleep(Duration::from_secs(seconds - seconds / 2)).await;
        ctx.stop();
        Ok::<(), cubism::Error>(())
    })
}
