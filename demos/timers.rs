//! Two root tasks sharing one executor thread.
//!
//! `outer` awaits a child that sleeps 3s, then sleeps 2s, 4s and 1s in turn. `another` sleeps
//! 7s. A clock thread prints the elapsed seconds so the interleaving is visible.
//!
//! Run with `RUST_LOG=info cargo run --example timers`.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cotask::{Handle, LocalExecutor, Task};

async fn inner(h: Handle) -> cotask::Result<()> {
    log::info!("inner starts");
    h.delay(Duration::from_secs(3)).await?;
    log::info!("inner finished");
    Ok(())
}

async fn outer(h: Handle) -> cotask::Result<()> {
    log::info!("outer starts");
    Task::new(&h, inner(h.clone())).with_label("inner").await??;

    for secs in [2, 4, 1] {
        log::info!("scheduling another {}s timer", secs);
        let slept = h.delay(Duration::from_secs(secs)).await?;
        log::info!("timer finished after {:?}", slept);
    }

    log::info!("outer finished");
    Ok(())
}

async fn another(h: Handle) -> cotask::Result<()> {
    log::info!("another starts");
    h.delay(Duration::from_secs(7)).await?;
    log::info!("another finished");
    Ok(())
}

fn main() -> cotask::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let done = Arc::new(AtomicBool::new(false));
    let clock = {
        let done = done.clone();
        thread::spawn(move || {
            // offset the ticks a little so they don't print on top of task output
            thread::sleep(Duration::from_millis(10));
            let mut secs = 0;
            while !done.load(Ordering::Relaxed) {
                log::info!("-----> {}s", secs);
                secs += 1;
                thread::sleep(Duration::from_secs(1));
            }
        })
    };

    let mut ex = LocalExecutor::new()?;
    let handle = ex.handle();

    let outer = ex.spawn(Task::new(&handle, outer(handle.clone())).with_label("outer"));
    let another = ex.spawn(Task::new(&handle, another(handle.clone())).with_label("another"));

    let report = ex.run()?;
    log::info!(
        "all done: {} resumptions, {} tasks completed",
        report.resumptions,
        report.completed
    );

    done.store(true, Ordering::Relaxed);
    let _ = clock.join();

    for mut join in [outer, another] {
        if let Some(result) = join.try_take() {
            result??;
        }
    }
    Ok(())
}
