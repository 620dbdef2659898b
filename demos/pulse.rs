//! # Example: Sync / Wait Pulse
//!
//! One job keeps a metronome: every beat it syncs on `"beat"`. A listener
//! thread waits on the same name and prints what it received. After a few
//! beats the job is stopped, taking the listener down with it.
//!
//! Run with `cargo run --example pulse`.

use std::time::Duration;

use jobvisor::{Config, Ctx, JobFn, Message, Scheduler};
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let (sched, mut out) = Scheduler::builder(Config::default()).build();

    let job = JobFn::arc("pulse", |mut ctx: Ctx| async move {
        ctx.in_thread(|mut ctx: Ctx| async move {
            for _ in 0u64.. {
                let beat = ctx.wait("beat").await;
                ctx.message(format!("heard beat {beat} at {:?}", ctx.time()));
            }
            Ok(())
        });

        for n in 0u64.. {
            ctx.sleep(Duration::from_millis(250)).await;
            ctx.sync("beat", json!(n)).await;
        }
        Ok(())
    });

    let id = sched.submit(job, json!({"workspace": 1})).await;
    println!("[main] submitted job {id}");

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    println!("[main] stopping job {id}");
    sched.stop_job(id).await;

    while let Ok(msg) = out.try_recv() {
        match msg {
            Message::Message { val, .. } => println!("[job {id}] {val}"),
            Message::Job { job_id, action, .. } => println!("[job {job_id}] {action:?}"),
            other => println!("[other] {other:?}"),
        }
    }

    sched.shutdown().await;
    println!("[main] jobs left: {}", sched.jobs().await.len());
    Ok(())
}
