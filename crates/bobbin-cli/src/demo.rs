//! Demo workload: a retrying chain, a fan-in and unique submissions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bobbin_core::config::SchedulerConfig;
use bobbin_core::domain::{Backoff, Data, ExistingWorkPolicy, Outcome, TaskSpec};
use bobbin_core::ports::WorkContext;
use bobbin_core::typed::{Handler, Work};
use bobbin_core::Scheduler;
use serde::{Deserialize, Serialize};
use tracing::info;

const TAG: &str = "demo";

#[derive(Debug, Serialize, Deserialize)]
struct Fetch {
    url: String,
}

impl Work for Fetch {
    const TYPE: &'static str = "demo.fetch.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct Resize {
    width: i64,
}

impl Work for Resize {
    const TYPE: &'static str = "demo.resize.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct Checksum {
    part: String,
    corrupt: bool,
}

impl Work for Checksum {
    const TYPE: &'static str = "demo.checksum.v1";
}

#[derive(Debug, Serialize, Deserialize)]
struct Publish {
    target: String,
}

impl Work for Publish {
    const TYPE: &'static str = "demo.publish.v1";
}

struct FetchHandler {
    flaky_left: AtomicU32,
}

#[async_trait]
impl Handler<Fetch> for FetchHandler {
    async fn handle(&self, work: Fetch, _ctx: &WorkContext) -> Outcome {
        let left = self.flaky_left.load(Ordering::Relaxed);
        if left > 0 {
            self.flaky_left.fetch_sub(1, Ordering::Relaxed);
            info!(url = %work.url, left, "fetch flaked; asking for retry");
            return Outcome::retry();
        }
        match Data::builder().put("bytes", 4096i64).build() {
            Ok(output) => Outcome::success_with(output),
            Err(e) => Outcome::failure_reason(e.to_string()),
        }
    }
}

struct ResizeHandler;

#[async_trait]
impl Handler<Resize> for ResizeHandler {
    async fn handle(&self, work: Resize, ctx: &WorkContext) -> Outcome {
        for pct in [25i64, 50, 75] {
            if ctx.is_cancelled() {
                return Outcome::failure_reason("cancelled");
            }
            if let Ok(progress) = Data::builder().put("pct", pct).build() {
                let _ = ctx.set_progress(progress).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        info!(width = work.width, "resized");
        Outcome::success()
    }
}

struct ChecksumHandler;

#[async_trait]
impl Handler<Checksum> for ChecksumHandler {
    async fn handle(&self, work: Checksum, _ctx: &WorkContext) -> Outcome {
        if work.corrupt {
            return Outcome::failure_reason(format!("checksum mismatch in {}", work.part));
        }
        Outcome::success()
    }
}

struct PublishHandler;

#[async_trait]
impl Handler<Publish> for PublishHandler {
    async fn handle(&self, work: Publish, _ctx: &WorkContext) -> Outcome {
        info!(target = %work.target, "published");
        Outcome::success()
    }
}

fn spec<W: Work>(work: &W) -> Result<TaskSpec> {
    let spec = work
        .to_spec()
        .with_context(|| format!("encoding {}", W::TYPE))?;
    Ok(spec
        .with_tag(TAG)
        .with_backoff(Backoff::linear(Duration::from_millis(200))))
}

pub async fn run(config: SchedulerConfig, flaky_fetches: u32, fail_branch: bool) -> Result<()> {
    let scheduler = Scheduler::builder()
        .config(config)
        .register::<Fetch, _>(FetchHandler {
            flaky_left: AtomicU32::new(flaky_fetches),
        })?
        .register::<Resize, _>(ResizeHandler)?
        .register::<Checksum, _>(ChecksumHandler)?
        .register::<Publish, _>(PublishHandler)?
        .expect_work_types(&[Fetch::TYPE, Resize::TYPE, Checksum::TYPE, Publish::TYPE])
        .build()?;

    let mut observer = scheduler.observe_by_tag(TAG).await?;
    let dispatcher = scheduler.start();

    let chain = scheduler
        .submit_chain([
            spec(&Fetch {
                url: "https://example.invalid/photo.raw".into(),
            })?,
            spec(&Resize { width: 1024 })?,
            spec(&Publish {
                target: "gallery".into(),
            })?,
        ])
        .await?;
    info!(ids = ?chain, "chain submitted");

    let fan_in = scheduler
        .submit_fan_in(
            [
                spec(&Checksum {
                    part: "part-a".into(),
                    corrupt: false,
                })?,
                spec(&Checksum {
                    part: "part-b".into(),
                    corrupt: fail_branch,
                })?,
            ],
            spec(&Publish {
                target: "archive".into(),
            })?,
        )
        .await?;
    info!(ids = ?fan_in, "fan-in submitted");

    let mut unique = 0;
    for policy in [ExistingWorkPolicy::Keep, ExistingWorkPolicy::Keep] {
        let outcome = scheduler
            .submit_unique(
                "nightly-publish",
                policy,
                spec(&Publish {
                    target: "nightly".into(),
                })?,
            )
            .await?;
        info!(resolution = ?outcome.resolution, "unique submission");
        if outcome.created_new() {
            unique += outcome.ids.len();
        }
    }
    for n in 0..2 {
        let outcome = scheduler
            .submit_unique(
                "uploads",
                ExistingWorkPolicy::Append,
                spec(&Publish {
                    target: format!("upload-{n}"),
                })?,
            )
            .await?;
        info!(resolution = ?outcome.resolution, "unique submission");
        unique += outcome.ids.len();
    }

    let expected = chain.len() + fan_in.len() + unique;
    let wait = async {
        while let Some(snapshots) = observer.recv().await {
            if snapshots.len() == expected && snapshots.iter().all(|s| s.is_finished()) {
                return Some(snapshots);
            }
        }
        None
    };
    let Some(finished) = tokio::time::timeout(Duration::from_secs(30), wait).await? else {
        bail!("observation stream closed before the demo finished");
    };

    for s in &finished {
        println!(
            "{}  {:<18} {:<10} attempts={} warnings={:?}",
            s.id, s.work_type, s.state, s.attempt_count, s.warnings
        );
    }
    println!("{}", serde_json::to_string_pretty(&scheduler.counts().await?)?);

    let pruned = scheduler.prune().await?;
    info!(pruned = pruned.len(), "pruned finished work");

    dispatcher.shutdown().await;
    Ok(())
}
