mod common;

use std::collections::HashSet;
use std::time::Duration;

use bobbin_core::domain::{
    DedupResolution, ExistingWorkPolicy, Outcome, Schedule, SchedulerError, TaskState,
    ValidationError,
};
use bobbin_core::graph::WorkGraph;
use common::{Harness, task};

const NAME: &str = "sync-photos";

#[tokio::test(start_paused = true)]
async fn keep_discards_the_new_submission_while_work_is_active() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Keep, task("sync"))
        .await
        .unwrap();
    assert_eq!(first.resolution, DedupResolution::Created);

    let second = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Keep, task("sync"))
        .await
        .unwrap();
    assert_eq!(second.resolution, DedupResolution::KeptExisting);
    assert_eq!(second.ids, first.ids);
    assert!(!second.created_new());
    assert_eq!(h.scheduler.counts().await.unwrap().total(), 1);

    // once the kept work has finished, a new submission goes through
    let id = first.ids[0];
    h.run_ready().await;
    h.finish(id, Outcome::success()).await;
    let third = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Keep, task("sync"))
        .await
        .unwrap();
    assert_eq!(third.resolution, DedupResolution::Created);
    assert_ne!(third.ids, first.ids);
}

#[tokio::test(start_paused = true)]
async fn replace_cancels_active_work_first() {
    let mut h = Harness::new();
    let old = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Replace, task("sync"))
        .await
        .unwrap()
        .ids[0];
    let runs = h.run_ready().await;

    let replaced = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Replace, task("sync"))
        .await
        .unwrap();
    assert_eq!(
        replaced.resolution,
        DedupResolution::Replaced {
            cancelled: vec![old]
        }
    );
    assert_eq!(h.state(old).await, TaskState::Cancelled);
    assert!(runs[0].1.is_cancelled());

    let new = replaced.ids[0];
    assert_eq!(h.state(new).await, TaskState::Enqueued);
    assert_eq!(h.run_ready_ids().await, vec![new]);
}

#[tokio::test(start_paused = true)]
async fn append_runs_after_the_active_predecessor() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    let appended = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap();
    assert_eq!(
        appended.resolution,
        DedupResolution::Appended { after: first }
    );
    let second = appended.ids[0];

    let snap = h.snapshot(second).await;
    assert_eq!(snap.state, TaskState::Blocked);
    assert_eq!(snap.depends_on, vec![first]);
    assert_eq!(snap.unique_name.as_deref(), Some(NAME));

    // a third append chains after the second, not the first
    let third = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap();
    assert_eq!(
        third.resolution,
        DedupResolution::Appended { after: second }
    );

    assert_eq!(h.run_ready_ids().await, vec![first]);
    h.finish(first, Outcome::success()).await;
    assert_eq!(h.run_ready_ids().await, vec![second]);
}

#[tokio::test(start_paused = true)]
async fn append_after_success_is_immediately_eligible() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    h.run_ready().await;
    h.finish(first, Outcome::success()).await;

    let appended = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap();
    assert_eq!(
        appended.resolution,
        DedupResolution::Appended { after: first }
    );
    assert_eq!(h.run_ready_ids().await, appended.ids);
}

#[tokio::test(start_paused = true)]
async fn append_after_failure_creates_cancelled_work() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    h.run_ready().await;
    h.finish(first, Outcome::failure()).await;

    let appended = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap();
    let snap = h.snapshot(appended.ids[0]).await;
    assert_eq!(snap.state, TaskState::Cancelled);
    assert!(!snap.warnings.is_empty());
    assert!(h.run_ready_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn append_or_replace_starts_fresh_after_failure() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::AppendOrReplace, task("upload"))
        .await
        .unwrap()
        .ids[0];
    h.run_ready().await;
    h.finish(first, Outcome::failure()).await;

    let fresh = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::AppendOrReplace, task("upload"))
        .await
        .unwrap();
    assert_eq!(
        fresh.resolution,
        DedupResolution::ReplacedFailed { predecessor: first }
    );
    let snap = h.snapshot(fresh.ids[0]).await;
    assert_eq!(snap.state, TaskState::Enqueued);
    assert!(snap.depends_on.is_empty());
    assert_eq!(h.run_ready_ids().await, fresh.ids);
}

#[tokio::test(start_paused = true)]
async fn append_or_replace_appends_to_active_work() {
    let h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::AppendOrReplace, task("upload"))
        .await
        .unwrap()
        .ids[0];
    let next = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::AppendOrReplace, task("upload"))
        .await
        .unwrap();
    assert_eq!(next.resolution, DedupResolution::Appended { after: first });
}

#[tokio::test(start_paused = true)]
async fn appended_chain_hangs_off_its_roots() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    let chain = WorkGraph::chain([task("compress"), task("upload")]).unwrap();
    let appended = h
        .scheduler
        .submit_unique_graph(NAME, ExistingWorkPolicy::Append, chain)
        .await
        .unwrap();
    let (root, tail) = (appended.ids[0], appended.ids[1]);

    assert_eq!(h.snapshot(root).await.depends_on, vec![first]);
    assert_eq!(h.snapshot(tail).await.depends_on, vec![root]);
    assert_eq!(appended.id(), Some(tail));

    h.run_ready().await;
    h.finish(first, Outcome::success()).await;
    assert_eq!(h.run_ready_ids().await, vec![root]);
    assert_eq!(h.state(tail).await, TaskState::Blocked);
}

#[tokio::test(start_paused = true)]
async fn cancel_unique_cancels_every_active_task_with_the_name() {
    let mut h = Harness::new();
    let first = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    let second = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, task("upload"))
        .await
        .unwrap()
        .ids[0];
    let unrelated = h.scheduler.submit(task("upload")).await.unwrap();

    let mut cancelled = h.scheduler.cancel_unique(NAME).await.unwrap();
    cancelled.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(cancelled, expected);

    assert_eq!(h.run_ready_ids().await, vec![unrelated]);
}

#[tokio::test(start_paused = true)]
async fn invalid_unique_submissions_are_rejected() {
    let h = Harness::new();

    let err = h
        .scheduler
        .submit_unique("  ", ExistingWorkPolicy::Keep, task("x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Validation(ValidationError::EmptyUniqueName)
    ));

    let periodic = task("sync").with_schedule(Schedule::periodic(Duration::from_secs(3600)));
    let err = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Append, periodic.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Validation(ValidationError::PeriodicInGraph)
    ));

    // periodic unique work is fine under Keep / Replace
    let kept = h
        .scheduler
        .submit_unique(NAME, ExistingWorkPolicy::Keep, periodic)
        .await
        .unwrap();
    assert_eq!(kept.resolution, DedupResolution::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_keep_submissions_create_one_task() {
    let h = Harness::new();
    let handles: Vec<_> = (0..64)
        .map(|_| {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .submit_unique(NAME, ExistingWorkPolicy::Keep, task("sync"))
                    .await
            })
        })
        .collect();

    let mut id_sets = HashSet::new();
    let mut created = 0;
    for handle in handles {
        let submission = handle.await.unwrap().unwrap();
        if submission.created_new() {
            created += 1;
        }
        id_sets.insert(submission.ids);
    }
    assert_eq!(created, 1);
    assert_eq!(id_sets.len(), 1);
    assert_eq!(h.scheduler.counts().await.unwrap().total(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replace_and_cancel_leave_at_most_one_active_task() {
    let h = Harness::new();
    let mut handles = Vec::new();
    for i in 0..32 {
        let scheduler = h.scheduler.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                scheduler
                    .submit_unique(NAME, ExistingWorkPolicy::Replace, task("sync"))
                    .await
                    .map(drop)
            } else {
                scheduler.cancel_unique(NAME).await.map(drop)
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let counts = h.scheduler.counts().await.unwrap();
    assert_eq!(counts.total(), 16);
    assert!(counts.active() <= 1);
    assert_eq!(counts.blocked + counts.running, 0);
    assert_eq!(counts.cancelled + counts.enqueued, 16);
}
