use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::*;

fn ok(summary: &'static str) -> impl Fn() -> futures::future::Ready<anyhow::Result<String>> {
    move || futures::future::ready(Ok(summary.to_owned()))
}

fn fail(message: &'static str) -> impl Fn() -> futures::future::Ready<anyhow::Result<String>> {
    move || futures::future::ready(Err(anyhow::anyhow!(message)))
}

async fn explode() -> anyhow::Result<String> {
    panic!("detector exploded")
}

/// The four-stage diamond used by the pipeline, with caller-supplied load
/// and classify behaviour and a transform that records whether it ran.
fn diamond<L, LF, C, CF>(load: L, classify: C, transform_ran: Arc<AtomicBool>) -> Dag
where
    L: Fn() -> LF + Send + Sync + 'static,
    LF: Future<Output = anyhow::Result<String>> + Send + 'static,
    C: Fn() -> CF + Send + Sync + 'static,
    CF: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Dag::builder()
        .stage("collect", &[], ok("collected"))
        .stage("load", &["collect"], load)
        .stage("classify", &["collect"], classify)
        .stage("transform", &["load", "classify"], move || {
            let ran = Arc::clone(&transform_ran);
            async move {
                ran.store(true, Ordering::SeqCst);
                Ok("transformed".to_owned())
            }
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn all_stages_succeed_in_dependency_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let order = Arc::clone(&order);
        move || {
            let order = Arc::clone(&order);
            async move {
                order.lock().unwrap().push(name);
                Ok::<_, anyhow::Error>(name.to_owned())
            }
        }
    };

    let dag = Dag::builder()
        .stage("collect", &[], record("collect"))
        .stage("load", &["collect"], record("load"))
        .stage("classify", &["collect"], record("classify"))
        .stage("transform", &["load", "classify"], record("transform"))
        .build()
        .unwrap();

    let report = dag.execute().await;

    assert!(report.succeeded());
    let order = order.lock().unwrap().clone();
    assert_eq!(order.first(), Some(&"collect"));
    assert_eq!(order.last(), Some(&"transform"));
    assert_eq!(order.len(), 4);
}

#[tokio::test]
async fn failed_load_blocks_transform_but_classify_still_succeeds() {
    let transform_ran = Arc::new(AtomicBool::new(false));
    let dag = diamond(fail("warehouse unreachable"), ok("classified"), Arc::clone(&transform_ran));

    let report = dag.execute().await;

    assert!(!report.succeeded());
    assert!(matches!(
        report.state("load"),
        Some(StageState::Failed { error }) if error.contains("warehouse unreachable")
    ));
    assert!(matches!(report.state("classify"), Some(StageState::Succeeded { .. })));
    assert_eq!(
        report.state("transform"),
        Some(&StageState::Blocked { by: "load" })
    );
    assert!(!transform_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_root_blocks_every_dependent() {
    let dag = Dag::builder()
        .stage("collect", &[], fail("no channels"))
        .stage("load", &["collect"], ok("loaded"))
        .stage("classify", &["collect"], ok("classified"))
        .stage("transform", &["load", "classify"], ok("transformed"))
        .build()
        .unwrap();

    let report = dag.execute().await;

    for name in ["load", "classify", "transform"] {
        assert!(
            matches!(report.state(name), Some(StageState::Blocked { .. })),
            "{name} should be blocked"
        );
    }
}

#[tokio::test]
async fn panicking_stage_counts_as_failed() {
    let transform_ran = Arc::new(AtomicBool::new(false));
    let dag = diamond(ok("loaded"), explode, Arc::clone(&transform_ran));

    let report = dag.execute().await;

    assert!(matches!(
        report.state("classify"),
        Some(StageState::Failed { error }) if error.contains("detector exploded")
    ));
    assert!(matches!(report.state("load"), Some(StageState::Succeeded { .. })));
    assert_eq!(
        report.state("transform"),
        Some(&StageState::Blocked { by: "classify" })
    );
    assert!(!transform_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn independent_branches_run_concurrently() {
    // Each branch waits for the other to have started; sequential execution
    // would deadlock and trip the timeout.
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let branch = |barrier: Arc<tokio::sync::Barrier>| {
        move || {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok::<_, anyhow::Error>("met".to_owned())
            }
        }
    };
    let dag = diamond(
        branch(Arc::clone(&barrier)),
        branch(Arc::clone(&barrier)),
        Arc::new(AtomicBool::new(false)),
    );

    let report = tokio::time::timeout(Duration::from_secs(5), dag.execute())
        .await
        .expect("branches should not wait on each other");

    assert!(report.succeeded());
}

#[tokio::test]
async fn each_execution_starts_from_fresh_state() {
    let dag = diamond(ok("loaded"), ok("classified"), Arc::new(AtomicBool::new(false)));

    let first = dag.execute().await;
    let second = dag.execute().await;

    assert!(first.succeeded());
    assert!(second.succeeded());
}

#[test]
fn rejects_unknown_dependency() {
    let err = Dag::builder()
        .stage("load", &["collect"], ok("loaded"))
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("unknown stage collect"));
}

#[test]
fn rejects_duplicate_stage() {
    let err = Dag::builder()
        .stage("collect", &[], ok("a"))
        .stage("collect", &[], ok("b"))
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn rejects_cycle() {
    let err = Dag::builder()
        .stage("a", &["b"], ok("a"))
        .stage("b", &["a"], ok("b"))
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn dependencies_are_listed_in_topological_order() {
    let dag = diamond(ok("l"), ok("c"), Arc::new(AtomicBool::new(false)));
    let deps = dag.dependencies();

    assert_eq!(deps.first(), Some(&("collect", vec![])));
    assert_eq!(deps.last(), Some(&("transform", vec!["classify", "load"])));
}
