use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lifecycle::{
    LifecycleError, LifecyclePhase, ManagedTask, PhaseCell, ShutdownSequence, StepResult, TaskExit,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records step names in the order they ran.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn explode() -> Result<(), String> {
    panic!("step exploded")
}

fn quick() -> Duration {
    Duration::from_millis(200)
}

// ---------------------------------------------------------------------------
// ShutdownSequence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn steps_run_in_registration_order() {
    let journal = Journal::default();
    let (a, b, c) = (journal.clone(), journal.clone(), journal.clone());

    let sequence = ShutdownSequence::new("test")
        .step("first", quick(), move || async move {
            a.push("first");
            Ok(())
        })
        .step("second", quick(), move || async move {
            b.push("second");
            Ok(())
        })
        .step("third", quick(), move || async move {
            c.push("third");
            Ok(())
        });
    assert_eq!(sequence.len(), 3);
    assert!(journal.entries().is_empty(), "steps must not run before run()");

    let report = sequence.run().await;

    assert!(report.is_clean());
    assert_eq!(journal.entries(), vec!["first", "second", "third"]);
    assert_eq!(
        report
            .steps
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>(),
        vec!["first", "second", "third"]
    );
}

/// A failing step is recorded, and the steps after it still run.
#[tokio::test]
async fn failed_step_does_not_stop_the_sequence() {
    let journal = Journal::default();
    let after = journal.clone();

    let report = ShutdownSequence::new("test")
        .step("broken", quick(), || async { Err("pool already closed".to_string()) })
        .step("after", quick(), move || async move {
            after.push("after");
            Ok(())
        })
        .run()
        .await;

    assert!(!report.is_clean());
    assert_eq!(
        report.step("broken").unwrap().result,
        StepResult::Failed("pool already closed".to_string())
    );
    assert_eq!(report.step("after").unwrap().result, StepResult::Completed);
    assert_eq!(journal.entries(), vec!["after"]);
    assert_eq!(
        report.into_result(),
        Err(LifecycleError::StepFailed {
            step: "broken".to_string(),
            reason: "pool already closed".to_string()
        })
    );
}

/// A step that hangs is abandoned at its timeout; the sequence total stays bounded.
#[tokio::test]
async fn hanging_step_times_out_and_sequence_continues() {
    let journal = Journal::default();
    let after = journal.clone();

    let started = Instant::now();
    let report = ShutdownSequence::new("test")
        .step("hang", Duration::from_millis(50), || async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .step("after", quick(), move || async move {
            after.push("after");
            Ok(())
        })
        .run()
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.step("hang").unwrap().result, StepResult::TimedOut);
    assert_eq!(journal.entries(), vec!["after"]);
    assert_eq!(report.errors().len(), 1);
}

#[tokio::test]
async fn panicking_step_is_contained() {
    let journal = Journal::default();
    let after = journal.clone();

    let report = ShutdownSequence::new("test")
        .step("panics", quick(), || async { explode() })
        .step("after", quick(), move || async move {
            after.push("after");
            Ok(())
        })
        .run()
        .await;

    assert_eq!(report.step("panics").unwrap().result, StepResult::Panicked);
    assert_eq!(journal.entries(), vec!["after"]);
}

#[tokio::test]
async fn empty_sequence_is_clean() {
    let sequence = ShutdownSequence::new("test");
    assert!(sequence.is_empty());
    let report = sequence.run().await;
    assert!(report.is_clean());
    assert!(report.into_result().is_ok());
}

// ---------------------------------------------------------------------------
// ManagedTask inside a sequence, the way a service wires it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequence_stops_tasks_and_advances_phase() {
    let phase = PhaseCell::new();
    phase.advance(LifecyclePhase::Running);

    let worker = ManagedTask::spawn("worker", |token| async move {
        token.cancelled().await;
    });
    let stuck = ManagedTask::spawn("stuck", |_token| async move {
        std::future::pending::<()>().await;
    });

    let exits = Arc::new(Mutex::new(Vec::new()));
    let (worker_exits, stuck_exits) = (exits.clone(), exits.clone());

    assert!(phase.advance(LifecyclePhase::Stopping));
    let report = ShutdownSequence::new("test")
        .step("worker", Duration::from_secs(1), move || async move {
            let exit = worker.stop(Duration::from_millis(500)).await;
            worker_exits.lock().unwrap().push(exit);
            Ok(())
        })
        .step("stuck", Duration::from_secs(1), move || async move {
            let exit = stuck.stop(Duration::from_millis(50)).await;
            stuck_exits.lock().unwrap().push(exit);
            Ok(())
        })
        .run()
        .await;
    assert!(phase.advance(LifecyclePhase::Stopped));

    assert!(report.is_clean());
    assert_eq!(
        *exits.lock().unwrap(),
        vec![TaskExit::Completed, TaskExit::Aborted]
    );
    assert_eq!(phase.get(), LifecyclePhase::Stopped);
    assert!(!phase.advance(LifecyclePhase::Running));
}
