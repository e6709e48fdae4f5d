use lab_core::engine::MIN_TICK_INTERVAL;
use lab_core::{
    Experiment, ExperimentStatus, Lab, LabConfig, LabError, LifecycleEngine, StoreChange,
};
use lab_test_utils::{
    expect_experiment, fast_config, fixed_lab, fixed_lab_with_limit, fixed_model, run_ticks,
    seed_pending, test_store, TEST_USAGE,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn start_runs_to_completion() {
    let lab = fixed_lab(25.0);
    let id = seed_pending(&lab, "enzyme kinetics");

    lab.start(id).unwrap();
    assert!(lab.engine().is_simulating(id));

    // four ticks reach 100, the fifth completes
    run_ticks(4).await;
    let state = lab.snapshot();
    let exp = expect_experiment(&state, id);
    assert_eq!(exp.status, ExperimentStatus::Running);
    assert_eq!(exp.progress, 100.0);
    assert_eq!(exp.resource_usage, TEST_USAGE);

    run_ticks(1).await;
    let state = lab.snapshot();
    let exp = expect_experiment(&state, id);
    assert_eq!(exp.status, ExperimentStatus::Completed);
    assert!(exp.end_time.is_some());
    assert!(!lab.engine().is_simulating(id));
}

#[tokio::test(start_paused = true)]
async fn no_tick_before_first_interval() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "tides");

    lab.start(id).unwrap();
    tokio::task::yield_now().await;

    let exp = lab.store().experiment(id).unwrap();
    assert_eq!(exp.progress, 0.0);
    assert!(exp.resource_usage.is_zero());
}

#[tokio::test(start_paused = true)]
async fn pause_keeps_progress_and_stops_ticking() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "glaciers");

    lab.start(id).unwrap();
    run_ticks(3).await;
    lab.pause(id).unwrap();

    let paused = lab.store().experiment(id).unwrap();
    assert_eq!(paused.status, ExperimentStatus::Pending);
    assert_eq!(paused.progress, 30.0);
    assert!(!lab.engine().is_simulating(id));

    run_ticks(5).await;
    assert_eq!(lab.store().experiment(id).unwrap().progress, 30.0);

    // resuming continues from the kept progress
    lab.start(id).unwrap();
    run_ticks(2).await;
    assert_eq!(lab.store().experiment(id).unwrap().progress, 50.0);
}

#[tokio::test(start_paused = true)]
async fn pause_of_pending_is_a_no_op() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "lichen");
    let revision = lab.store().revision();

    lab.pause(id).unwrap();
    lab.pause(id).unwrap();

    assert_eq!(lab.store().revision(), revision);
    assert_eq!(
        lab.store().experiment(id).unwrap().status,
        ExperimentStatus::Pending
    );
}

#[tokio::test(start_paused = true)]
async fn pause_of_completed_is_illegal() {
    let lab = fixed_lab(50.0);
    let id = seed_pending(&lab, "orbits");
    lab.start(id).unwrap();
    lab.wait_for(|s| s.experiment(id).is_some_and(Experiment::is_finished))
        .await;

    let err = lab.pause(id).unwrap_err();
    assert!(matches!(
        err,
        LabError::IllegalTransition {
            from: ExperimentStatus::Completed,
            to: ExperimentStatus::Pending,
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn start_of_completed_is_illegal() {
    let lab = fixed_lab(50.0);
    let id = seed_pending(&lab, "comets");
    lab.start(id).unwrap();
    lab.wait_for(|s| s.experiment(id).is_some_and(Experiment::is_finished))
        .await;

    assert!(matches!(
        lab.start(id),
        Err(LabError::IllegalTransition { .. })
    ));
    assert!(!lab.engine().is_simulating(id));
}

#[tokio::test(start_paused = true)]
async fn double_start_is_rejected() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "bats");

    lab.start(id).unwrap();
    assert!(matches!(
        lab.start(id),
        Err(LabError::IllegalTransition {
            from: ExperimentStatus::Running,
            to: ExperimentStatus::Running,
        })
    ));
    assert_eq!(lab.engine().active_simulations(), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_simulation_and_selection() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "ferns");
    let other = seed_pending(&lab, "mosses");

    lab.start(id).unwrap();
    lab.select(Some(id));
    run_ticks(1).await;

    let removed = lab.delete(id).unwrap();
    assert_eq!(removed.id, id);
    assert!(!lab.engine().is_simulating(id));

    let state = lab.snapshot();
    assert!(state.experiment(id).is_none());
    assert_eq!(state.active_experiment, None);
    assert!(state.experiment(other).is_some());

    // later ticks must not resurrect the record
    run_ticks(3).await;
    assert!(lab.snapshot().experiment(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn unknown_ids_are_not_found() {
    let lab = fixed_lab(10.0);
    let ghost = lab_core::ExperimentId::new();
    let revision = lab.store().revision();

    assert!(lab.start(ghost).unwrap_err().is_not_found());
    assert!(lab.pause(ghost).unwrap_err().is_not_found());
    assert!(lab.delete(ghost).unwrap_err().is_not_found());
    assert_eq!(lab.store().revision(), revision);
}

#[tokio::test(start_paused = true)]
async fn capacity_limits_running_experiments() {
    let lab = fixed_lab_with_limit(10.0, 2);
    let a = seed_pending(&lab, "a");
    let b = seed_pending(&lab, "b");
    let c = seed_pending(&lab, "c");

    lab.start(a).unwrap();
    lab.start(b).unwrap();
    let err = lab.start(c).unwrap_err();
    assert!(matches!(err, LabError::AtCapacity { limit: 2 }));
    assert!(err.is_retryable());
    assert_eq!(
        lab.store().experiment(c).unwrap().status,
        ExperimentStatus::Pending
    );

    lab.pause(a).unwrap();
    lab.start(c).unwrap();
    assert_eq!(lab.snapshot().running_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn experiments_progress_independently() {
    let lab = fixed_lab(10.0);
    let first = seed_pending(&lab, "first");
    let second = seed_pending(&lab, "second");

    lab.start(first).unwrap();
    run_ticks(2).await;
    lab.start(second).unwrap();
    run_ticks(3).await;

    let state = lab.snapshot();
    assert_eq!(expect_experiment(&state, first).progress, 50.0);
    assert_eq!(expect_experiment(&state, second).progress, 30.0);
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_end_time_tracks_terminal_status() {
    let lab = fixed_lab(30.0);
    let id = seed_pending(&lab, "storms");
    let mut rx = lab.subscribe();

    lab.start(id).unwrap();
    let done = lab
        .wait_for(|s| s.experiment(id).is_some_and(Experiment::is_finished))
        .await;
    assert_eq!(expect_experiment(&done, id).progress, 100.0);

    let mut last = 0.0;
    let mut last_revision = 0;
    while let Ok(event) = rx.try_recv() {
        assert!(event.revision > last_revision);
        last_revision = event.revision;
        assert_eq!(event.change, StoreChange::ExperimentUpdated(id));

        let exp = expect_experiment(&event.state, id);
        assert!(exp.progress >= last);
        assert!((0.0..=100.0).contains(&exp.progress));
        assert_eq!(exp.end_time.is_some(), exp.status.is_terminal());
        last = exp.progress;
    }
    assert_eq!(last, 100.0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_returns_running_to_pending() {
    let lab = fixed_lab(10.0);
    let a = seed_pending(&lab, "a");
    let b = seed_pending(&lab, "b");
    lab.start(a).unwrap();
    lab.start(b).unwrap();
    run_ticks(1).await;

    assert_eq!(lab.shutdown(), 2);
    assert_eq!(lab.engine().active_simulations(), 0);

    let state = lab.snapshot();
    assert_eq!(state.running_count(), 0);
    assert_eq!(expect_experiment(&state, a).progress, 10.0);

    run_ticks(2).await;
    assert_eq!(lab.snapshot().experiment(b).unwrap().progress, 10.0);
}

#[tokio::test(start_paused = true)]
async fn submitted_topic_can_be_started() {
    let lab = fixed_lab(50.0);
    let submission = lab.submit_topic("deep sea vents").await.unwrap();

    lab.start(submission.experiment).unwrap();
    let state = lab
        .wait_for(|s| {
            s.experiment(submission.experiment)
                .is_some_and(Experiment::is_finished)
        })
        .await;

    let exp = expect_experiment(&state, submission.experiment);
    assert_eq!(exp.name, "Research: deep sea vents");
    assert_eq!(exp.status, ExperimentStatus::Completed);
    assert_eq!(lab.monitoring().counts.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn sub_millisecond_tick_still_runs_to_completion() {
    let config = LabConfig::new()
        .with_tick_interval(Duration::from_micros(500))
        .with_seed(1);
    assert_eq!(config.tick_interval_ms, 1);
    let lab = Lab::new(config);
    let id = seed_pending(&lab, "femtochemistry");

    lab.start(id).unwrap();
    let state = lab
        .wait_for(|s| s.experiment(id).is_some_and(Experiment::is_finished))
        .await;

    assert_eq!(expect_experiment(&state, id).status, ExperimentStatus::Completed);
    assert!(!lab.engine().is_simulating(id));
}

#[tokio::test(start_paused = true)]
async fn out_of_range_config_is_corrected_by_the_lab() {
    let config = LabConfig {
        tick_interval_ms: 0,
        max_progress_increment: f64::INFINITY,
        event_buffer: 0,
        ..fast_config()
    };
    let lab = Lab::new(config);
    assert_eq!(lab.engine().tick_interval(), MIN_TICK_INTERVAL);
    assert_eq!(lab.config().max_progress_increment, 100.0);

    let id = seed_pending(&lab, "black holes");
    lab.start(id).unwrap();
    let state = lab
        .wait_for(|s| s.experiment(id).is_some_and(Experiment::is_finished))
        .await;

    let exp = expect_experiment(&state, id);
    assert_eq!(exp.status, ExperimentStatus::Completed);
    assert_eq!(exp.progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn engine_raises_zero_interval_to_minimum() {
    let engine = LifecycleEngine::new(test_store(), Duration::ZERO, fixed_model(50.0).factory());
    assert_eq!(engine.tick_interval(), MIN_TICK_INTERVAL);

    let id = engine
        .store()
        .add_experiment(lab_test_utils::pending_experiment("quarks"));
    engine.start(id).unwrap();
    tokio::time::sleep(MIN_TICK_INTERVAL * 4).await;
    tokio::task::yield_now().await;

    assert_eq!(
        engine.store().experiment(id).unwrap().status,
        ExperimentStatus::Completed
    );
    assert_eq!(engine.active_simulations(), 0);
}

#[test]
fn start_outside_runtime_changes_nothing() {
    let lab = fixed_lab(10.0);
    let id = seed_pending(&lab, "no runtime");
    let revision = lab.store().revision();

    let err = lab.start(id).unwrap_err();

    assert!(matches!(err, LabError::NoRuntime));
    assert_eq!(lab.store().revision(), revision);
    assert_eq!(
        lab.store().experiment(id).unwrap().status,
        ExperimentStatus::Pending
    );
    assert!(!lab.engine().is_simulating(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_start_and_pause_keep_timer_in_step() {
    // ticks never fire during the race
    let config = fast_config().with_tick_interval(Duration::from_secs(3600));
    let lab = Arc::new(Lab::with_models(config, fixed_model(1.0).factory()));
    let id = seed_pending(&lab, "contention");

    let mut workers = Vec::new();
    for n in 0..4 {
        let lab = Arc::clone(&lab);
        workers.push(tokio::task::spawn_blocking(move || {
            for _ in 0..5_000 {
                if n % 2 == 0 {
                    let _ = lab.start(id);
                } else {
                    lab.pause(id).unwrap();
                }
                assert!(lab.engine().active_simulations() <= 1);
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let running = lab.store().experiment(id).unwrap().status == ExperimentStatus::Running;
    assert_eq!(running, lab.engine().is_simulating(id));

    lab.start(id).ok();
    assert!(lab.engine().is_simulating(id));
    lab.pause(id).unwrap();
    assert!(!lab.engine().is_simulating(id));
}
