use lab_core::simulation::{advance, DEFAULT_MAX_INCREMENT, DEFAULT_RESOURCE_CEILING};
use lab_core::types::{clamp_progress, experiment_name, NAME_PREFIX};
use lab_core::{ExperimentStatus, TickModel, TickOutcome, UniformTickModel};
use lab_test_utils::experiment_with;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_clamped_progress_in_range(progress in any::<f64>()) {
        let clamped = clamp_progress(progress);
        prop_assert!((0.0..=100.0).contains(&clamped));
    }

    #[test]
    fn prop_uniform_samples_respect_bounds(seed in any::<u64>()) {
        let mut model =
            UniformTickModel::seeded(seed, DEFAULT_MAX_INCREMENT, DEFAULT_RESOURCE_CEILING);
        for _ in 0..32 {
            let increment = model.progress_increment();
            prop_assert!((0.0..DEFAULT_MAX_INCREMENT).contains(&increment));

            let usage = model.resource_sample();
            prop_assert!((0.0..DEFAULT_RESOURCE_CEILING.cpu).contains(&usage.cpu));
            prop_assert!((0.0..DEFAULT_RESOURCE_CEILING.memory).contains(&usage.memory));
            prop_assert!((0.0..DEFAULT_RESOURCE_CEILING.network).contains(&usage.network));
            prop_assert!((0.0..DEFAULT_RESOURCE_CEILING.storage).contains(&usage.storage));
        }
    }

    #[test]
    fn prop_ticks_are_monotonic_until_completion(seed in any::<u64>(), start in 0.0f64..=100.0) {
        let mut model =
            UniformTickModel::seeded(seed, DEFAULT_MAX_INCREMENT, DEFAULT_RESOURCE_CEILING);
        let mut exp = experiment_with("sim", ExperimentStatus::Running, start);
        let mut last = exp.progress;

        // generous upper bound on ticks
        for _ in 0..10_000 {
            match advance(&mut exp, &mut model) {
                Some(TickOutcome::Advanced { progress }) => {
                    prop_assert!(progress >= last);
                    prop_assert!(progress <= 100.0);
                    prop_assert!(exp.end_time.is_none());
                    last = progress;
                }
                Some(TickOutcome::Completed) => {
                    prop_assert_eq!(exp.status, ExperimentStatus::Completed);
                    prop_assert_eq!(exp.progress, 100.0);
                    prop_assert!(exp.end_time.is_some());
                    break;
                }
                None => prop_assert!(false, "running experiment was not advanced"),
            }
        }
        prop_assert!(advance(&mut exp, &mut model).is_none());
    }

    #[test]
    fn prop_names_keep_at_most_limit_chars(topic in "\\PC{0,80}", limit in 1usize..60) {
        let name = experiment_name(&topic, limit);
        prop_assert!(name.starts_with(NAME_PREFIX));

        let rest = &name[NAME_PREFIX.len()..];
        if topic.chars().count() > limit {
            prop_assert!(rest.ends_with("..."));
            prop_assert_eq!(rest.chars().count(), limit + 3);
        } else {
            prop_assert_eq!(rest, topic.as_str());
        }
    }
}
