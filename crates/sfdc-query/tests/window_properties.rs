use chrono::Duration;
use proptest::prelude::*;
use sfdc_query::prelude::*;
use sfdc_query::EnvExpr;
use sfdc_test_utils::{created_date_template, daily_defaults, hourly_defaults, utc};

fn interval_defaults(daily: bool, lag: u32) -> InstanceDefaults {
    if daily {
        daily_defaults(lag)
    } else {
        hourly_defaults(lag)
    }
}

proptest! {
    #[test]
    fn prop_lower_bound_never_decreases(
        daily in any::<bool>(),
        lag in 0u32..1_000,
        start_offset in 0i64..(365 * 24 * 60),
        steps in prop::collection::vec(0i64..(3 * 24 * 60), 1..12),
    ) {
        let resolver = QueryResolver::new(interval_defaults(daily, lag));
        let template = created_date_template();
        let mut now = utc(2023, 1, 1, 0, 0, 0) + Duration::minutes(start_offset);
        let mut watermark: Option<Watermark> = None;
        let mut last_from = None;

        for step in steps {
            now += Duration::minutes(step);
            let resolved = resolver.resolve(&template, watermark.as_ref(), now).unwrap();
            let window = *resolved.window();

            prop_assert!(window.from() <= window.to());
            if let Some(prev) = last_from {
                prop_assert!(window.from() >= prev);
            }
            if let Some(w) = watermark {
                prop_assert_eq!(window.from(), w.at());
                prop_assert!(resolved.candidate_watermark() >= w);
            }

            last_from = Some(window.from());
            watermark = Some(resolved.candidate_watermark());
        }
    }

    #[test]
    fn prop_upper_bound_is_aligned_and_lagged(
        daily in any::<bool>(),
        lag in 0u32..10_000,
        offset in 0i64..(365 * 24 * 60 * 60),
    ) {
        let defaults = interval_defaults(daily, lag);
        let now = utc(2023, 1, 1, 0, 0, 0) + Duration::seconds(offset);
        let window = ExtractionWindow::compute(&defaults, None, now).unwrap();

        prop_assert!(defaults.generation_interval.is_aligned(window.to()));
        prop_assert!(window.to() <= now - defaults.time_lag() || window.is_empty());
        prop_assert!(now - defaults.time_lag() - window.to() < defaults.generation_interval.period()
            || window.is_empty());
    }

    #[test]
    fn prop_standard_placeholders_always_resolve(
        picks in prop::collection::vec(0usize..3, 0..8),
        filler in "[A-Za-z0-9 =<>',.]{0,20}",
    ) {
        let names = ["from_timestamp", "to_timestamp", "log_interval_type"];
        let mut text = String::from("SELECT Id FROM EventLogFile WHERE ");
        for pick in picks {
            text.push_str(&filler);
            text.push('{');
            text.push_str(names[pick]);
            text.push('}');
        }

        let resolver = QueryResolver::new(hourly_defaults(60));
        let resolved = resolver
            .resolve(&QueryTemplate::new(text), None, utc(2024, 1, 2, 3, 0, 0))
            .unwrap();
        prop_assert!(
            !resolved.query().contains('{'),
            "unresolved placeholder in {}",
            resolved.query()
        );
        prop_assert!(
            !resolved.query().contains('}'),
            "unresolved placeholder in {}",
            resolved.query()
        );
    }

    #[test]
    fn prop_now_offset_is_exact(minutes in -100_000i64..100_000, secs in 0i64..86_400) {
        let now = utc(2024, 1, 1, 0, 0, 0) + Duration::seconds(secs);
        let expr = EnvExpr::parse(&format!("now(timedelta(minutes={minutes}))")).unwrap();
        prop_assert_eq!(expr.evaluate(now), Some(now + Duration::minutes(minutes)));
    }
}
