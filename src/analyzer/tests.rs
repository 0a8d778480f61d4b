use super::{Decision, SampleWindow, WindowAnalyzer};
use crate::config::ChannelConfig;
use crate::reading::Sample;
use chrono::{Duration, NaiveDate, NaiveDateTime};

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 9, 29)
        .unwrap()
        .and_hms_opt(14, 0, 0)
        .unwrap()
}

fn at_seconds(offset: i64, temperature: Option<f64>) -> Sample {
    Sample::new(start() + Duration::seconds(offset), temperature)
}

/// Feeds `temps` spaced evenly over `span_seconds`, returning the decision for
/// the last one.
fn feed(analyzer: &mut WindowAnalyzer, temps: &[Option<f64>], span_seconds: i64) -> Decision {
    let steps = (temps.len().max(2) - 1) as i64;
    let mut last = None;
    for (idx, temp) in temps.iter().enumerate() {
        let offset = span_seconds * idx as i64 / steps;
        last = Some(analyzer.evaluate(at_seconds(offset, *temp)));
    }
    last.expect("at least one sample")
}

#[test]
fn window_length_is_capped_at_capacity() {
    for capacity in [1usize, 5, 20] {
        for count in 0..(capacity * 2 + 3) {
            let mut window = SampleWindow::new(capacity);
            for idx in 0..count {
                window.push(at_seconds(idx as i64, Some(idx as f64)));
            }
            assert_eq!(window.len(), count.min(capacity));
        }
    }
}

#[test]
fn window_evicts_oldest_first() {
    let mut window = SampleWindow::new(3);
    for idx in 0..3 {
        assert!(window.push(at_seconds(idx, Some(idx as f64))).is_none());
    }
    let evicted = window.push(at_seconds(3, Some(3.0))).expect("evicted");
    assert_eq!(evicted.temperature, Some(0.0));
    let evicted = window.push(at_seconds(4, None)).expect("evicted");
    assert_eq!(evicted.temperature, Some(1.0));

    let remaining: Vec<Option<f64>> = window.iter().map(|s| s.temperature).collect();
    assert_eq!(remaining, vec![Some(2.0), Some(3.0), None]);
    assert_eq!(window.first().map(|s| s.timestamp), Some(start() + Duration::seconds(2)));
    assert_eq!(window.last().map(|s| s.timestamp), Some(start() + Duration::seconds(4)));
}

#[test]
fn partial_window_reports_insufficient_data() {
    for config in [ChannelConfig::smoker(), ChannelConfig::food_a(), ChannelConfig::food_b()] {
        let capacity = config.window_capacity;
        let mut analyzer = WindowAnalyzer::new(config);
        for idx in 0..capacity - 1 {
            let decision = analyzer.evaluate(at_seconds(idx as i64 * 30, Some(500.0)));
            assert_eq!(
                decision,
                Decision::InsufficientData {
                    len: idx + 1,
                    capacity
                }
            );
        }
        let decision = analyzer.evaluate(at_seconds(capacity as i64 * 30, Some(500.0)));
        assert!(!matches!(decision, Decision::InsufficientData { .. }));
    }
}

#[test]
fn full_window_with_too_few_valid_temps_never_alerts() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(&mut analyzer, &[None, None, Some(300.0), None, None], 60);
    assert_eq!(decision, Decision::InsufficientValidData { valid: 1 });

    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(&mut analyzer, &[None; 5], 60);
    assert_eq!(decision, Decision::InsufficientValidData { valid: 0 });
}

#[test]
fn smoker_swing_within_time_window_alerts() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(
        &mut analyzer,
        &[Some(225.0), None, None, None, Some(210.0)],
        120,
    );
    match decision {
        Decision::Alert(trend) => {
            assert_eq!(trend.first_temp, 225.0);
            assert_eq!(trend.last_temp, 210.0);
            assert_eq!(trend.delta, 15.0);
            assert!((trend.elapsed_minutes - 2.0).abs() < 1e-9);
        }
        other => panic!("expected alert, got {other:?}"),
    }
}

#[test]
fn smoker_swing_outside_time_window_does_not_alert() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(
        &mut analyzer,
        &[Some(225.0), None, None, None, Some(210.0)],
        180,
    );
    match decision {
        Decision::NoAlert(trend) => {
            assert_eq!(trend.delta, 15.0);
            assert!((trend.elapsed_minutes - 3.0).abs() < 1e-9);
        }
        other => panic!("expected no alert, got {other:?}"),
    }
}

#[test]
fn food_small_change_is_not_an_alert() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::food_a());
    let mut temps = vec![None; 20];
    temps[0] = Some(165.0);
    temps[19] = Some(165.4);
    let decision = feed(&mut analyzer, &temps, 9 * 60);
    match decision {
        Decision::NoAlert(trend) => {
            assert!((trend.delta - 0.4).abs() < 1e-9);
            assert!((trend.elapsed_minutes - 9.0).abs() < 1e-9);
        }
        other => panic!("expected no alert, got {other:?}"),
    }
}

#[test]
fn first_and_last_are_positional_not_extremes() {
    let mut ascending = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(
        &mut ascending,
        &[Some(200.0), Some(240.0), Some(220.0), Some(230.0), Some(205.0)],
        60,
    );
    assert_eq!(decision.trend().map(|t| t.delta), Some(5.0));
    assert!(!decision.is_alert());

    let mut shuffled = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(
        &mut shuffled,
        &[Some(200.0), Some(205.0), Some(220.0), Some(230.0), Some(240.0)],
        60,
    );
    assert_eq!(decision.trend().map(|t| t.delta), Some(40.0));
    assert!(decision.is_alert());
}

#[test]
fn gaps_at_window_edges_still_count_toward_elapsed_time() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    // Valid readings sit one minute apart but the raw window spans four.
    let decision = feed(
        &mut analyzer,
        &[None, Some(250.0), Some(230.0), None, None],
        240,
    );
    match decision {
        Decision::NoAlert(trend) => {
            assert_eq!(trend.delta, 20.0);
            assert!((trend.elapsed_minutes - 4.0).abs() < 1e-9);
        }
        other => panic!("expected no alert, got {other:?}"),
    }
}

#[test]
fn evaluation_continues_on_every_sample_after_fill() {
    let mut analyzer = WindowAnalyzer::new(ChannelConfig::smoker());
    let decision = feed(&mut analyzer, &[Some(225.0); 5], 120);
    assert!(!decision.is_alert());

    // Each new sample slides the window; a late drop shows up on its own.
    let decision = analyzer.evaluate(at_seconds(150, Some(225.0)));
    assert!(matches!(decision, Decision::NoAlert(_)));
    let decision = analyzer.evaluate(at_seconds(180, Some(200.0)));
    match decision {
        Decision::Alert(trend) => {
            assert_eq!(trend.delta, 25.0);
            assert!((trend.elapsed_minutes - 2.0).abs() < 1e-9);
        }
        other => panic!("expected alert, got {other:?}"),
    }
    assert_eq!(analyzer.window().len(), 5);
}

#[test]
fn threshold_and_time_window_are_inclusive() {
    let config = ChannelConfig {
        alert_threshold: 10.0,
        time_window_minutes: 1.0,
        ..ChannelConfig::smoker()
    };
    let mut analyzer = WindowAnalyzer::new(config);
    let decision = feed(
        &mut analyzer,
        &[Some(100.0), None, None, None, Some(110.0)],
        60,
    );
    assert!(decision.is_alert());
}
