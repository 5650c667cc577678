mod common;

use std::rc::Rc;

use common::{Log, RecordingSource, Request};
use cubism::{Context, ContextConfig, EventType, ListenerKey, ManualClock, Metric, MetricEvent, SourceError};

// step 1s, 10 samples, 2s server delay, 1s client delay, now = 1_234_567:
//   displayed window start0..stop0 = 1_221_000..1_231_000
//   prepared  window start1..stop1 = 1_222_000..1_232_000
const NOW: i64 = 1_234_567;

fn setup() -> (Context, ManualClock, RecordingSource, Metric) {
    let clock = ManualClock::new(NOW);
    let cfg = ContextConfig::default()
        .with_step(1_000)
        .with_size(10)
        .with_server_delay(2_000)
        .with_client_delay(1_000);
    let ctx = Context::with_clock(cfg, Rc::new(clock.clone())).unwrap();
    let source = RecordingSource::new();
    let metric = ctx.metric(source.clone(), "requests");
    (ctx, clock, source, metric)
}

fn values(metric: &Metric, n: usize) -> Vec<f64> {
    (0..n).map(|i| metric.value_at(i)).collect()
}

#[test]
fn dormant_metric_does_not_fetch() {
    let (ctx, _clock, source, metric) = setup();
    ctx.tick_prepare();
    ctx.tick_change();
    assert_eq!(source.request_count(), 0);
    assert!(!metric.is_active());
}

#[test]
fn first_subscription_fetches_full_window_plus_lookahead() {
    let (ctx, _clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});

    assert_eq!(
        source.requests(),
        vec![Request {
            start: 1_232_000 - 16 * 1_000,
            stop: 1_232_000,
            step: 1_000,
        }]
    );
    assert_eq!(source.requests()[0].samples(), 16);
    assert!(metric.is_active());
    assert_eq!(ctx.listener_count(EventType::Prepare), 1);
    assert_eq!(ctx.listener_count(EventType::BeforeChange), 1);
}

#[test]
fn resolved_samples_align_with_the_displayed_window() {
    let (_ctx, _clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});
    source.resolve_with_timestamps();

    // Index 0 is start0 (1_221_000); the lookahead before it is dropped and
    // nothing beyond `size` is kept.
    let expected: Vec<f64> = (1221..1231).map(|s| s as f64).collect();
    assert_eq!(values(&metric, 10), expected);
    assert!(metric.value_at(10).is_nan());
}

#[test]
fn at_most_one_fetch_in_flight() {
    let (ctx, clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});
    assert_eq!(source.request_count(), 1);

    clock.advance(1_000);
    ctx.tick_prepare();
    ctx.tick_prepare();
    metric.prepare(1_230_000, 1_240_000);
    assert_eq!(source.request_count(), 1);

    source.resolve_with_timestamps();
    ctx.tick_prepare();
    assert_eq!(source.request_count(), 2);
}

#[test]
fn before_change_slides_buffer_to_new_window() {
    let (ctx, _clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});
    source.resolve_with_timestamps();

    ctx.tick_prepare();
    ctx.tick_change();
    assert_eq!(ctx.window().start, 1_222_000);
    assert_eq!(metric.value_at(0), 1222.0);
    assert_eq!(metric.value_at(8), 1230.0);
    // The newest sample was fetched ahead of the displayed window and lands
    // once the window advances.
    assert_eq!(metric.value_at(9), 1231.0);
}

#[test]
fn later_ticks_fetch_only_the_missing_steps() {
    let (ctx, clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});
    source.resolve_with_timestamps();
    ctx.tick_prepare();
    source.resolve_with_timestamps();
    ctx.tick_change();
    let expected: Vec<f64> = (1222..1232).map(|s| s as f64).collect();
    assert_eq!(values(&metric, 10), expected);

    clock.advance(1_000);
    ctx.tick_prepare();
    let request = source.requests()[2];
    // One new step plus the lookahead, ending at the new stop1.
    assert_eq!(request.stop, 1_233_000);
    assert_eq!(request.samples(), 1 + 6);

    source.resolve_with_timestamps();
    ctx.tick_change();
    let expected: Vec<f64> = (1223..1233).map(|s| s as f64).collect();
    assert_eq!(values(&metric, 10), expected);
}

#[test]
fn buffer_never_exceeds_size() {
    let (ctx, clock, source, metric) = setup();
    let Metric::Regular(regular) = metric.clone() else {
        panic!("context.metric returns a leaf metric");
    };
    metric.on(ListenerKey::change("chart"), |_| {});
    for _ in 0..5 {
        if source.pending_count() > 0 {
            source.resolve_with_timestamps();
        }
        assert!(regular.snapshot().len() <= ctx.size());
        clock.advance(1_000);
        ctx.tick_prepare();
        ctx.tick_change();
        assert!(regular.snapshot().len() <= ctx.size());
        assert_eq!(regular.snapshot().start(), Some(ctx.window().start));
    }
}

#[test]
fn unsubscribing_last_listener_stops_fetching() {
    let (ctx, clock, source, metric) = setup();
    let a = ListenerKey::change("a");
    let b = ListenerKey::change("b");
    metric.on(a.clone(), |_| {});
    metric.on(b.clone(), |_| {});
    assert_eq!(metric.listener_count(), 2);
    source.resolve_with_timestamps();

    metric.off(&a);
    assert!(metric.is_active());
    metric.off(&b);
    assert!(!metric.is_active());
    assert_eq!(ctx.listener_count(EventType::Prepare), 0);
    assert_eq!(ctx.listener_count(EventType::BeforeChange), 0);

    for _ in 0..3 {
        clock.advance(1_000);
        ctx.tick_prepare();
        ctx.tick_change();
    }
    assert_eq!(source.request_count(), 1);
    assert!(metric.off(&b).is_none());
}

#[test]
fn resubscribing_the_same_key_does_not_double_count() {
    let (_ctx, _clock, source, metric) = setup();
    let key = ListenerKey::change("chart");
    metric.on(key.clone(), |_| {});
    metric.on(key.clone(), |_| {});
    assert_eq!(metric.listener_count(), 1);
    assert_eq!(source.request_count(), 1);
    metric.off(&key);
    assert!(!metric.is_active());
}

#[test]
fn fetch_failure_keeps_buffer_and_retries_next_tick() {
    let (ctx, _clock, source, metric) = setup();
    let log = Log::default();
    let l = log.clone();
    metric.on(ListenerKey::change("chart"), move |_| l.push("change"));
    log.clear();

    source.resolve(Err(SourceError::backend("timeout")));
    assert!(log.entries().is_empty());
    assert!(metric.value_at(0).is_nan());

    ctx.tick_prepare();
    assert_eq!(source.request_count(), 2);

    source.resolve(Ok(Vec::new()));
    assert!(log.entries().is_empty());
    assert!(metric.value_at(0).is_nan());
}

#[test]
fn change_is_emitted_after_samples_arrive() {
    let (_ctx, _clock, source, metric) = setup();
    let log = Log::default();
    let l = log.clone();
    metric.on(ListenerKey::change("chart"), move |event| {
        let MetricEvent::Change { start, stop } = event;
        l.push(format!("{start:?}..{stop:?}"));
    });
    // Replayed on subscribe with the adopted window.
    assert_eq!(log.entries(), vec!["Some(1221000)..Some(1231000)"]);

    source.resolve_with_timestamps();
    assert_eq!(log.entries()[1], "Some(1221000)..Some(1232000)");
}

#[test]
fn late_change_listener_gets_current_window_immediately() {
    let (_ctx, _clock, source, metric) = setup();
    metric.on(ListenerKey::change("first"), |_| {});
    source.resolve_with_timestamps();

    let log = Log::default();
    let l = log.clone();
    metric.on(ListenerKey::change("second"), move |event| {
        let MetricEvent::Change { start, .. } = event;
        l.push(format!("{start:?}"));
    });
    assert_eq!(log.entries(), vec!["Some(1221000)"]);
    let listener = metric.listener(&ListenerKey::change("second")).unwrap();
    listener(&MetricEvent::Change { start: None, stop: None });
    assert_eq!(log.len(), 2);
}

#[test]
fn shifted_metric_translates_requests() {
    let (_ctx, _clock, source, metric) = setup();
    let yesterday = metric.shift(-86_400_000);
    assert_eq!(yesterday.name(), "requests");
    yesterday.on(ListenerKey::change("chart"), |_| {});
    let request = source.requests()[0];
    assert_eq!(request.stop, 1_232_000 - 86_400_000);
    assert_eq!(request.samples(), 16);
    assert!(!metric.is_active());
}

#[test]
fn extent_ignores_the_oldest_sample() {
    let (_ctx, _clock, source, metric) = setup();
    assert_eq!(metric.extent(), [f64::INFINITY, f64::NEG_INFINITY]);
    metric.on(ListenerKey::change("chart"), |_| {});
    source.resolve_with_timestamps();
    // Buffer is 1221..=1230; index 0 (1221) is outside the scan.
    assert_eq!(metric.extent(), [1222.0, 1230.0]);
}

#[test]
fn dropping_an_active_metric_detaches_it() {
    let (ctx, _clock, source, metric) = setup();
    metric.on(ListenerKey::change("chart"), |_| {});
    assert_eq!(ctx.listener_count(EventType::Prepare), 1);
    drop(metric);
    assert_eq!(ctx.listener_count(EventType::Prepare), 0);
    // A late answer for the dropped metric is ignored.
    source.resolve_with_timestamps();
}

#[test]
fn alias_and_display() {
    let (_ctx, _clock, _source, metric) = setup();
    let metric = metric.alias("req/s");
    assert_eq!(metric.to_string(), "req/s");
}
