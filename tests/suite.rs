use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use benchee::{benchmark, create_suite, Error, ExecutionError, Options, RunType, Suite, UNGROUPED};

fn quick() -> Options {
    Options::default()
        .with_delay(Duration::ZERO)
        .with_min_time(Duration::from_millis(10))
}

/// Records every callback invocation in order.
#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn options(&self, options: Options) -> Options {
        let (on_result, on_group_start, on_group_complete, on_complete) =
            (self.clone(), self.clone(), self.clone(), self.clone());
        options
            .on_result(move |result| on_result.push(format!("result:{}", result.name)))
            .on_group_start(move |group| on_group_start.push(format!("start:{group}")))
            .on_group_complete(move |group| {
                let names: Vec<_> = group.results.iter().map(|r| r.name.as_str()).collect();
                on_group_complete.push(format!("group:{}:{}", group.group, names.join(",")));
            })
            .on_complete(move |results| {
                let counts: Vec<_> = results
                    .iter()
                    .map(|(group, results)| format!("{group}={}", results.len()))
                    .collect();
                on_complete.push(format!("complete:{}", counts.join(",")));
            })
    }
}

#[tokio::test]
async fn single_ungrouped_benchmark_with_defaults() {
    let suite = create_suite(Some(Options::default().with_delay(Duration::ZERO)));
    suite.add("sum", || 1_u64 + 2);

    let results = suite.run().await.unwrap();

    assert_eq!(results.len(), 1);
    let group = &results[UNGROUPED];
    assert_eq!(group.len(), 1);

    let result = &group[0];
    assert_eq!(result.name, "sum");
    assert!(result.error.is_none());
    assert!(result.stats.iterations >= 10);
    assert!(result.stats.elapsed >= 500.0);
}

#[tokio::test]
async fn successful_stats_are_consistent() {
    let suite = Suite::new(quick());
    suite
        .add("fast", || 1_u64 + 2)
        .add_to_group("slow", "sleepy", || thread::sleep(Duration::from_micros(200)));

    let results = suite.run().await.unwrap();

    for (_, group) in results.iter() {
        for result in group {
            let stats = result.stats;
            assert!(result.is_ok());
            assert!(stats.elapsed >= 1.0);
            assert!(stats.elapsed >= 10.0);
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ops = (stats.iterations as f64 / (stats.elapsed / 1000.0)) as u64;
            assert_eq!(stats.ops, ops);
            #[allow(clippy::cast_precision_loss)]
            let tpe = stats.elapsed / stats.iterations as f64;
            assert!((stats.tpe - tpe).abs() < 1e-9);
            assert!(stats.end_time - stats.start_time >= 10.0);
        }
    }
}

#[tokio::test]
async fn grouped_and_ungrouped_callbacks() {
    let events = Events::default();
    let suite = Suite::new(events.options(quick().with_run_type(RunType::Fixed)));
    suite
        .add_to_group("one", "g", || ())
        .add("loner", || ())
        .add_to_group("two", "g", || ());

    let results = suite.run().await.unwrap();

    assert_eq!(results["g"].len(), 2);
    assert_eq!(results[UNGROUPED].len(), 1);

    let events = events.take();
    let starts: Vec<_> = events.iter().filter(|e| e.starts_with("start:")).collect();
    assert_eq!(starts, ["start:g"]);

    assert_eq!(events[0], "start:g");
    assert_eq!(events[1], "result:one");
    assert_eq!(events[2], "result:two");
    assert!(events[3].starts_with("group:g:"));
    assert_eq!(events[4], "result:loner");
    assert_eq!(events[5], "group:ungrouped:loner");
    assert_eq!(events[6], "complete:g=2,ungrouped=1");
    assert_eq!(events.len(), 7);
}

#[tokio::test]
async fn group_complete_snapshot_is_sorted_but_results_are_not() {
    let snapshot = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&snapshot);
    let options = quick().on_group_complete(move |group| {
        seen.lock().unwrap().extend(group.results.iter().map(|r| r.name.clone()));
    });

    let suite = Suite::new(options);
    suite
        .add_to_group("slow", "race", || thread::sleep(Duration::from_millis(1)))
        .add_to_group("fast", "race", || 1_u64 + 2);

    let results = suite.run().await.unwrap();

    let order: Vec<_> = results["race"].iter().map(|r| r.name.as_str()).collect();
    assert_eq!(order, ["slow", "fast"]);
    assert_eq!(*snapshot.lock().unwrap(), ["fast", "slow"]);
}

#[tokio::test]
async fn on_complete_fires_once_per_run() {
    let completions = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&completions);
    let suite = Suite::new(quick().on_complete(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    }));

    suite
        .add_to_group("a", "first", || ())
        .add_to_group("b", "second", || ())
        .add("c", || ());
    suite.run().await.unwrap();
    assert_eq!(completions.load(Ordering::Relaxed), 1);

    suite.run().await.unwrap();
    assert_eq!(completions.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn results_accumulate_across_runs() {
    let suite = Suite::new(quick().with_run_type(RunType::Fixed));
    suite.add("first", || ());
    suite.run().await.unwrap();

    suite.add("second", || ());
    let results = suite.run().await.unwrap();

    let names: Vec<_> = results[UNGROUPED].iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["first", "second"]);
}

#[tokio::test]
async fn panicking_benchmark_is_recorded_and_siblings_still_run() {
    let suite = Suite::new(quick());
    suite
        .add_to_group("before", "g", || ())
        .add_to_group("explodes", "g", || -> u64 { panic!("nope") })
        .add_to_group("after", "g", || ());

    let results = suite.run().await.unwrap();
    let group = &results["g"];

    assert_eq!(group.len(), 3);
    assert!(group[0].is_ok());
    assert!(group[2].is_ok());

    let failed = &group[1];
    assert_eq!(failed.name, "explodes");
    assert!(matches!(
        failed.error,
        Some(ExecutionError::Panicked { ref message }) if message == "nope"
    ));
    assert_eq!(failed.stats.ops, 0);
    assert!(failed.stats.tpe.abs() < f64::EPSILON);
    assert_eq!(failed.stats.iterations, 0);
}

#[tokio::test]
async fn failing_benchmark_counts_completed_iterations() {
    let mut calls = 0_u64;
    let suite = Suite::new(quick().with_min_iterations(100));
    suite
        .add_fallible("flaky", None, move || {
            calls += 1;
            if calls > 42 {
                Err("gave up")
            } else {
                Ok(calls)
            }
        });

    let results = suite.run().await.unwrap();
    let result = &results[UNGROUPED][0];

    assert_eq!(result.error.as_ref().map(ToString::to_string).as_deref(), Some("benchmark failed: gave up"));
    assert_eq!(result.stats.iterations, 42);
    assert_eq!(result.stats.ops, 0);
    assert!(result.stats.tpe.abs() < f64::EPSILON);
    assert!(result.stats.elapsed >= 0.0);
}

#[tokio::test]
async fn fixed_runs_a_single_round() {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    let suite = Suite::new(
        quick()
            .with_run_type(RunType::Fixed)
            .with_min_iterations(25)
            .with_min_time(Duration::from_secs(3600)),
    );
    suite
        .add("count", move || counter.fetch_add(1, Ordering::Relaxed));

    let results = suite.run().await.unwrap();

    assert_eq!(results[UNGROUPED][0].stats.iterations, 25);
    assert_eq!(calls.load(Ordering::Relaxed), 25);
}

#[tokio::test]
async fn adaptive_iterations_sum_every_round() {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    let suite = Suite::new(quick().with_min_time(Duration::from_millis(25)));
    suite
        .add("count", move || counter.fetch_add(1, Ordering::Relaxed));

    let results = suite.run().await.unwrap();
    let stats = results[UNGROUPED][0].stats;

    assert!(stats.elapsed >= 25.0);
    assert!(stats.iterations > 10, "expected more than one round");
    assert_eq!(stats.iterations, calls.load(Ordering::Relaxed));
}

#[tokio::test]
async fn delay_is_awaited_before_each_benchmark() {
    let suite = Suite::new(
        quick()
            .with_run_type(RunType::Fixed)
            .with_delay(Duration::from_millis(20)),
    );
    suite.add("a", || ()).add("b", || ());

    let start = std::time::Instant::now();
    suite.run().await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn concurrent_run_is_refused_without_side_effects() {
    let suite = Suite::new(quick().with_delay(Duration::from_millis(50)));
    suite.add("noop", || ());

    let handle = {
        let suite = suite.clone();
        tokio::spawn(async move { suite.run().await })
    };
    while !suite.is_running() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(suite.run().await, Err(Error::AlreadyRunning)));
    assert_eq!(suite.results()[UNGROUPED].len(), 0);

    let results = handle.await.unwrap().unwrap();
    assert_eq!(results[UNGROUPED].len(), 1);
    assert!(!suite.is_running());
}

#[tokio::test]
async fn callbacks_may_queue_more_work() {
    let handle: Arc<Mutex<Option<Suite>>> = Arc::default();
    let inner = Arc::clone(&handle);
    let suite = Suite::new(quick().with_run_type(RunType::Fixed).on_complete(move |_| {
        if let Some(suite) = inner.lock().unwrap().take() {
            suite.add("later", || ());
            assert!(suite.is_running());
        }
    }));
    *handle.lock().unwrap() = Some(suite.clone());

    suite.add("now", || ());
    let results = suite.run().await.unwrap();
    assert_eq!(results[UNGROUPED].len(), 1);
    assert_eq!(suite.pending(), 1);

    let results = suite.run().await.unwrap();
    assert_eq!(results[UNGROUPED].len(), 2);
}

#[tokio::test]
async fn empty_suite_completes_immediately() {
    let completions = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&completions);
    let suite = create_suite(Some(quick().on_complete(move |results| {
        assert!(results.is_empty());
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let results = suite.run().await.unwrap();

    assert!(results.is_empty());
    assert_eq!(completions.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn standalone_benchmark() {
    let result = benchmark("sum", || 1_u64 + 2, Some(quick())).await.unwrap();

    assert_eq!(result.name, "sum");
    assert!(result.is_ok());
    assert!(result.stats.elapsed >= 10.0);
    assert!(result.stats.ops > 0);
}

#[tokio::test]
async fn standalone_benchmark_accepts_empty_name() {
    let result = benchmark("", || 1_u64 + 2, Some(quick())).await.unwrap();

    assert_eq!(result.name, "");
    assert!(result.is_ok());
}

#[tokio::test]
async fn empty_group_runs_without_group_start() {
    let events = Events::default();
    let suite = Suite::new(events.options(quick().with_run_type(RunType::Fixed)));
    suite.add_to_group("x", "", || ());

    let results = suite.run().await.unwrap();

    assert_eq!(results[""].len(), 1);
    assert_eq!(results[""][0].name, "x");
    assert_eq!(events.take(), ["result:x", "group::x", "complete:=1"]);
}

#[tokio::test]
async fn pending_counts_down_during_a_run() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle: Arc<Mutex<Option<Suite>>> = Arc::default();
    let (observed, inner) = (Arc::clone(&seen), Arc::clone(&handle));
    let suite = Suite::new(quick().with_run_type(RunType::Fixed).on_result(move |_| {
        if let Some(suite) = inner.lock().unwrap().as_ref() {
            observed.lock().unwrap().push(suite.pending());
        }
    }));
    *handle.lock().unwrap() = Some(suite.clone());

    suite.add("a", || ()).add_to_group("b", "g", || ()).add("c", || ());
    assert_eq!(suite.pending(), 3);

    suite.run().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), [2, 1, 0]);
    handle.lock().unwrap().take();
}

#[tokio::test]
async fn cancelled_run_keeps_unrun_benchmarks_queued() {
    let suite = Suite::new(
        quick()
            .with_run_type(RunType::Fixed)
            .with_delay(Duration::from_millis(50)),
    );
    suite.add("a", || ()).add("b", || ());

    let cancelled = tokio::time::timeout(Duration::from_millis(10), suite.run()).await;

    assert!(cancelled.is_err());
    assert!(!suite.is_running());
    assert_eq!(suite.pending(), 2);
    assert!(suite.results()[UNGROUPED].is_empty());

    let results = suite.run().await.unwrap();
    let names: Vec<_> = results[UNGROUPED].iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(suite.pending(), 0);
}

#[tokio::test]
async fn panicking_callback_leaves_unrun_benchmarks_queued() {
    let suite = Suite::new(quick().with_run_type(RunType::Fixed).on_result(|result| {
        assert_ne!(result.name, "first", "callback failed");
    }));
    suite.add("first", || ()).add("second", || ());

    let run = {
        let suite = suite.clone();
        tokio::spawn(async move { suite.run().await })
    };

    assert!(run.await.unwrap_err().is_panic());
    assert!(!suite.is_running());
    assert_eq!(suite.pending(), 1);
    assert_eq!(suite.results()[UNGROUPED].len(), 1);
}

#[tokio::test]
async fn results_serialize_for_reporting() {
    let suite = Suite::new(quick().with_run_type(RunType::Fixed));
    suite
        .add_to_group("ok", "g", || ())
        .add_to_group("bad", "g", || -> u8 { panic!("broken") });

    let results = suite.run().await.unwrap();
    let value = serde_json::to_value(&results).unwrap();

    assert_eq!(value["g"][0]["name"], "ok");
    assert!(value["g"][0]["error"].is_null());
    assert!(value["g"][0]["stats"]["ops"].is_u64());
    assert_eq!(value["g"][1]["error"], "benchmark panicked: broken");
    assert_eq!(value["g"][1]["stats"]["ops"], 0);
}
