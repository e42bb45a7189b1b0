use chrono::{DateTime, Duration, Utc};
use mockall::{mock, Sequence};
use mockall::predicate::always;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sfdc_config::{CacheSettings, InstanceConfig};
use sfdc_core::{
    ExecutionError, LogFileRecord, QueryError, QueryExecutor, Row, RunError, Runner,
};
use sfdc_query::{FixedClock, QueryKey, QueryTemplate, ResolvedQuery, Watermark};
use sfdc_state::{MemoryDedupCache, MemoryWatermarkStore, WatermarkStore};
use sfdc_test_utils::{hourly_defaults, rfc3339, utc, SteppingClock};

mock! {
    Executor {}

    impl QueryExecutor for Executor {
        fn execute(&self, query: &ResolvedQuery) -> Result<Vec<Row>, ExecutionError>;
        fn fetch_log_file(
            &self,
            query: &ResolvedQuery,
            file: &LogFileRecord,
        ) -> Result<Vec<Row>, ExecutionError>;
    }
}

fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => panic!("expected object, got {other}"),
            })
            .collect(),
        other => panic!("expected array, got {other}"),
    }
}

fn instance(queries: Vec<QueryTemplate>, cache_enabled: bool) -> InstanceConfig {
    InstanceConfig {
        defaults: hourly_defaults(60),
        queries,
        cache: CacheSettings {
            enabled: cache_enabled,
            expire_days: 2,
        },
    }
}

fn login_rows() -> Vec<Row> {
    rows(json!([
        {
            "attributes": {"type": "LoginHistory"},
            "Id": "0Ya1",
            "LoginTime": "2024-01-01T10:00:00.000+0000"
        },
        {
            "attributes": {"type": "LoginHistory"},
            "Id": "0Ya2",
            "LoginTime": "2024-01-01T11:00:00.000+0000"
        }
    ]))
}

fn logins() -> QueryTemplate {
    QueryTemplate::new(
        "SELECT Id,LoginTime FROM LoginHistory WHERE LoginTime>={from_timestamp} AND LoginTime<{to_timestamp}",
    )
    .with_name("logins")
    .with_timestamp_attr("LoginTime")
}

fn now() -> DateTime<Utc> {
    utc(2024, 1, 2, 3, 0, 0)
}

#[test]
fn successful_query_commits_window_upper_bound() {
    let config = instance(vec![logins()], false);
    let store = MemoryWatermarkStore::new();
    let clock = FixedClock::new(now());

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|q| {
            q.query()
                == "SELECT Id,LoginTime FROM LoginHistory WHERE LoginTime>=2024-01-01T03:00:00.000Z \
                    AND LoginTime<2024-01-02T02:00:00.000Z"
        })
        .times(1)
        .returning(|_| Ok(login_rows()));

    let report = Runner::new(&config, &store, &clock).run(&executor).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.total_rows(), 2);
    assert_eq!(report.successes[0].batches.len(), 1);
    assert_eq!(
        report.successes[0].batches[0].log_entries[0].message,
        "LoginHistory 2024-01-01T10:00:00.000+0000"
    );
    assert_eq!(
        store.load(&QueryKey::from("test_org/logins")).unwrap(),
        Some(Watermark::new(rfc3339("2024-01-02T02:00:00Z")))
    );
}

#[test]
fn failures_are_isolated_per_query() {
    let config = instance(
        vec![
            logins(),
            QueryTemplate::new("SELECT Id FROM Broken WHERE CreatedDate>={start_date}")
                .with_name("broken"),
            QueryTemplate::new("SELECT Id FROM Offline WHERE CreatedDate>={from_timestamp}")
                .with_name("offline"),
        ],
        false,
    );
    let store = MemoryWatermarkStore::new();
    let clock = FixedClock::new(now());

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|q| q.query().contains("Offline"))
        .returning(|_| Err(ExecutionError::request(503, "unavailable")));
    executor
        .expect_execute()
        .withf(|q| q.query().contains("LoginHistory"))
        .returning(|_| Ok(login_rows()));

    let report = Runner::new(&config, &store, &clock).run(&executor).unwrap();

    let ok: Vec<&str> = report.successes.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(ok, vec!["test_org/logins"]);

    let failed: Vec<&str> = report.failures.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(failed, vec!["test_org/broken", "test_org/offline"]);
    assert!(matches!(report.failures[0].error, QueryError::Template(_)));
    assert!(matches!(report.failures[1].error, QueryError::Execution(_)));

    assert_eq!(store.load(&QueryKey::from("test_org/offline")).unwrap(), None);
    assert_eq!(store.load(&QueryKey::from("test_org/broken")).unwrap(), None);
    assert!(store.load(&QueryKey::from("test_org/logins")).unwrap().is_some());
}

#[test]
fn consecutive_runs_chain_windows() {
    let config = instance(vec![logins()], false);
    let store = MemoryWatermarkStore::new();
    let clock = SteppingClock::new(now(), Duration::hours(1));

    let mut executor = MockExecutor::new();
    executor.expect_execute().times(2).returning(|_| Ok(Vec::new()));

    let runner = Runner::new(&config, &store, &clock);
    let first = runner.run(&executor).unwrap();
    let second = runner.run(&executor).unwrap();

    let first_window = first.successes[0].window;
    let second_window = second.successes[0].window;
    assert_eq!(second_window.from(), first_window.to());
    assert_eq!(second_window.to(), rfc3339("2024-01-02T03:00:00Z"));
}

#[test]
fn dedup_cache_drops_repeated_records() {
    let config = instance(vec![logins()], true);
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(config.cache.expire_days);
    let clock = SteppingClock::new(now(), Duration::hours(1));

    let mut executor = MockExecutor::new();
    executor.expect_execute().returning(|_| Ok(login_rows()));

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    assert_eq!(runner.run(&executor).unwrap().total_rows(), 2);
    assert_eq!(runner.run(&executor).unwrap().total_rows(), 0);
}

#[test]
fn disabled_cache_is_ignored() {
    let config = instance(vec![logins()], false);
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(2);
    let clock = SteppingClock::new(now(), Duration::hours(1));

    let mut executor = MockExecutor::new();
    executor.expect_execute().returning(|_| Ok(login_rows()));

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    assert_eq!(runner.run(&executor).unwrap().total_rows(), 2);
    assert_eq!(runner.run(&executor).unwrap().total_rows(), 2);
}

#[test]
fn hourly_log_files_download_once() {
    let config = instance(Vec::new(), true);
    let config = InstanceConfig {
        queries: vec![QueryTemplate::event_log_file("CreatedDate")],
        ..config
    };
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(2);
    let clock = SteppingClock::new(now(), Duration::hours(1));

    let mut executor = MockExecutor::new();
    executor.expect_execute().times(2).returning(|_| {
        Ok(rows(json!([{
            "attributes": {"type": "EventLogFile"},
            "Id": "0AT1",
            "EventType": "Login",
            "Interval": "Hourly",
            "LogFile": "/services/data/v52.0/sobjects/EventLogFile/0AT1/LogFile"
        }])))
    });
    executor
        .expect_fetch_log_file()
        .with(always(), always())
        .times(1)
        .returning(|_, file| {
            assert_eq!(file.id, "0AT1");
            Ok(rows(json!([
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100000.000", "REQUEST_ID": "r1"},
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100500.000", "REQUEST_ID": "r2"}
            ])))
        });

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    let first = runner.run(&executor).unwrap();
    assert_eq!(first.total_rows(), 2);
    assert_eq!(
        first.successes[0].batches[0].log_entries[1].message,
        "LogFile 0AT1 row 1"
    );

    let second = runner.run(&executor).unwrap();
    assert!(second.is_clean());
    assert_eq!(second.total_rows(), 0);
}

fn log_file_query(id: &'static str, interval: &'static str) -> Vec<Row> {
    rows(json!([{
        "attributes": {"type": "EventLogFile"},
        "Id": id,
        "EventType": "Login",
        "Interval": interval,
        "LogFile": format!("/services/data/v52.0/sobjects/EventLogFile/{id}/LogFile")
    }]))
}

fn log_file_instance() -> InstanceConfig {
    InstanceConfig {
        queries: vec![QueryTemplate::event_log_file("CreatedDate")],
        ..instance(Vec::new(), true)
    }
}

#[test]
fn failed_query_leaves_cache_for_retry() {
    let config = instance(vec![logins()], true);
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(2);
    let clock = FixedClock::new(now());

    let mut seq = Sequence::new();
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Ok(rows(json!([
                {"Id": "0Ya1", "LoginTime": "2024-01-01T10:00:00.000+0000"},
                {"Id": "0Ya2", "LoginTime": "garbage"}
            ])))
        });
    executor
        .expect_execute()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(login_rows()));

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    let first = runner.run(&executor).unwrap();
    assert_eq!(first.failures.len(), 1);
    assert!(matches!(first.failures[0].error, QueryError::Record(_)));
    assert_eq!(store.load(&QueryKey::from("test_org/logins")).unwrap(), None);

    let retry = runner.run(&executor).unwrap();
    assert!(retry.is_clean());
    assert_eq!(retry.total_rows(), 2);
    assert_eq!(retry.successes[0].window.from(), rfc3339("2024-01-01T03:00:00Z"));
}

#[test]
fn daily_log_files_forward_only_new_rows() {
    let config = log_file_instance();
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(2);
    let clock = SteppingClock::new(now(), Duration::hours(1));

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(2)
        .returning(|_| Ok(log_file_query("0AT9", "Daily")));

    let mut seq = Sequence::new();
    executor
        .expect_fetch_log_file()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Ok(rows(json!([
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100000.000", "REQUEST_ID": "r1"},
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100500.000", "USER_ID": "u1"}
            ])))
        });
    executor
        .expect_fetch_log_file()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Ok(rows(json!([
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100000.000", "REQUEST_ID": "r1"},
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100500.000", "USER_ID": "u1"},
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101230000.000", "REQUEST_ID": "r2"},
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101231500.000", "USER_ID": "u2"}
            ])))
        });

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    assert_eq!(runner.run(&executor).unwrap().total_rows(), 2);

    let second = runner.run(&executor).unwrap();
    assert!(second.is_clean());
    let entries = &second.successes[0].batches[0].log_entries;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].attributes.get("REQUEST_ID"), Some(&json!("r2")));
    assert_eq!(entries[1].attributes.get("USER_ID"), Some(&json!("u2")));
    assert_eq!(entries[1].attributes.get("LogFileId"), Some(&json!("0AT9")));
}

#[test]
fn failed_download_keeps_earlier_files_unrecorded() {
    let config = log_file_instance();
    let store = MemoryWatermarkStore::new();
    let cache = MemoryDedupCache::for_days(2);
    let clock = FixedClock::new(now());

    let mut executor = MockExecutor::new();
    executor.expect_execute().times(2).returning(|_| {
        let mut files = log_file_query("0AT1", "Hourly");
        files.extend(log_file_query("0AT2", "Hourly"));
        Ok(files)
    });
    executor
        .expect_fetch_log_file()
        .withf(|_, file| file.id == "0AT1")
        .times(2)
        .returning(|_, _| {
            Ok(rows(json!([
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101100000.000", "REQUEST_ID": "r1"}
            ])))
        });
    let mut seq = Sequence::new();
    executor
        .expect_fetch_log_file()
        .withf(|_, file| file.id == "0AT2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(ExecutionError::request(500, "download interrupted")));
    executor
        .expect_fetch_log_file()
        .withf(|_, file| file.id == "0AT2")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Ok(rows(json!([
                {"EVENT_TYPE": "Login", "TIMESTAMP": "20240101110000.000", "REQUEST_ID": "r2"}
            ])))
        });

    let runner = Runner::new(&config, &store, &clock).with_cache(&cache);
    let first = runner.run(&executor).unwrap();
    assert!(matches!(first.failures[0].error, QueryError::Execution(_)));

    let retry = runner.run(&executor).unwrap();
    assert!(retry.is_clean());
    assert_eq!(retry.total_rows(), 2);
}

#[test]
fn clock_overflow_aborts_before_execution() {
    let config = instance(vec![logins()], false);
    let store = MemoryWatermarkStore::new();
    let clock = FixedClock::new(DateTime::<Utc>::MIN_UTC);

    let mut executor = MockExecutor::new();
    executor.expect_execute().never();

    let result = Runner::new(&config, &store, &clock).run(&executor);
    assert!(matches!(result, Err(RunError::Clock(_))));
}

#[test]
fn watermark_ahead_of_upper_bound_skips_execution() {
    let config = instance(vec![logins()], false);
    let key = QueryKey::from("test_org/logins");
    let ahead = Watermark::new(rfc3339("2024-01-02T05:00:00Z"));
    let store: MemoryWatermarkStore = [(key.clone(), ahead)].into_iter().collect();
    let clock = FixedClock::new(now());

    let mut executor = MockExecutor::new();
    executor.expect_execute().never();

    let report = Runner::new(&config, &store, &clock).run(&executor).unwrap();
    assert!(report.is_clean());
    assert!(report.successes[0].window.is_empty());
    assert_eq!(store.load(&key).unwrap(), Some(ahead));
}
