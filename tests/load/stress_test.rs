#![cfg(test)]
//! Sweeps against wiremock stand-ins for the three service topologies:
//! a knowledge provider, a synchronous ARA and the asynchronous ARS.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use translator_stress::sink::load;
use translator_stress::{CallStatus, Endpoint, Mode, ProtocolKind, SweepSettings, Topology};

use super::support::{assert_consistent, driver, merged, pool, trapi, BatchContains};

async fn mount_ars(server: &MockServer, results: usize) {
    Mock::given(method("POST"))
        .and(path("/ars/api/submit"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"pk": "abc"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ars/api/messages/abc"))
        .and(query_param("trace", "y"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "Done", "merged_version": "xyz"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ars/api/messages/xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(merged(results)))
        .mount(server)
        .await;
}

/// 100 simultaneous provider calls, 10 of which never answer in time
#[tokio::test]
async fn concurrent_phase_survives_faulted_calls() {
    let server = MockServer::start().await;
    let ids = pool(100);
    let slow: HashSet<String> = ids.iter().step_by(10).cloned().collect();
    Mock::given(method("POST"))
        .and(BatchContains(slow.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(trapi(2))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trapi(2)))
        .mount(&server)
        .await;

    let (driver, _) = driver(Duration::from_millis(500), SweepSettings::default(), ids.clone()).await;
    let endpoint = Arc::new(Endpoint::new("infores:kp", server.uri(), ProtocolKind::Direct));
    let calls = translator_stress::driver::batches(&ids, 1);
    let stats = driver.run_concurrent(&endpoint, calls).await.unwrap();

    assert_eq!(stats.results.len(), 100);
    assert_consistent(&stats);
    let faulted: Vec<_> = stats
        .results
        .iter()
        .filter(|r| r.result_count == 0)
        .collect();
    assert_eq!(faulted.len(), 10);
    assert!(faulted.iter().all(|r| r.status.is_timeout()));
    assert!(faulted.iter().all(|r| slow.contains(&r.identifiers[0])));
    assert_eq!(stats.count_of(&CallStatus::Http(200)), 90);
    assert_eq!(stats.total_results, 180);
    // call order is issue order, not completion order
    let order: Vec<&String> = stats.results.iter().map(|r| &r.identifiers[0]).collect();
    assert_eq!(order, ids.iter().collect::<Vec<_>>());
}

/// 20 jobs in flight at once, each needing more than one poll
#[tokio::test]
async fn concurrent_jobs_poll_on_independent_budgets() {
    let ars = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"pk": "abc"})))
        .mount(&ars)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages/abc"))
        .and(query_param("trace", "y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Running"})))
        .up_to_n_times(40)
        .mount(&ars)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages/abc"))
        .and(query_param("trace", "y"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "Done", "merged_version": "xyz"})),
        )
        .mount(&ars)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages/xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(merged(2)))
        .mount(&ars)
        .await;

    let (driver, clock) = driver(Duration::from_secs(5), SweepSettings::default(), Vec::new()).await;
    let endpoint = Arc::new(Endpoint::new("infores:ars", ars.uri(), ProtocolKind::AsyncJob));
    let stats = driver.run_concurrent(&endpoint, vec![Vec::new(); 20]).await.unwrap();

    // 60 polls at 10s each: summed they would blow the 120s budget many times over
    assert_eq!(clock.sleeps().len(), 60);
    assert_eq!(stats.count_of(&CallStatus::label("Done")), 20);
    assert_eq!(stats.total_results, 40);
    assert_consistent(&stats);
    assert!(stats.results.iter().all(|r| r.elapsed_seconds >= 10.0 && r.elapsed_seconds <= 120.0));
    assert!(stats.total_elapsed_seconds <= 120.0);
}

#[tokio::test]
async fn full_sweep_across_all_topologies_is_persisted() {
    let kp = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trapi(3)))
        .mount(&kp)
        .await;
    let ara = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trapi(4)))
        .mount(&ara)
        .await;
    let ars = MockServer::start().await;
    mount_ars(&ars, 5).await;

    let endpoints = vec![
        Endpoint::new("infores:kp", format!("{}/query", kp.uri()), ProtocolKind::Direct),
        Endpoint::new("infores:ara", format!("{}/query", ara.uri()), ProtocolKind::SyncAggregate),
        Endpoint::new("infores:ars", format!("{}/ars/api/", ars.uri()), ProtocolKind::AsyncJob),
    ];
    let sweep = SweepSettings {
        sequential_calls: 3,
        concurrency_levels: vec![0, 2, 5],
        batch_sizes: vec![1, 4, 10],
        topology: Topology::Serialized,
    };
    let (driver, clock) = driver(Duration::from_secs(5), sweep, pool(7)).await;
    driver.run(&endpoints).await.unwrap();

    let registry = load(driver.sink().path()).await.unwrap();
    assert_eq!(registry, driver.sink().snapshot().await);

    for (size, calls) in [(1, 7), (4, 2), (10, 1)] {
        for mode in [Mode::Sequential, Mode::Concurrent] {
            let stats = registry.get(mode, "infores:kp", size).unwrap();
            assert_eq!(stats.calls(), calls, "{mode} batch {size}");
            assert_eq!(stats.total_results, calls * 3);
            assert_consistent(stats);
        }
    }

    let ara_seq = registry.get(Mode::Sequential, "infores:ara", 3).unwrap();
    assert_eq!(ara_seq.count_of(&CallStatus::Http(200)), 3);
    assert_eq!(ara_seq.total_results, 12);

    for level in [0, 2, 5] {
        let stats = registry.get(Mode::Concurrent, "infores:ars", level).unwrap();
        assert_eq!(stats.calls(), level);
        assert_eq!(stats.count_of(&CallStatus::label("Done")), level);
        assert_eq!(stats.total_results, level * 5);
        assert_consistent(stats);
    }
    let empty = registry.get(Mode::Concurrent, "infores:ara", 0).unwrap();
    assert!(empty.results.is_empty());

    // one cooldown after every concurrent phase of every endpoint
    let cooldowns: Vec<Duration> = clock
        .sleeps()
        .into_iter()
        .filter(|d| *d != Duration::from_secs(10))
        .collect();
    assert_eq!(
        cooldowns,
        [vec![Duration::from_secs(1); 3], vec![Duration::from_secs(30); 3], vec![Duration::from_secs(300); 3]].concat()
    );
}

#[tokio::test]
async fn template_provider_sweeps_without_identifier_pool() {
    let kp = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trapi(2)))
        .mount(&kp)
        .await;

    let template = json!({"message": {"query_graph": {"nodes": {
        "disease": {"ids": ["MONDO:1", "MONDO:2", "MONDO:3"]},
        "gene": {"categories": ["biolink:Gene"]},
    }}}});
    let endpoint = Endpoint::new("infores:kp", kp.uri(), ProtocolKind::Direct).with_overrides(
        translator_stress::domain::QueryOverrides {
            predicates: None,
            query: Some(template),
        },
    );
    let sweep = SweepSettings {
        sequential_calls: 3,
        batch_sizes: vec![1, 2],
        ..SweepSettings::default()
    };
    let (driver, _) = driver(Duration::from_secs(5), sweep, Vec::new()).await;
    driver.run(&[endpoint]).await.unwrap();

    let registry = load(driver.sink().path()).await.unwrap();
    for mode in [Mode::Sequential, Mode::Concurrent] {
        let single = registry.get(mode, "infores:kp", 1).unwrap();
        assert_eq!(single.calls(), 3);
        assert!(single.results.iter().all(|r| r.identifiers == ["MONDO:1"] && r.batch_size == 1));
        let pair = registry.get(mode, "infores:kp", 2).unwrap();
        assert_eq!(pair.total_results, 6);
        assert!(pair.results.iter().all(|r| r.identifiers == ["MONDO:1", "MONDO:2"]));
    }

    // what went over the wire matches what was recorded
    let requests = kp.received_requests().await.unwrap();
    assert_eq!(requests.len(), 12);
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["message"]["query_graph"]["nodes"]["disease"]["ids"], json!(["MONDO:1"]));
    assert_eq!(sent["bypass_cache"], true);
}

#[tokio::test]
async fn provider_application_error_halts_with_diagnostic() {
    let kp = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"errors": ["unsupported predicate"]}})),
        )
        .mount(&kp)
        .await;

    let sweep = SweepSettings {
        batch_sizes: vec![2],
        ..SweepSettings::default()
    };
    let (driver, _) = driver(Duration::from_secs(5), sweep, pool(4)).await;
    let endpoint = Endpoint::new("infores:kp", kp.uri(), ProtocolKind::Direct);
    let err = driver.run(&[endpoint]).await.unwrap_err();
    assert!(err.is_fatal_application());

    // the sweep stopped at the first call
    assert_eq!(kp.received_requests().await.unwrap().len(), 1);
    let registry = load(driver.sink().path()).await.unwrap();
    assert_eq!(registry.phase_count(), 0);
    let diagnostic = driver
        .sink()
        .path()
        .with_file_name("stress_tests_fatal_infores_kp.json");
    let body = tokio::fs::read_to_string(diagnostic).await.unwrap();
    assert!(body.contains("unsupported predicate"));
}

#[tokio::test]
async fn parallel_topology_runs_endpoints_together() {
    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trapi(1)))
        .mount(&fast)
        .await;
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing)
        .await;

    let sweep = SweepSettings {
        sequential_calls: 2,
        concurrency_levels: vec![3],
        batch_sizes: vec![1],
        topology: Topology::Parallel,
    };
    let (driver, _) = driver(Duration::from_secs(5), sweep, Vec::new()).await;
    let endpoints = vec![
        Endpoint::new("infores:fast", fast.uri(), ProtocolKind::SyncAggregate),
        Endpoint::new("infores:failing", failing.uri(), ProtocolKind::SyncAggregate),
    ];
    driver.run(&endpoints).await.unwrap();

    let registry = load(driver.sink().path()).await.unwrap();
    assert_eq!(registry.phase_count(), 4);
    let failed = registry.get(Mode::Concurrent, "infores:failing", 3).unwrap();
    assert_eq!(failed.count_of(&CallStatus::Http(503)), 3);
    assert_eq!(failed.total_results, 0);
    let ok = registry.get(Mode::Sequential, "infores:fast", 2).unwrap();
    assert_eq!(ok.total_results, 2);
}

#[tokio::test]
#[ignore] // Ignore by default as this is a slow test
async fn thousand_simultaneous_calls_are_all_recorded() {
    let ara = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(trapi(1))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&ara)
        .await;

    let sweep = SweepSettings {
        sequential_calls: 0,
        concurrency_levels: vec![1000],
        ..SweepSettings::default()
    };
    let (driver, _) = driver(Duration::from_secs(60), sweep, Vec::new()).await;
    let endpoint = Endpoint::new("infores:ara", ara.uri(), ProtocolKind::SyncAggregate);
    driver.run(&[endpoint]).await.unwrap();

    let registry = driver.sink().snapshot().await;
    let stats = registry.get(Mode::Concurrent, "infores:ara", 1000).unwrap();
    assert_eq!(stats.calls(), 1000);
    assert_consistent(stats);
    println!(
        "1000 concurrent calls: {} ok, {:.1} calls/s",
        stats.count_of(&CallStatus::Http(200)),
        stats.throughput()
    );
}
