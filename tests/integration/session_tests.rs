use super::*;
use fuel_watcher::models::{PriceReading, ScrapeOutcome};
use fuel_watcher::session::PriceSource;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_happy_path_reads_both_prices() {
    let (session, log) = scripted_session(PageScript::with_prices("$ 1,150", "109"));

    let outcome = session.run().await;

    assert_eq!(
        outcome,
        ScrapeOutcome::Success(PriceReading::Valid {
            fuel_price: 1150,
            co2_price: 109,
        })
    );
    assert_eq!(log.opens(), 1);
    assert_eq!(log.closes(), 1);
    assert_eq!(log.navigations(), 1);
    assert_eq!(log.submissions(), 1);
    assert_eq!(log.typed(), vec!["pilot@example.com".to_string(), "hunter2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_login_budget_exhausted_closes_once() {
    let script = PageScript {
        login_succeeds_on: None,
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert_eq!(outcome, ScrapeOutcome::LoginFailed);
    assert_eq!(log.submissions(), 3);
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_succeeds_on_second_attempt() {
    let script = PageScript {
        login_succeeds_on: Some(2),
        ..PageScript::with_prices("480", "95")
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert!(outcome.reading().is_some_and(|r| r.is_valid()));
    assert_eq!(log.submissions(), 2);
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_entry_button_counts_as_failed_attempts() {
    let script = PageScript {
        missing: HashSet::from([SiteConfig::default().entry_button]),
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert_eq!(outcome, ScrapeOutcome::LoginFailed);
    assert_eq!(log.submissions(), 0);
    assert!(log.typed().is_empty());
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_page_load_failing_three_times_skips_login() {
    let script = PageScript {
        navigate_failures: 3,
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);
    let started = Instant::now();

    let outcome = session.run().await;

    assert!(matches!(outcome, ScrapeOutcome::ExtractionFailed(ref cause) if cause.contains("page load failed")));
    assert_eq!(log.navigations(), 3);
    assert_eq!(log.submissions(), 0);
    assert_eq!(log.closes(), 1);
    // Two back-offs between three attempts.
    assert_eq!(started.elapsed().as_secs(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_page_load_recovers_on_third_attempt() {
    let script = PageScript {
        navigate_failures: 2,
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);
    let started = Instant::now();

    let outcome = session.run().await;

    assert_eq!(outcome.kind(), "success");
    assert_eq!(log.navigations(), 3);
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_existing_session_skips_login() {
    let script = PageScript {
        already_logged_in: true,
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert_eq!(outcome.kind(), "success");
    assert_eq!(log.submissions(), 0);
    assert!(log.typed().is_empty());
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_price_element_is_extraction_failure() {
    let script = PageScript {
        missing: HashSet::from([SiteConfig::default().co2_price]),
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert!(matches!(outcome, ScrapeOutcome::ExtractionFailed(ref cause) if cause.contains("Timed out")));
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_preloader_is_extraction_failure() {
    let script = PageScript {
        missing: HashSet::from([SiteConfig::default().preloader]),
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    assert_eq!(session.run().await.kind(), "extraction_failed");
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_text_is_kept_raw() {
    let (session, _log) = scripted_session(PageScript::with_prices("N/A", "110"));

    let outcome = session.run().await;

    assert_eq!(
        outcome,
        ScrapeOutcome::Success(PriceReading::Unparsed {
            raw_fuel: "N/A".to_string(),
            raw_co2: "110".to_string(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_has_nothing_to_close() {
    let script = PageScript {
        fail_open: true,
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert!(matches!(outcome, ScrapeOutcome::ExtractionFailed(ref cause) if cause.contains("chrome binary not found")));
    assert_eq!(log.opens(), 1);
    assert_eq!(log.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panic_during_session_still_closes() {
    let script = PageScript {
        panic_on: Some(SiteConfig::default().fuel_price),
        ..PageScript::default()
    };
    let (session, log) = scripted_session(script);

    let outcome = session.run().await;

    assert!(matches!(outcome, ScrapeOutcome::ExtractionFailed(ref cause) if cause.contains("scripted panic")));
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_fetch_uses_a_fresh_session() {
    let (session, log) = scripted_session(PageScript::default());

    session.fetch().await;
    session.fetch().await;

    assert_eq!(log.opens(), 2);
    assert_eq!(log.closes(), 2);
}
