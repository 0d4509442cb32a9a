use super::*;
use fuel_watcher::models::Decision;
use fuel_watcher::notifier::{Dispatch, Notifier};
use fuel_watcher::pipeline::PricePipeline;
use fuel_watcher::policy::ADMIN_ALERT_SUBJECT;

fn pipeline(script: PageScript, transport: Arc<RecordingTransport>) -> (PricePipeline, Arc<PageLog>) {
    let (session, log) = scripted_session(script);
    let pipeline = PricePipeline::new(
        Arc::new(session),
        test_thresholds(),
        Notifier::new(transport),
        Arc::new(TokioClock::starting_at(at(9, 31, 0))),
    );
    (pipeline, log)
}

#[tokio::test(start_paused = true)]
async fn test_cheap_fuel_and_co2_notify_recipients() {
    let transport = Arc::new(RecordingTransport::default());
    let (pipeline, _log) = pipeline(PageScript::with_prices("$540", "118"), transport.clone());

    let report = pipeline.run_tick().await;

    assert_eq!(report.dispatch, Dispatch::Sent { recipients: 2 });
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Fuel: 540; Co2: 118");
    assert!(sent[0].recipients.contains("crew@example.com"));
    assert!(sent[0].body.contains("Fuel price = 540"));
    assert!(sent[0].body.contains("Co2 price = 118"));
    assert!(sent[0].body.contains("2024-03-14 09:31:00"));
}

#[tokio::test(start_paused = true)]
async fn test_only_co2_below_threshold() {
    let transport = Arc::new(RecordingTransport::default());
    let (pipeline, _log) = pipeline(PageScript::with_prices("2,100", "95"), transport.clone());

    pipeline.run_tick().await;

    assert_eq!(transport.sent()[0].subject, "Co2: 95");
}

#[tokio::test(start_paused = true)]
async fn test_expensive_prices_send_nothing() {
    let transport = Arc::new(RecordingTransport::default());
    let (pipeline, log) = pipeline(PageScript::with_prices("2,100", "140"), transport.clone());

    let report = pipeline.run_tick().await;

    assert_eq!(report.decision, Decision::NoAction);
    assert_eq!(report.dispatch, Dispatch::Skipped);
    assert!(transport.sent().is_empty());
    assert_eq!(log.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_failure_alerts_admin_only() {
    let transport = Arc::new(RecordingTransport::default());
    let script = PageScript {
        login_succeeds_on: None,
        ..PageScript::default()
    };
    let (pipeline, _log) = pipeline(script, transport.clone());

    pipeline.run_tick().await;

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, ADMIN_ALERT_SUBJECT);
    assert_eq!(sent[0].recipients.len(), 1);
    assert!(sent[0].recipients.contains("admin@example.com"));
}

#[tokio::test(start_paused = true)]
async fn test_mail_failure_does_not_fail_the_tick() {
    let transport = Arc::new(RecordingTransport::failing());
    let (pipeline, _log) = pipeline(PageScript::with_prices("500", "100"), transport);

    let report = pipeline.run_tick().await;

    assert!(matches!(report.dispatch, Dispatch::Failed { ref error } if error.contains("535")));
    assert_eq!(report.decision.kind(), "notify");
}
