//! Cross-channel reconciliation: the return URL and the poller may both learn
//! the outcome of one payment, but its effects apply only once.

use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test(start_paused = true)]
async fn test_return_url_first_silences_poller() {
    let h = Harness::new();
    h.repo().save(&test_session());
    h.oracle.set_fallback(success_outcome());
    h.oracle.verify_with(REFERENCE, "CAPTURED");

    let report = h.engine.mount(RETURN_URL).await;
    assert_eq!(report.verification.unwrap().claim, Some(Claim::Won));
    assert!(!report.resumed);

    advance(60).await;
    assert_eq!(h.oracle.queries(), 0);
    assert_eq!(h.host.notices().len(), 1, "success must be announced once");
    assert_eq!(h.host.setups(), 1);
    assert_eq!(h.host.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poller_first_silences_return_url() {
    let h = Harness::new();
    h.oracle.push(success_outcome());
    h.oracle.verify_with(REFERENCE, "CAPTURED");

    h.engine.begin(test_session());
    advance(1).await;
    assert_eq!(h.engine.snapshot().status, PollStatus::Success);
    assert_eq!(h.host.notices().len(), 1);

    // Browser lands on the return URL while the poller waits to reload.
    let report = h.engine.mount(RETURN_URL).await;
    let verification = report.verification.unwrap();
    assert_eq!(verification.status, VerifyStatus::Success);
    assert_eq!(verification.claim, Some(Claim::AlreadyResolved));
    assert_eq!(h.host.setups(), 1, "setup is still offered");
    assert!(h.repo().is_reconciliation_flag_set(), "modal keeps the token");

    advance(5).await;
    assert_eq!(h.host.notices().len(), 1, "success must be announced once");
    assert_eq!(h.host.reloads(), 0, "reload must not tear down the modal");

    h.engine.dismiss_setup();
    assert_eq!(h.host.reloads(), 1);
    assert!(!h.repo().is_reconciliation_flag_set());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_channels_poller_wins() {
    let h = Harness::new();
    h.oracle.push(success_outcome());
    h.oracle.verify_with(REFERENCE, "CAPTURED");
    h.oracle.delay_verify(Duration::from_secs(1));

    // The poller answers at once, the gateway check lands one second later
    // while the poller is still waiting to reload.
    h.engine.begin(test_session());
    let report = h.engine.mount(RETURN_URL).await;

    assert_eq!(
        report.verification.unwrap().claim,
        Some(Claim::AlreadyResolved)
    );
    assert!(!report.resumed);
    assert_eq!(h.host.notices().len(), 1);
    assert_eq!(h.host.count(|e| matches!(e, HostEvent::Refresh(_))), 1);
    assert_eq!(h.host.setups(), 1);

    advance(5).await;
    assert_eq!(h.engine.snapshot().status, PollStatus::Success);
    assert_eq!(h.host.reloads(), 0, "open setup modal holds the reload");

    h.engine.dismiss_setup();
    assert_eq!(h.host.reloads(), 1, "deferred reload runs exactly once");

    advance(30).await;
    assert_eq!(h.host.reloads(), 1);
    assert_eq!(h.host.notices().len(), 1);
    assert_eq!(h.oracle.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_channels_return_url_wins() {
    let h = Harness::new();
    h.oracle.push(success_outcome());
    h.oracle.delay_queries(Duration::from_secs(3));
    h.oracle.verify_with(REFERENCE, "CAPTURED");
    h.oracle.delay_verify(Duration::from_secs(1));

    // The first status query is in flight when the gateway check settles the
    // payment; its success arrives after the claim.
    h.engine.begin(test_session());
    let report = h.engine.mount(RETURN_URL).await;

    assert_eq!(report.verification.unwrap().claim, Some(Claim::Won));
    assert!(!report.resumed);

    advance(5).await;
    assert_eq!(h.oracle.queries(), 1);
    assert_eq!(h.engine.snapshot().status, PollStatus::Success);
    assert_eq!(h.host.notices().len(), 1);
    assert_eq!(h.host.count(|e| matches!(e, HostEvent::Refresh(_))), 1);
    assert_eq!(h.host.setups(), 1);
    assert_eq!(h.host.reloads(), 0);

    h.engine.dismiss_setup();
    assert_eq!(h.host.reloads(), 0, "the poller lost, nothing was deferred");
}

#[tokio::test(start_paused = true)]
async fn test_failure_on_both_channels_redirects_once() {
    let h = Harness::new();
    h.oracle.push(failed_outcome());
    h.oracle.verify_with(REFERENCE, "DECLINED");

    h.engine.begin(test_session());
    advance(1).await;

    let report = h.engine.mount(RETURN_URL).await;
    assert_eq!(
        report.verification.unwrap().claim,
        Some(Claim::AlreadyResolved)
    );

    advance(10).await;
    assert_eq!(h.host.notices().len(), 1);
    assert_eq!(h.host.navigations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_tab_resolution_stops_poller() {
    let tab_a = Harness::new();
    tab_a.engine.begin(test_session());
    advance(1).await;
    assert_eq!(tab_a.oracle.queries(), 1);

    let tab_b = tab_a.open_tab();
    tab_b.oracle.verify_with(REFERENCE, "CAPTURED");
    let report = tab_b.engine.mount(RETURN_URL).await;
    assert_eq!(report.verification.unwrap().claim, Some(Claim::Won));

    advance(10).await;
    assert_eq!(tab_a.engine.snapshot().status, PollStatus::Idle);
    assert_eq!(tab_a.oracle.queries(), 1, "poller should notice the session is gone");
    assert!(tab_a.host.events().is_empty(), "tab A must stay silent");
    assert_eq!(tab_b.host.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_deferred_until_modal_dismissed() {
    let h = Harness::new();
    h.engine.repository().set_reconciliation_flag(Some("ref_other"));
    h.oracle.push(success_outcome());

    h.engine.begin(test_session());
    advance(5).await;

    assert_eq!(h.engine.snapshot().status, PollStatus::Success);
    assert_eq!(h.host.notices().len(), 1);
    assert_eq!(h.host.reloads(), 0, "open modal holds the reload back");

    h.engine.dismiss_setup();
    assert_eq!(h.host.reloads(), 1, "deferred reload runs on dismissal");

    h.engine.dismiss_setup();
    assert_eq!(h.host.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_modal_token_does_not_block_reload() {
    let mut config = Config::default();
    config.timings.modal_token_ttl = Duration::ZERO;
    let h = Harness::with_config(config);
    h.engine.repository().set_reconciliation_flag(Some("ref_other"));
    h.oracle.push(success_outcome());

    h.engine.begin(test_session());
    advance(5).await;

    assert!(!h.repo().is_reconciliation_flag_set());
    assert_eq!(h.host.reloads(), 1);
}
