//! Return-URL verification on application mount.

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test(start_paused = true)]
async fn test_plain_url_does_nothing() {
    let h = Harness::new();

    let report = h.engine.mount(PLAIN_URL).await;
    assert!(report.verification.is_none());
    assert!(!report.resumed);
    assert_eq!(h.oracle.verifications(), 0);
    assert!(h.host.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_url_still_resumes_stored_session() {
    let h = Harness::new();
    h.repo().save(&test_session());

    let report = h.engine.mount("/dashboard").await;
    assert!(report.verification.is_none());
    assert!(
        report.verify_error.is_some(),
        "relative URL should surface a verification error"
    );
    assert!(report.resumed, "stored session must keep polling");
    assert_eq!(h.oracle.verifications(), 0);

    advance(1).await;
    assert_eq!(h.oracle.queries(), 1);
    assert_eq!(h.engine.snapshot().status, PollStatus::Polling);
}

#[tokio::test(start_paused = true)]
async fn test_captured_payment_round_trip() {
    let h = Harness::new();
    h.oracle.verify_with(REFERENCE, "CAPTURED");

    let report = h.engine.mount(RETURN_URL).await;
    let verification = report.verification.expect("gateway reference should be detected");

    assert_eq!(verification.reference, REFERENCE);
    assert_eq!(verification.status, VerifyStatus::Success);
    assert_eq!(verification.gateway_status.as_deref(), Some("CAPTURED"));
    assert_eq!(verification.cleaned_url, PLAIN_URL);
    assert_eq!(verification.claim, Some(Claim::Won));
    assert_eq!(verification.authorization_id.as_deref(), Some("auth_77"));
    assert!(!report.resumed);
    assert_eq!(h.oracle.verifications(), 1);
    assert_eq!(h.oracle.queries(), 0);

    let events = h.host.events();
    assert_eq!(
        events.first(),
        Some(&HostEvent::ReplaceUrl(PLAIN_URL.to_string())),
        "gateway params should be stripped before anything else"
    );

    let notices = h.host.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Success);

    let prompts: Vec<SetupPrompt> = events
        .into_iter()
        .filter_map(|e| match e {
            HostEvent::PresentSetup(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].reference, REFERENCE);
    assert_eq!(prompts[0].authorization_id.as_deref(), Some("auth_77"));
    assert_eq!(prompts[0].currency.as_deref(), Some("SAR"));

    assert_eq!(
        h.storage.get(keys::LAST_REFERENCE).as_deref(),
        Some(REFERENCE),
        "raw reference should be remembered"
    );
    assert!(h.repo().is_reconciliation_flag_set(), "modal holds the token");
}

#[tokio::test(start_paused = true)]
async fn test_captured_payment_uses_stored_session_context() {
    let h = Harness::new();
    h.repo().save(&test_session());
    h.oracle.verify_with(REFERENCE, "CAPTURED");

    let report = h.engine.mount(RETURN_URL).await;
    assert!(!report.resumed, "settled session must not restart polling");
    assert!(!h.session_stored());

    assert_eq!(
        h.host.count(|e| *e == HostEvent::Refresh(Some(STORE_ID.to_string()))),
        1
    );
    let prompt = h
        .host
        .events()
        .into_iter()
        .find_map(|e| match e {
            HostEvent::PresentSetup(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!(prompt.store_id.as_deref(), Some(STORE_ID));
    assert_eq!(prompt.plan_id.as_deref(), Some(PLAN_ID));
}

#[tokio::test(start_paused = true)]
async fn test_dismissing_setup_releases_token_without_reload() {
    let h = Harness::new();
    h.oracle.verify_with(REFERENCE, "CAPTURED");
    h.engine.mount(RETURN_URL).await;

    h.engine.dismiss_setup();
    assert!(!h.repo().is_reconciliation_flag_set());
    assert_eq!(h.host.reloads(), 0, "no reload was waiting on the modal");
}

#[tokio::test(start_paused = true)]
async fn test_declined_payment_redirects_to_retry() {
    let h = Harness::new();
    h.repo().save(&test_session());
    h.oracle.verify_with(REFERENCE, "DECLINED");

    let report = h.engine.mount(RETURN_URL).await;
    let verification = report.verification.unwrap();
    assert_eq!(verification.status, VerifyStatus::Failed);
    assert_eq!(verification.claim, Some(Claim::Won));
    assert!(!report.resumed);

    let notices = h.host.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Error);
    assert_eq!(h.host.navigations(), vec!["/subscription".to_string()]);
    assert_eq!(h.host.setups(), 0);
    assert!(!h.repo().is_reconciliation_flag_set());
}

#[tokio::test(start_paused = true)]
async fn test_pending_gateway_status_falls_through_to_polling() {
    let h = Harness::new();
    h.repo().save(&test_session());
    h.oracle.verify_with(REFERENCE, "INITIATED");

    let report = h.engine.mount(RETURN_URL).await;
    let verification = report.verification.unwrap();
    assert_eq!(verification.status, VerifyStatus::Pending);
    assert_eq!(verification.claim, None);
    assert!(report.resumed, "stored session should keep polling");
    assert!(h.host.notices().is_empty());

    advance(1).await;
    assert_eq!(h.oracle.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_verification_is_unknown() {
    let h = Harness::new();
    h.oracle.verify_unavailable();

    let report = h.engine.mount(RETURN_URL).await;
    let verification = report.verification.unwrap();
    assert_eq!(verification.status, VerifyStatus::Unknown);
    assert_eq!(verification.gateway_status, None);
    assert_eq!(verification.claim, None);
    assert!(h.host.notices().is_empty());
    assert_eq!(
        h.host.events(),
        vec![HostEvent::ReplaceUrl(PLAIN_URL.to_string())],
        "URL is still cleaned so a reload cannot retry forever"
    );
}

#[tokio::test(start_paused = true)]
async fn test_alternate_reference_param_and_unrelated_params_kept() {
    let h = Harness::new();
    h.oracle.verify_with("chg_9", "CAPTURED");

    let report = h
        .engine
        .mount("https://shop.example.com/billing?tab=plans&tap_id=chg_9")
        .await;
    let verification = report.verification.unwrap();
    assert_eq!(verification.reference, "chg_9");
    assert_eq!(
        verification.cleaned_url,
        "https://shop.example.com/billing?tab=plans"
    );
}

#[tokio::test(start_paused = true)]
async fn test_cleaned_url_does_not_verify_again() {
    let h = Harness::new();
    h.oracle.verify_with(REFERENCE, "CAPTURED");

    let report = h.engine.mount(RETURN_URL).await;
    let cleaned = report.verification.unwrap().cleaned_url;

    let h = h.reload_page();
    let report = h.engine.mount(&cleaned).await;
    assert!(report.verification.is_none());
    assert_eq!(h.oracle.verifications(), 1);
    assert_eq!(h.host.notices().len(), 1);
}
