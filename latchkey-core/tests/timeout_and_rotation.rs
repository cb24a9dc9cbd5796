#[path = "support/mod.rs"]
mod support;

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use latchkey_core::{
    AuthFailure, CookieSettings, HostRequest, InitArgs, MemoryTokenStore,
    Resolution, ScopeConfig, SessionEvent, TokenKind, TransportKind,
};
use support::harness::{TEST_PASSWORD, TestSessionHarness, cookie_value};

fn cookie_only() -> ScopeConfig {
    ScopeConfig::new("user").with_transports([TransportKind::Cookie])
}

#[test]
fn idle_sessions_expire_after_the_timeout() -> Result<()> {
    let harness =
        TestSessionHarness::new([cookie_only().with_timeout(Duration::minutes(30))])?;
    for n in 1..=7 {
        harness.create_user(&format!("user{n}"))?;
    }

    let (_, recent) = harness.login("user", "user7", TEST_PASSWORD)?;
    harness.advance(Duration::minutes(10));
    let (session, _) = harness.restore("user", &recent)?;
    assert_eq!(session.record_id().map(|id| id.to_string()), Some("7".into()));

    let (_, stale) = harness.login("user", "user7", TEST_PASSWORD)?;
    harness.advance(Duration::minutes(40));
    let (mut expired, request) = harness.restore("user", &stale)?;
    assert!(!expired.is_authenticated());
    assert!(expired.has_error(&AuthFailure::TokenExpired));
    assert!(!expired.has_error(&AuthFailure::InvalidCredentials));
    assert!(!expired.has_error(&AuthFailure::NotAuthenticated));
    assert!(expired.error_messages().is_empty());
    assert!(matches!(
        expired.take_events().as_slice(),
        [SessionEvent::Expired { record_id, .. }] if record_id.as_str() == "7"
    ));
    assert!(cookie_value(&request, "user_credentials").is_none());
    Ok(())
}

#[test]
fn activity_extends_the_timeout_window() -> Result<()> {
    let harness =
        TestSessionHarness::new([cookie_only().with_timeout(Duration::minutes(30))])?;
    harness.create_user("alice")?;
    let (_, mut request) = harness.login("user", "alice", TEST_PASSWORD)?;

    for _ in 0..3 {
        harness.advance(Duration::minutes(20));
        let (session, next) = harness.restore("user", &request)?;
        assert!(session.is_authenticated());
        request = next;
    }

    harness.advance(Duration::minutes(31));
    let (session, _) = harness.restore("user", &request)?;
    assert!(session.has_error(&AuthFailure::TokenExpired));
    Ok(())
}

#[test]
fn rotation_retires_the_presented_token() -> Result<()> {
    let harness = TestSessionHarness::new([
        ScopeConfig::new("user").with_persistence_token_rotation(true)
    ])?;
    harness.create_user("alice")?;
    let (login, login_request) = harness.login("user", "alice", TEST_PASSWORD)?;
    let original = login
        .persistence_token()
        .map(|token| token.as_str().to_string())
        .expect("persistence token");

    let (mut restored, rotated_request) =
        harness.restore("user", &login_request)?;
    assert!(restored.is_authenticated());
    let rotated = restored
        .persistence_token()
        .map(|token| token.as_str().to_string())
        .expect("rotated token");
    assert_ne!(rotated, original);
    assert!(
        cookie_value(&rotated_request, "user_credentials")
            .is_some_and(|value| value.starts_with(&rotated))
    );
    assert!(
        restored
            .take_events()
            .iter()
            .any(|event| matches!(event, SessionEvent::TokenRotated { .. }))
    );

    let (replayed, _) = harness.restore("user", &login_request)?;
    assert!(!replayed.is_authenticated());

    let (current, _) = harness.restore("user", &rotated_request)?;
    assert!(current.is_authenticated());
    Ok(())
}

#[test]
fn perishable_token_hands_off_to_a_persisted_login() -> Result<()> {
    let harness = TestSessionHarness::new([ScopeConfig::new("user")])?;
    let alice = harness.create_user("alice")?;
    let perishable = harness
        .pipeline()
        .perishable_tokens()
        .issue("user", &alice.id)?;

    let found = harness
        .pipeline()
        .find_using_perishable_token("user", perishable.as_str())?;
    assert_eq!(found.map(|user| user.id), Some(alice.id.clone()));

    let mut request = HostRequest::new()
        .with_param("user_credentials", perishable.as_str())
        .with_format("text/html");
    let session = harness.construct("user", InitArgs::none(), &mut request)?;
    assert_eq!(
        session.resolution(),
        Some(Resolution::Token {
            transport: TransportKind::Params,
            kind: TokenKind::Perishable,
        })
    );
    assert!(!session.is_stateless());
    assert!(cookie_value(&request, "user_credentials").is_some());
    assert_eq!(harness.users().get(&alice.id).map(|u| u.login_count), Some(1));

    let (restored, _) = harness.restore("user", &request)?;
    assert!(restored.is_authenticated());

    let mut reused = HostRequest::new()
        .with_param("user_credentials", perishable.as_str());
    let session = harness.construct("user", InitArgs::none(), &mut reused)?;
    assert!(!session.is_authenticated());
    assert!(
        harness
            .pipeline()
            .find_using_perishable_token("user", perishable.as_str())?
            .is_none()
    );
    Ok(())
}

#[test]
fn perishable_tokens_go_stale() -> Result<()> {
    let harness = TestSessionHarness::new([ScopeConfig::new("user")
        .with_perishable_token_valid_for(Duration::minutes(10))])?;
    let alice = harness.create_user("alice")?;
    let tokens = harness.pipeline().perishable_tokens();

    let first = tokens.issue("user", &alice.id)?;
    let second = tokens.rotate("user", &alice.id)?;
    assert!(tokens.verify("user", first.as_str())?.is_none());
    assert_eq!(tokens.verify("user", second.as_str())?, Some(alice.id.clone()));

    harness.advance(Duration::minutes(11));
    assert!(tokens.verify("user", second.as_str())?.is_none());

    let mut request =
        HostRequest::new().with_param("user_credentials", second.as_str());
    let session = harness.construct("user", InitArgs::none(), &mut request)?;
    assert!(!session.is_authenticated());
    Ok(())
}

#[test]
fn password_login_resets_the_perishable_token() -> Result<()> {
    let harness = TestSessionHarness::new([ScopeConfig::new("user")])?;
    let alice = harness.create_user("alice")?;
    let tokens = harness.pipeline().perishable_tokens();
    let reset_link = tokens.issue("user", &alice.id)?;

    harness.login("user", "alice", TEST_PASSWORD)?;
    assert!(tokens.verify("user", reset_link.as_str())?.is_none());
    Ok(())
}

#[test]
fn remembered_logins_outlive_the_browser_session() -> Result<()> {
    let harness = TestSessionHarness::new([cookie_only()])?;
    harness.create_user("alice")?;

    let (forgotten, request) = harness.login("user", "alice", TEST_PASSWORD)?;
    assert!(!forgotten.is_remembered());
    let cookie = request.cookie_delta().next().expect("session cookie");
    assert!(cookie.max_age().is_none());

    let (session, request) = harness.login_with(
        "user",
        InitArgs::password("alice", TEST_PASSWORD).remember_me(true),
    )?;
    assert!(session.is_remembered());
    let cookie = request.cookie_delta().next().expect("remembered cookie");
    assert_eq!(cookie.max_age(), Some(time::Duration::days(90)));

    harness.advance(Duration::days(89));
    let (restored, request) = harness.restore("user", &request)?;
    assert!(restored.is_authenticated());
    assert_eq!(
        restored.remember_until().map(|at| at.timestamp()),
        session.remember_until().map(|at| at.timestamp())
    );

    harness.advance(Duration::days(2));
    let (lapsed, _) = harness.restore("user", &request)?;
    assert!(!lapsed.is_authenticated());
    Ok(())
}

fn remembered_for_a_day() -> ScopeConfig {
    cookie_only().with_cookie(CookieSettings {
        remember_me_for: Duration::days(1),
        ..CookieSettings::default()
    })
}

#[test]
fn remembered_login_ends_even_without_the_cookie_stamp() -> Result<()> {
    let harness = TestSessionHarness::new([remembered_for_a_day()])?;
    harness.create_user("alice")?;
    let (session, request) = harness.login_with(
        "user",
        InitArgs::password("alice", TEST_PASSWORD).remember_me(true),
    )?;
    let stamped = cookie_value(&request, "user_credentials").expect("cookie");
    let (unstamped, _) = stamped.rsplit_once("::").expect("remember stamp");
    let unstamped = unstamped.to_string();

    let mut replayed =
        HostRequest::new().with_cookie("user_credentials", unstamped.clone());
    let restored = harness.construct("user", InitArgs::none(), &mut replayed)?;
    assert!(restored.is_authenticated());
    assert_eq!(
        restored.remember_until().map(|at| at.timestamp()),
        session.remember_until().map(|at| at.timestamp())
    );

    harness.advance(Duration::days(30));
    let mut replayed =
        HostRequest::new().with_cookie("user_credentials", unstamped);
    let lapsed = harness.construct("user", InitArgs::none(), &mut replayed)?;
    assert!(!lapsed.is_authenticated());
    assert!(lapsed.has_error(&AuthFailure::TokenExpired));
    assert!(cookie_value(&replayed, "user_credentials").is_none());
    Ok(())
}

#[test]
fn lapsed_remember_cookie_revokes_its_token() -> Result<()> {
    let store = Arc::new(MemoryTokenStore::new());
    let harness =
        TestSessionHarness::with_builder([remembered_for_a_day()], |builder| {
            builder.with_token_store(store.clone())
        })?;
    harness.create_user("alice")?;
    let (_, request) = harness.login_with(
        "user",
        InitArgs::password("alice", TEST_PASSWORD).remember_me(true),
    )?;
    assert_eq!(store.len(), 1);

    harness.advance(Duration::days(2));
    let (mut lapsed, request) = harness.restore("user", &request)?;
    assert!(!lapsed.is_authenticated());
    assert!(store.is_empty());
    assert!(cookie_value(&request, "user_credentials").is_none());
    assert!(matches!(
        lapsed.take_events().as_slice(),
        [SessionEvent::Expired { .. }]
    ));
    Ok(())
}

#[test]
fn racing_perishable_issues_leave_one_valid_token() -> Result<()> {
    let store = Arc::new(MemoryTokenStore::new());
    let harness =
        TestSessionHarness::with_builder([ScopeConfig::new("user")], |builder| {
            builder.with_token_store(store.clone())
        })?;
    let alice = harness.create_user("alice")?;
    let tokens = harness.pipeline().perishable_tokens();

    let issued: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    (0..100)
                        .map(|_| tokens.issue("user", &alice.id))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("issuing thread"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut valid = 0;
    for token in issued.iter().flatten() {
        if tokens.verify("user", token.as_str())?.is_some() {
            valid += 1;
        }
    }
    assert_eq!(valid, 1);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn signed_cookies_reject_tampering() -> Result<()> {
    let harness = TestSessionHarness::new([cookie_only().with_cookie(
        CookieSettings {
            sign: true,
            ..CookieSettings::default()
        },
    )])?;
    harness.create_user("alice")?;
    harness.create_user("bob")?;

    let (session, request) = harness.login("user", "alice", TEST_PASSWORD)?;
    let token = session
        .persistence_token()
        .map(|token| token.as_str().to_string())
        .expect("persistence token");
    let signed = cookie_value(&request, "user_credentials").expect("cookie");
    assert_ne!(signed, format!("{token}::1"));

    let (restored, _) = harness.restore("user", &request)?;
    assert!(restored.is_authenticated());

    let mut tampered = HostRequest::new()
        .with_cookie("user_credentials", signed.replace("::1", "::2"));
    let session = harness.construct("user", InitArgs::none(), &mut tampered)?;
    assert!(!session.is_authenticated());

    let mut unsigned = HostRequest::new()
        .with_cookie("user_credentials", format!("{token}::1"));
    let session = harness.construct("user", InitArgs::none(), &mut unsigned)?;
    assert!(!session.is_authenticated());
    Ok(())
}

#[test]
fn request_activity_is_throttled() -> Result<()> {
    let harness = TestSessionHarness::new([ScopeConfig::new("user")
        .with_last_request_at_threshold(Duration::minutes(10))])?;
    let alice = harness.create_user("alice")?;
    let (login, request) = harness.login("user", "alice", TEST_PASSWORD)?;
    let logged_in_at = login.last_activity().expect("login time");
    let last_request_at =
        || harness.users().get(&alice.id).and_then(|u| u.last_request_at);
    assert_eq!(last_request_at(), Some(logged_in_at));

    harness.advance(Duration::minutes(5));
    let (_, request) = harness.restore("user", &request)?;
    assert_eq!(last_request_at(), Some(logged_in_at));

    harness.advance(Duration::minutes(10));
    let (session, _) = harness.restore("user", &request)?;
    assert_eq!(last_request_at(), session.last_activity());
    assert_ne!(last_request_at(), Some(logged_in_at));
    Ok(())
}
