use super::*;
use crate::cache::keys;
use crate::net::Method;
use crate::net::types::{Household, Role};
use crate::services::HouseholdService;
use crate::test_helpers::{MockTransport, api_client, envelope, household, query_cache, user};
use serde_json::json;
use std::time::Duration;

fn manager(mock: &Arc<MockTransport>) -> (Arc<SessionManager>, Arc<QueryCache>) {
    let cache = query_cache();
    (Arc::new(SessionManager::new(api_client(mock), cache.clone())), cache)
}

fn credentials() -> Credentials {
    Credentials { email: "a@b.com".into(), password: "pw".into() }
}

async fn logged_in(mock: &Arc<MockTransport>) -> (Arc<SessionManager>, Arc<QueryCache>) {
    mock.csrf("t1");
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u1", None)));
    let (session, cache) = manager(mock);
    session.login(&credentials()).await.unwrap();
    assert_eq!(session.status(), AuthStatus::LoggedIn);
    (session, cache)
}

// =============================================================================
// transition table
// =============================================================================

#[test]
fn unknown_is_never_reentered() {
    let all = [
        AuthStatus::Unknown,
        AuthStatus::Checking,
        AuthStatus::LoggingIn,
        AuthStatus::LoggingOut,
        AuthStatus::LoggedIn,
        AuthStatus::LoggedOut,
    ];
    for from in all {
        assert!(!from.can_transition_to(AuthStatus::Unknown), "{from:?} -> Unknown");
    }
}

#[test]
fn check_is_rejected_mid_login_and_logout() {
    assert!(!AuthStatus::LoggingIn.can_transition_to(AuthStatus::Checking));
    assert!(!AuthStatus::LoggingOut.can_transition_to(AuthStatus::Checking));
    assert!(!AuthStatus::Checking.can_transition_to(AuthStatus::Checking));
}

#[test]
fn login_only_from_unauthenticated_states() {
    assert!(AuthStatus::Unknown.can_transition_to(AuthStatus::LoggingIn));
    assert!(AuthStatus::LoggedOut.can_transition_to(AuthStatus::LoggingIn));
    assert!(!AuthStatus::LoggedIn.can_transition_to(AuthStatus::LoggingIn));
    assert!(!AuthStatus::LoggedIn.can_transition_to(AuthStatus::LoggedOut));
}

// =============================================================================
// check_auth
// =============================================================================

#[tokio::test]
async fn concurrent_checks_share_one_round_trip() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 200, json!({}));
    mock.reply(Method::GET, "/auth/whoami", 200, envelope(&user("u1", None)));
    let (session, _) = manager(&mock);

    let (a, b, c) = tokio::join!(session.check_auth(), session.check_auth(), session.check_auth());

    assert_eq!(mock.count(&Method::GET, "/auth/validate"), 1);
    assert_eq!(mock.count(&Method::GET, "/auth/whoami"), 1);
    assert_eq!(a, AuthStatus::LoggedIn);
    assert_eq!(b, AuthStatus::LoggedIn);
    assert_eq!(c, AuthStatus::LoggedIn);
}

#[tokio::test]
async fn expired_session_resolves_logged_out() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 401, json!({ "error": "session expired" }));
    let (session, _) = manager(&mock);

    assert_eq!(session.check_auth().await, AuthStatus::LoggedOut);
    assert!(session.user().is_none());
    assert_eq!(mock.count(&Method::GET, "/auth/whoami"), 0);
}

#[tokio::test]
async fn valid_session_without_user_is_logged_out() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 200, json!({}));
    mock.reply(Method::GET, "/auth/whoami", 200, json!({ "data": {} }));
    let (session, _) = manager(&mock);

    assert_eq!(session.check_auth().await, AuthStatus::LoggedOut);
}

#[tokio::test]
async fn user_without_display_name_is_logged_in() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 200, json!({}));
    mock.reply(Method::GET, "/auth/whoami", 200, json!({ "data": { "id": "u1", "email": "a@b.com" } }));
    let (session, _) = manager(&mock);

    assert_eq!(session.check_auth().await, AuthStatus::LoggedIn);
    let current = session.user().unwrap();
    assert_eq!(current.id, "u1");
    assert_eq!(current.name, "");
}

#[tokio::test]
async fn network_failure_during_check_is_swallowed() {
    let mock = MockTransport::new();
    mock.fail(Method::GET, "/auth/validate");
    let (session, _) = manager(&mock);

    assert_eq!(session.check_auth().await, AuthStatus::LoggedOut);
}

#[tokio::test]
async fn guard_is_released_after_check() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 401, json!({}));
    let (session, _) = manager(&mock);

    session.check_auth().await;
    session.check_auth().await;
    assert_eq!(mock.count(&Method::GET, "/auth/validate"), 2);
}

#[tokio::test]
async fn check_during_login_does_not_race() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u1", None)));
    mock.reply(Method::GET, "/auth/validate", 401, json!({}));
    let (session, _) = manager(&mock);
    let creds = credentials();

    let (login, checked) = tokio::join!(session.login(&creds), session.check_auth());

    assert!(login.unwrap().is_some());
    assert_eq!(checked, AuthStatus::LoggingIn);
    assert_eq!(session.status(), AuthStatus::LoggedIn);
    assert_eq!(mock.count(&Method::GET, "/auth/validate"), 0);
}

// =============================================================================
// login / register
// =============================================================================

#[tokio::test]
async fn login_establishes_session() {
    let mock = MockTransport::new();
    mock.reply(Method::POST, "/auth/login", 200, json!({ "data": { "id": "u1", "name": "A" } }));
    mock.csrf("t1");
    let (session, _) = manager(&mock);

    let returned = session.login(&credentials()).await.unwrap().unwrap();

    assert_eq!(returned.id, "u1");
    assert_eq!(session.status(), AuthStatus::LoggedIn);
    assert_eq!(session.user().unwrap().id, "u1");
    assert_eq!(session.api().csrf_token().as_deref(), Some("t1"));
    let body = mock.last(&Method::POST, "/auth/login").unwrap().body;
    assert_eq!(body, Some(json!({ "email": "a@b.com", "password": "pw" })));
}

#[tokio::test]
async fn login_while_logged_in_is_noop() {
    let mock = MockTransport::new();
    let (session, _) = logged_in(&mock).await;
    let calls_before = mock.calls().len();
    let before = session.session();

    assert!(session.login(&credentials()).await.unwrap().is_none());
    assert_eq!(mock.calls().len(), calls_before);
    assert_eq!(session.session(), before);
}

#[tokio::test]
async fn login_without_payload_is_logged_out() {
    let mock = MockTransport::new();
    mock.reply(Method::POST, "/auth/login", 200, json!({ "message": "check your email" }));
    let (session, _) = manager(&mock);

    assert!(session.login(&credentials()).await.unwrap().is_none());
    assert_eq!(session.status(), AuthStatus::LoggedOut);
}

#[tokio::test]
async fn login_failure_is_returned() {
    let mock = MockTransport::new();
    mock.reply(Method::POST, "/auth/login", 401, json!({ "error": "Invalid credentials" }));
    let (session, _) = manager(&mock);

    let err = session.login(&credentials()).await.unwrap_err();
    assert_eq!(err.status_code, 401);
    assert_eq!(err.message, "Invalid credentials");
    assert_eq!(session.status(), AuthStatus::LoggedOut);
}

#[tokio::test]
async fn failed_token_prefetch_does_not_fail_login() {
    let mock = MockTransport::new();
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u1", None)));
    mock.fail(Method::GET, "/auth/csrf-token");
    let (session, _) = manager(&mock);

    assert!(session.login(&credentials()).await.unwrap().is_some());
    assert_eq!(session.status(), AuthStatus::LoggedIn);
    assert!(session.api().csrf_token().is_none());
}

#[tokio::test]
async fn register_logs_in() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/auth/register", 201, envelope(&user("u2", None)));
    let (session, _) = manager(&mock);

    let registration = Registration { email: "b@b.com".into(), password: "pw".into(), name: "Bea".into() };
    let created = session.register(&registration).await.unwrap().unwrap();

    assert_eq!(created.id, "u2");
    assert_eq!(session.status(), AuthStatus::LoggedIn);
    assert!(mock.last(&Method::POST, "/auth/register").unwrap().header("X-CSRF-Token").is_none());
}

#[tokio::test]
async fn login_replaces_anonymous_token() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/csrf-token", 200, json!({ "csrfToken": "anon" }));
    mock.reply(Method::GET, "/auth/csrf-token", 200, json!({ "csrfToken": "t1" }));
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u1", None)));
    let (session, _) = manager(&mock);

    session.api().ensure_csrf_token().await.unwrap();
    session.login(&credentials()).await.unwrap();

    assert_eq!(session.api().csrf_token().as_deref(), Some("t1"));
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_clears_session() {
    let mock = MockTransport::new();
    let (session, _) = logged_in(&mock).await;
    mock.reply(Method::POST, "/auth/logout", 200, json!({ "message": "bye" }));

    session.logout().await.unwrap();

    assert_eq!(session.status(), AuthStatus::LoggedOut);
    assert!(session.user().is_none());
    assert!(session.api().csrf_token().is_none());
}

#[tokio::test]
async fn logout_failure_keeps_previous_session() {
    let mock = MockTransport::new();
    let (session, _) = logged_in(&mock).await;
    mock.reply(Method::POST, "/auth/logout", 500, json!({ "error": "try again" }));
    let before = session.session();

    let err = session.logout().await.unwrap_err();

    assert_eq!(err.status_code, 500);
    assert_eq!(session.session(), before);
}

#[tokio::test]
async fn logout_when_logged_out_is_noop() {
    let mock = MockTransport::new();
    let (session, _) = manager(&mock);

    session.logout().await.unwrap();
    assert!(mock.calls().is_empty());
    assert_eq!(session.status(), AuthStatus::Unknown);
}

// =============================================================================
// cross-session isolation
// =============================================================================

#[tokio::test]
async fn households_cached_before_login_are_refetched() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u2", None)));
    mock.reply(Method::GET, "/households", 200, envelope(&vec![household("h2", "Bea's", Role::Owner)]));
    let (session, cache) = manager(&mock);
    let service = HouseholdService::new(session.api().clone(), cache.clone(), Duration::from_secs(600));
    cache.set_query_data(&keys::households(), vec![household("h1", "Previous user", Role::Owner)]);

    session.login(&credentials()).await.unwrap();
    let list: Vec<Household> = service.get_households().await.unwrap();

    assert_eq!(list[0].id, "h2");
    assert_eq!(mock.count(&Method::GET, "/households"), 1);
}

#[tokio::test]
async fn households_cached_before_logout_are_dropped() {
    let mock = MockTransport::new();
    let (session, cache) = logged_in(&mock).await;
    mock.reply(Method::POST, "/auth/logout", 200, json!({}));
    cache.set_query_data(&keys::households(), vec![household("h1", "Home", Role::Owner)]);
    cache.set_query_data(&keys::household_members("h1"), Vec::new());

    session.logout().await.unwrap();

    assert!(cache.is_empty());
}

#[tokio::test]
async fn subscribers_see_terminal_status() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/auth/validate", 401, json!({}));
    let (session, _) = manager(&mock);
    let mut rx = session.subscribe();

    session.check_auth().await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().status, AuthStatus::LoggedOut);
}
