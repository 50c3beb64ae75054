use super::*;
use crate::net::Method;
use crate::net::types::{Credentials, Role};
use crate::state::AuthStatus;
use crate::test_helpers::{BASE_URL, MockTransport, envelope, household, user};
use serde_json::json;

fn app(mock: &Arc<MockTransport>) -> App {
    let config = ClientConfig::default().with_base_url(BASE_URL).unwrap();
    App::with_transport(config, mock.clone())
}

#[tokio::test]
async fn components_share_pipeline_and_cache() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/auth/login", 200, envelope(&user("u1", None)));
    mock.reply(Method::GET, "/households", 200, envelope(&vec![household("h1", "Home", Role::Owner)]));
    mock.reply_raw(Method::DELETE, "/households/h1/members/u2", 204, "");
    let app = app(&mock);

    let credentials = Credentials { email: "a@b.com".into(), password: "pw".into() };
    app.session.login(&credentials).await.unwrap();
    assert_eq!(app.session.status(), AuthStatus::LoggedIn);

    app.households.get_households().await.unwrap();
    assert_eq!(app.cache.len(), 1);

    // the token prefetched at login is reused by every service
    app.members.remove_member("h1", "u2").await.unwrap();
    assert_eq!(mock.count(&Method::GET, "/auth/csrf-token"), 1);
    let call = mock.last(&Method::DELETE, "/households/h1/members/u2").unwrap();
    assert_eq!(call.header("X-CSRF-Token"), Some("t1"));
}

#[tokio::test]
async fn configured_window_applies_to_services() {
    let mock = MockTransport::new();
    mock.reply(Method::GET, "/households/h1/invitations", 200, json!({ "data": [] }));
    let mut config = ClientConfig::default().with_base_url(BASE_URL).unwrap();
    config.household_stale_secs = 0;
    let app = App::with_transport(config, mock.clone());

    app.invitations.get_invitations("h1").await.unwrap();
    app.invitations.get_invitations("h1").await.unwrap();
    assert_eq!(mock.count(&Method::GET, "/households/h1/invitations"), 2);
}
