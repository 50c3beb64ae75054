use super::*;
use crate::net::Method;
use crate::test_helpers::{MockTransport, api_client, envelope, household, query_cache};
use serde_json::json;

fn invitation(id: &str) -> Invitation {
    Invitation {
        id: id.into(),
        household_id: "h1".into(),
        code: format!("CODE-{id}"),
        email: Some("friend@b.com".into()),
        role: Role::Member,
        expires_at: None,
        created_at: None,
    }
}

fn service(mock: &Arc<MockTransport>) -> (InvitationService, Arc<QueryCache>) {
    let cache = query_cache();
    (InvitationService::new(api_client(mock), cache.clone(), Duration::from_secs(600)), cache)
}

#[tokio::test]
async fn created_invitation_is_appended() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::GET, "/households/h1/invitations", 200, envelope(&Vec::<Invitation>::new()));
    mock.reply(Method::POST, "/households/h1/invitations", 201, envelope(&invitation("i1")));
    let (svc, _) = service(&mock);

    svc.get_invitations("h1").await.unwrap();
    svc.create_invitation("h1", Some("friend@b.com"), Role::Member)
        .await
        .unwrap();

    let list = svc.get_invitations("h1").await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(mock.count(&Method::GET, "/households/h1/invitations"), 1);
    let body = mock.last(&Method::POST, "/households/h1/invitations").unwrap().body;
    assert_eq!(body, Some(json!({ "email": "friend@b.com", "role": "member" })));
}

#[tokio::test]
async fn revoke_removes_from_list() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply_raw(Method::DELETE, "/households/h1/invitations/i1", 204, "");
    let (svc, cache) = service(&mock);
    cache.set_query_data(&keys::household_invitations("h1"), vec![invitation("i1"), invitation("i2")]);

    svc.revoke_invitation("h1", "i1").await.unwrap();

    let list = cache.get_query_data(&keys::household_invitations("h1")).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "i2");
}

#[tokio::test]
async fn redeem_invalidates_instead_of_patching() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/invitations/redeem", 200, envelope(&household("h2", "Shared", Role::Member)));
    mock.reply(Method::GET, "/households/h1/invitations", 200, envelope(&vec![invitation("i2")]));
    let (svc, cache) = service(&mock);
    cache.set_query_data(&keys::households(), vec![household("h1", "Home", Role::Owner)]);
    cache.set_query_data(&keys::household_invitations("h1"), vec![invitation("i1"), invitation("i2")]);

    let joined = svc.redeem_invitation(" CODE-i1 ").await.unwrap().unwrap();
    assert_eq!(joined.id, "h2");

    let fresh = Duration::from_secs(600);
    assert!(cache.is_stale(keys::households().key(), fresh));
    assert!(cache.is_stale(keys::household_invitations("h1").key(), fresh));
    // untouched until the refetch happens
    assert_eq!(cache.get_query_data(&keys::households()).unwrap().len(), 1);

    svc.get_invitations("h1").await.unwrap();
    assert_eq!(mock.count(&Method::GET, "/households/h1/invitations"), 1);
    let body = mock.last(&Method::POST, "/invitations/redeem").unwrap().body;
    assert_eq!(body, Some(json!({ "code": "CODE-i1" })));
}

#[tokio::test]
async fn failed_redeem_leaves_cache_fresh() {
    let mock = MockTransport::new();
    mock.csrf("t1");
    mock.reply(Method::POST, "/invitations/redeem", 410, json!({ "error": "invitation expired" }));
    let (svc, cache) = service(&mock);
    cache.set_query_data(&keys::households(), Vec::new());

    let err = svc.redeem_invitation("OLD").await.unwrap_err();
    assert_eq!(err.status_code, 410);
    assert!(!cache.is_stale(keys::households().key(), Duration::from_secs(600)));
}
