/// Integration tests for apps, collaborators and the admin user list

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_json, TestContext};
use saasgate_shared::models::app_user::{AppRole, AppUser};
use saasgate_shared::models::user::User;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_app(ctx: &TestContext, token: &str, name: &str) -> (StatusCode, Value) {
    let response = ctx
        .post_json("/api/apps", json!({ "name": name }), Some(token))
        .await;
    let status = response.status();
    (status, body_json(response).await)
}

async fn patch_json(ctx: &TestContext, uri: &str, body: Value, token: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = ctx.send(request).await;
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_apps_require_authentication() {
    let Some(ctx) = TestContext::new().await else { return };

    let request = Request::builder()
        .uri("/api/apps")
        .body(Body::empty())
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_app_makes_creator_owner() {
    let Some(ctx) = TestContext::new().await else { return };
    let (user_id, token, _) = ctx.signed_in_user().await;

    let (status, app) = create_app(&ctx, &token, "Dashboard").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app["role"], "owner");
    assert_eq!(app["description"], "");

    let app_id: Uuid = app["id"].as_str().unwrap().parse().unwrap();
    let membership = AppUser::find(&ctx.db, app_id, user_id).await.unwrap().unwrap();
    assert_eq!(membership.role, AppRole::Owner);

    let list = body_json(ctx.get("/api/apps", &token).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Dashboard");
}

#[tokio::test]
async fn test_duplicate_app_name_is_field_error() {
    let Some(ctx) = TestContext::new().await else { return };
    let (_, token, _) = ctx.signed_in_user().await;

    create_app(&ctx, &token, "Dashboard").await;
    let (status, body) = create_app(&ctx, &token, "Dashboard").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "name");
}

#[tokio::test]
async fn test_app_limit_for_default_tier() {
    let Some(ctx) = TestContext::new().await else { return };
    let (_, token, _) = ctx.signed_in_user().await;

    for i in 0..3 {
        let (status, _) = create_app(&ctx, &token, &format!("App {}", i)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = create_app(&ctx, &token, "App 3").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "APP_LIMIT_REACHED");
    assert_eq!(body["limit"], 3);
    assert_eq!(body["tier"], "basic");
}

#[tokio::test]
async fn test_non_member_sees_not_found() {
    let Some(ctx) = TestContext::new().await else { return };
    let (_, owner_token, _) = ctx.signed_in_user().await;
    let (_, stranger_token, _) = ctx.signed_in_user().await;

    let (_, app) = create_app(&ctx, &owner_token, "Private").await;
    let uri = format!("/api/apps/{}", app["id"].as_str().unwrap());

    let response = ctx.get(&uri, &stranger_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx.delete(&uri, &stranger_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_roles_gate_update_and_delete() {
    let Some(ctx) = TestContext::new().await else { return };
    let (_, owner_token, _) = ctx.signed_in_user().await;
    let (_, editor_token, editor_email) = ctx.signed_in_user().await;
    let (_, viewer_token, viewer_email) = ctx.signed_in_user().await;

    let (_, app) = create_app(&ctx, &owner_token, "Shared").await;
    let app_id = app["id"].as_str().unwrap();
    let collaborators = format!("/api/apps/{}/collaborators", app_id);
    let uri = format!("/api/apps/{}", app_id);

    for (email, role) in [(&editor_email, "editor"), (&viewer_email, "viewer")] {
        let response = ctx
            .post_json(
                &collaborators,
                json!({ "email": email, "role": role }),
                Some(&owner_token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Viewer can read but not update
    let viewed = body_json(ctx.get(&uri, &viewer_token).await).await;
    assert_eq!(viewed["role"], "viewer");
    let (status, _) = patch_json(&ctx, &uri, json!({ "name": "Renamed" }), &viewer_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Editor can update but not delete or manage collaborators
    let (status, updated) =
        patch_json(&ctx, &uri, json!({ "description": "Edited" }), &editor_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Shared");
    assert_eq!(updated["description"], "Edited");
    assert_eq!(updated["role"], "editor");

    assert_eq!(ctx.delete(&uri, &editor_token).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        ctx.get(&collaborators, &editor_token).await.status(),
        StatusCode::FORBIDDEN
    );

    // Owner can delete
    assert_eq!(ctx.delete(&uri, &owner_token).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(ctx.get(&uri, &owner_token).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_collaborator_management() {
    let Some(ctx) = TestContext::new().await else { return };
    let (owner_id, owner_token, _) = ctx.signed_in_user().await;
    let (member_id, _, member_email) = ctx.signed_in_user().await;

    let (_, app) = create_app(&ctx, &owner_token, "Team").await;
    let collaborators = format!("/api/apps/{}/collaborators", app["id"].as_str().unwrap());

    // Unknown email
    let response = ctx
        .post_json(
            &collaborators,
            json!({ "email": "nobody-here@example.com" }),
            Some(&owner_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "User not found.");

    // A second owner is rejected
    let response = ctx
        .post_json(
            &collaborators,
            json!({ "email": member_email, "role": "owner" }),
            Some(&owner_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Default role is viewer
    let response = ctx
        .post_json(&collaborators, json!({ "email": member_email }), Some(&owner_token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let added = body_json(response).await;
    assert_eq!(added["role"], "viewer");
    assert_eq!(added["email"], member_email.as_str());

    // Adding twice
    let response = ctx
        .post_json(&collaborators, json!({ "email": member_email }), Some(&owner_token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "User already a collaborator."
    );

    let list = body_json(ctx.get(&collaborators, &owner_token).await).await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    // The owner membership cannot be removed
    let response = ctx
        .delete(&format!("{}/{}", collaborators, owner_id), &owner_token)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Cannot remove owner.");

    // Removing the member removes exactly that membership
    let response = ctx
        .delete(&format!("{}/{}", collaborators, member_id), &owner_token)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let list = body_json(ctx.get(&collaborators, &owner_token).await).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["role"], "owner");

    // Removing again
    let response = ctx
        .delete(&format!("{}/{}", collaborators, member_id), &owner_token)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_requires_staff() {
    let Some(ctx) = TestContext::new().await else { return };
    let (_, token, _) = ctx.signed_in_user().await;

    let response = ctx.get("/api/admin/users", &token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_and_filters_users() {
    let Some(ctx) = TestContext::new().await else { return };
    let (staff_id, staff_token, _) = ctx.signed_in_user().await;
    ctx.make_staff(staff_id).await;

    let (target_id, target_token, target_email) = ctx.signed_in_user().await;
    create_app(&ctx, &target_token, "Owned").await;

    let response = ctx
        .get(&format!("/api/admin/users?email={}", target_email), &staff_token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let users = body_json(response).await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], target_id.to_string());
    assert_eq!(users[0]["owned_app_count"], 1);
    assert!(users[0]["subscription_status"].is_null());

    // Disable, then filter on the flag
    let (status, updated) = patch_json(
        &ctx,
        &format!("/api/admin/users/{}", target_id),
        json!({ "is_disabled_by_admin": true }),
        &staff_token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_disabled_by_admin"], true);
    assert_eq!(updated["user_type"], "basic");

    let response = ctx
        .get(
            &format!(
                "/api/admin/users?email={}&is_disabled_by_admin=true",
                target_email
            ),
            &staff_token,
        )
        .await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = ctx
        .get(
            &format!(
                "/api/admin/users?email={}&is_disabled_by_admin=false",
                target_email
            ),
            &staff_token,
        )
        .await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let user = User::find_by_id(&ctx.db, target_id).await.unwrap().unwrap();
    assert!(user.is_disabled_by_admin);
}

#[tokio::test]
async fn test_admin_get_missing_user() {
    let Some(ctx) = TestContext::new().await else { return };
    let (staff_id, staff_token, _) = ctx.signed_in_user().await;
    ctx.make_staff(staff_id).await;

    let response = ctx
        .get(&format!("/api/admin/users/{}", Uuid::new_v4()), &staff_token)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
