/// Refresh token rotation and revocation against a live database

mod common;

use chrono::Duration;
use saasgate_shared::auth::session::{TokenError, TokenService, TokenSettings};

fn tokens(rotate: bool) -> TokenService {
    TokenService::new(TokenSettings {
        secret: "integration-test-secret-at-least-32-bytes".to_string(),
        access_lifetime: Duration::minutes(5),
        refresh_lifetime: Duration::days(1),
        rotate_refresh_tokens: rotate,
    })
}

#[tokio::test]
async fn test_concurrent_refresh_succeeds_once() {
    let Some(pool) = common::test_pool().await else { return };
    let tokens = tokens(true);
    let user = common::create_user(&pool, "basic").await;
    let refresh = tokens.issue_refresh_token(user.id).unwrap();

    let (a, b) = tokio::join!(
        tokens.verify_and_consume_refresh_token(&pool, &refresh.token),
        tokens.verify_and_consume_refresh_token(&pool, &refresh.token),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    assert!(matches!(a.err().or(b.err()), Some(TokenError::Blacklisted)));
}

#[tokio::test]
async fn test_rotated_refresh_token_differs() {
    let Some(pool) = common::test_pool().await else { return };
    let tokens = tokens(true);
    let user = common::create_user(&pool, "basic").await;
    let refresh = tokens.issue_refresh_token(user.id).unwrap();

    let pair = tokens.verify_and_consume_refresh_token(&pool, &refresh.token).await.unwrap();
    assert_ne!(pair.refresh.token, refresh.token);
    assert!(tokens.verify_and_consume_refresh_token(&pool, &pair.refresh.token).await.is_ok());
}

#[tokio::test]
async fn test_without_rotation_token_is_reusable_until_revoked() {
    let Some(pool) = common::test_pool().await else { return };
    let tokens = tokens(false);
    let user = common::create_user(&pool, "basic").await;
    let refresh = tokens.issue_refresh_token(user.id).unwrap();

    let pair = tokens.verify_and_consume_refresh_token(&pool, &refresh.token).await.unwrap();
    assert_eq!(pair.refresh.token, refresh.token);
    assert!(tokens.verify_and_consume_refresh_token(&pool, &refresh.token).await.is_ok());

    tokens.blacklist_refresh_token(&pool, &refresh.token).await.unwrap();
    assert!(matches!(
        tokens.verify_and_consume_refresh_token(&pool, &refresh.token).await,
        Err(TokenError::Blacklisted)
    ));
}
