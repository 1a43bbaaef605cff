//! Identity upsert and account deletion.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, REASON};
use rankx_common::{AppError, IdentityConfig};
use rankx_core::ExternalIdentity;
use rankx_db::entities::{Membership, membership};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn identity(external_id: &str, handle: &str, followers_count: i32) -> ExternalIdentity {
    ExternalIdentity {
        external_id: external_id.to_string(),
        handle: handle.to_string(),
        display_name: format!("{handle} display"),
        avatar_url: Some(format!("https://cdn.example.com/{handle}.png")),
        bio: None,
        followers_count,
    }
}

#[tokio::test]
async fn test_upsert_creates_then_refreshes() {
    let h = Harness::new().await;

    let created = h
        .users
        .upsert_from_identity(identity("ext-1", "alice", 10))
        .await
        .unwrap();
    assert_eq!(created.handle, "alice");
    assert_eq!(created.followers_count, 10);
    assert!(created.last_login_at.is_some());
    assert!(!created.is_admin);

    let refreshed = h
        .users
        .upsert_from_identity(identity("ext-1", "alice", 900))
        .await
        .unwrap();
    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.followers_count, 900);
}

#[tokio::test]
async fn test_upsert_deduplicates_handles() {
    let h = Harness::new().await;

    let first = h
        .users
        .upsert_from_identity(identity("ext-1", "alice", 0))
        .await
        .unwrap();
    let second = h
        .users
        .upsert_from_identity(identity("ext-2", "alice", 0))
        .await
        .unwrap();

    assert_eq!(first.handle, "alice");
    assert_ne!(second.handle, "alice");
    assert!(second.handle.starts_with("alice_"));
}

#[tokio::test]
async fn test_upsert_grants_admin_by_handle() {
    let h = Harness::with_identity(IdentityConfig {
        admin_handles: vec!["Founder".to_string()],
    })
    .await;

    let founder = h
        .users
        .upsert_from_identity(identity("ext-1", "founder", 0))
        .await
        .unwrap();
    assert!(founder.is_admin);
}

#[tokio::test]
async fn test_delete_user_cascades() {
    let h = Harness::new().await;
    let x = h.category("x").await;
    let y = h.category("y").await;
    let admin = h.admin("root").await;
    let doomed = h.user("doomed").await;
    let friend = h.user("friend").await;
    let other = h.user("other").await;

    h.join(&doomed, &x).await;
    h.join(&friend, &x).await;
    h.join(&other, &y).await;
    h.votes_for(&doomed, &x, 3).await;
    h.voting.cast_vote(&doomed.id, &x.id, &friend.id).await.unwrap();
    h.voting.cast_vote(&doomed.id, &y.id, &other.id).await.unwrap();
    h.voting.cast_vote(&friend.id, &y.id, &other.id).await.unwrap();

    let deleted = h.users.delete_user(&admin.id, &doomed.id).await.unwrap();
    assert_eq!(deleted.forfeited.len(), 1);
    assert_eq!(deleted.forfeited[0].votes_lost, 3);
    assert_eq!(deleted.votes_withdrawn, 1);
    assert_eq!(deleted.affected_categories, vec![x.id.clone(), y.id.clone()]);

    assert!(h.reload_user(&doomed.id).await.is_none());
    let memberships = Membership::find()
        .filter(membership::Column::UserId.eq(&doomed.id))
        .count(h.conn())
        .await
        .unwrap();
    assert_eq!(memberships, 0);

    let x_after = h.reload_category(&x.id).await;
    assert_eq!(x_after.member_count, 1);
    assert_eq!(x_after.total_votes, 0);
    assert_eq!(h.member(&friend.id, &x.id).await.unwrap().vote_count, 0);
    assert_eq!(h.member(&friend.id, &x.id).await.unwrap().current_rank, Some(1));

    let y_after = h.reload_category(&y.id).await;
    assert_eq!(y_after.total_votes, 1);
    assert_eq!(h.member(&other.id, &y.id).await.unwrap().vote_count, 1);

    h.assert_invariants().await;
}

#[tokio::test]
async fn test_delete_pending_applicant() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let admin = h.admin("root").await;
    let applicant = h.user("applicant").await;
    h.membership.apply(&applicant.id, "rust", REASON).await.unwrap();

    let deleted = h.users.delete_user(&admin.id, &applicant.id).await.unwrap();
    assert!(!deleted.forfeited[0].was_approved);
    assert_eq!(h.reload_category(&cat.id).await.member_count, 0);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_delete_guards() {
    let h = Harness::new().await;
    let admin = h.admin("root").await;
    let other_admin = h.admin("other").await;
    let user = h.user("alice").await;

    assert!(matches!(
        h.users.delete_user(&admin.id, &admin.id).await,
        Err(AppError::SelfDeletion)
    ));
    assert!(matches!(
        h.users.delete_user(&admin.id, &other_admin.id).await,
        Err(AppError::AdminProtected)
    ));
    assert!(matches!(
        h.users.delete_user(&user.id, &other_admin.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        h.users.delete_user(&admin.id, "u-missing").await,
        Err(AppError::UserNotFound(_))
    ));
}

#[tokio::test]
async fn test_admin_user_list() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let alice = h.user("alice").await;
    h.user("bob").await;
    h.join(&alice, &cat).await;

    let rows = h.users.list_users(10, 0).await.unwrap();
    assert_eq!(rows.len(), 2);

    let alice_row = rows.iter().find(|r| r.user.id == alice.id).unwrap();
    assert_eq!(alice_row.category.as_ref().unwrap().slug, "rust");
    assert_eq!(alice_row.current_rank, Some(1));

    let bob_row = rows.iter().find(|r| r.user.handle == "bob").unwrap();
    assert!(bob_row.category.is_none());
}
