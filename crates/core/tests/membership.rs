//! Membership lifecycle against a real schema.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::{Harness, REASON};
use rankx_common::{AppError, ErrorCategory, MembershipConfig};
use rankx_core::{ApplyOutcome, FollowerThresholdPolicy, MembershipService};
use rankx_db::entities::{Category, category, membership::MembershipStatus};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};

#[tokio::test]
async fn test_apply_creates_pending_application() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let alice = h.user("alice").await;

    let outcome = h.membership.apply(&alice.id, "rust", REASON).await.unwrap();
    let ApplyOutcome::Applied(application) = outcome else {
        panic!("expected an application");
    };

    assert!(!application.auto_approved);
    assert_eq!(application.membership.status, MembershipStatus::Pending);
    assert_eq!(application.membership.application_reason, REASON);
    assert_eq!(h.reload_category(&cat.id).await.member_count, 0);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_follower_threshold_auto_approves() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let famous = h.create_user("famous", 500, false).await;
    let modest = h.create_user("modest", 499, false).await;

    let service = MembershipService::with_policy(
        h.db.clone(),
        h.ranking.clone(),
        MembershipConfig::default(),
        Arc::new(FollowerThresholdPolicy::new(500)),
    );

    let ApplyOutcome::Applied(famous_app) = service.apply(&famous.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };
    let ApplyOutcome::Applied(modest_app) = service.apply(&modest.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };

    assert!(famous_app.auto_approved);
    assert!(!modest_app.auto_approved);

    let member = h.member(&famous.id, &cat.id).await.unwrap();
    assert_eq!(member.status, MembershipStatus::Approved);
    assert_eq!(member.vote_count, 0);
    assert_eq!(member.current_rank, Some(1));
    assert_eq!(member.previous_rank, None);
    assert_eq!(h.reload_category(&cat.id).await.member_count, 1);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_reason_length_is_validated() {
    let h = Harness::new().await;
    h.category("rust").await;
    let alice = h.user("alice").await;

    for reason in ["too short".to_string(), "x".repeat(201)] {
        let err = h.membership.apply(&alice.id, "rust", &reason).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
    assert!(h.membership.apply(&alice.id, "rust", &"x".repeat(200)).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_application() {
    let h = Harness::new().await;
    h.category("rust").await;
    let alice = h.user("alice").await;

    h.membership.apply(&alice.id, "rust", REASON).await.unwrap();
    let result = h.membership.apply(&alice.id, "rust", REASON).await;
    assert!(matches!(result, Err(AppError::DuplicateApplication(_))));
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_apply_elsewhere_requires_confirmation() {
    let h = Harness::new().await;
    let rust = h.category("rust").await;
    h.category("go").await;
    let alice = h.user("alice").await;
    h.join(&alice, &rust).await;
    h.votes_for(&alice, &rust, 3).await;

    let outcome = h.membership.apply(&alice.id, "go", REASON).await.unwrap();
    let ApplyOutcome::ConfirmationRequired(current) = outcome else {
        panic!("expected a confirmation request");
    };
    assert_eq!(current.category.slug, "rust");
    assert_eq!(current.vote_count, 3);
    assert_eq!(current.current_rank, Some(1));

    // Nothing changed
    assert_eq!(h.member(&alice.id, &rust.id).await.unwrap().vote_count, 3);
    assert_eq!(h.votes_in(&rust.id).await.len(), 3);

    let err = h
        .membership
        .confirm_switch(&alice.id, "go", REASON, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConfirmationRequired));
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_category_switch_forfeits_votes() {
    let h = Harness::new().await;
    let x = h.category("x").await;
    let y = h.category("y").await;
    let switcher = h.user("switcher").await;
    let rival = h.user("rival").await;
    h.join(&switcher, &x).await;
    h.join(&rival, &x).await;
    h.votes_for(&switcher, &x, 12).await;
    h.votes_for(&rival, &x, 2).await;
    h.voting.cast_vote(&switcher.id, &x.id, &rival.id).await.unwrap();

    let before = h.reload_category(&x.id).await;
    assert_eq!(before.total_votes, 15);
    assert_eq!(before.member_count, 2);

    let outcome = h
        .membership
        .confirm_switch(&switcher.id, "y", REASON, true)
        .await
        .unwrap();

    assert_eq!(outcome.votes_lost, 12);
    assert_eq!(outcome.forfeited.len(), 1);
    assert_eq!(outcome.forfeited[0].withdrawn_vote_for.as_deref(), Some(rival.id.as_str()));

    let after = h.reload_category(&x.id).await;
    assert_eq!(after.total_votes, before.total_votes - 13);
    assert_eq!(after.member_count, 1);
    assert!(h.member(&switcher.id, &x.id).await.is_none());
    assert!(h
        .votes_in(&x.id)
        .await
        .iter()
        .all(|v| v.voted_for_id != switcher.id && v.voter_id != switcher.id));

    let rival_member = h.member(&rival.id, &x.id).await.unwrap();
    assert_eq!(rival_member.vote_count, 2);
    assert_eq!(rival_member.current_rank, Some(1));

    let new_member = h.member(&switcher.id, &y.id).await.unwrap();
    assert_eq!(new_member.status, MembershipStatus::Pending);
    assert_eq!(new_member.vote_count, 0);
    assert_eq!(new_member.current_rank, None);
    assert_eq!(new_member.previous_rank, None);
    assert_eq!(new_member.rank_change, 0);

    assert_eq!(h.reload_user(&switcher.id).await.unwrap().total_votes_received, 0);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_switch_back_after_forfeit_starts_from_zero() {
    let h = Harness::new().await;
    let x = h.category("x").await;
    h.category("y").await;
    let alice = h.user("alice").await;
    h.join(&alice, &x).await;
    h.votes_for(&alice, &x, 4).await;

    h.auto_membership
        .confirm_switch(&alice.id, "y", REASON, true)
        .await
        .unwrap();
    let back = h
        .auto_membership
        .confirm_switch(&alice.id, "x", REASON, true)
        .await
        .unwrap();

    assert_eq!(back.votes_lost, 0);
    let member = h.member(&alice.id, &x.id).await.unwrap();
    assert_eq!(member.vote_count, 0);
    assert_eq!(member.current_rank, Some(1));
    assert_eq!(member.previous_rank, None);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_approve_and_reject() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let admin = h.admin("root").await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;

    let ApplyOutcome::Applied(alice_app) = h.membership.apply(&alice.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };
    let ApplyOutcome::Applied(bob_app) = h.membership.apply(&bob.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };

    let approved = h
        .membership
        .approve(&admin.id, &alice_app.membership.id)
        .await
        .unwrap();
    assert_eq!(approved.status, MembershipStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some(admin.id.as_str()));
    assert!(approved.approved_at.is_some());
    assert_eq!(h.member(&alice.id, &cat.id).await.unwrap().current_rank, Some(1));

    let rejected = h
        .membership
        .reject(&admin.id, &bob_app.membership.id)
        .await
        .unwrap();
    assert_eq!(rejected.status, MembershipStatus::Rejected);
    assert_eq!(h.reload_category(&cat.id).await.member_count, 1);

    for result in [
        h.membership.approve(&admin.id, &alice_app.membership.id).await,
        h.membership.reject(&admin.id, &bob_app.membership.id).await,
        h.membership.approve(&admin.id, &bob_app.membership.id).await,
    ] {
        assert!(matches!(result, Err(AppError::NotPending(_))));
    }

    let rejected = h
        .membership
        .list_applications(MembershipStatus::Rejected, 10, 0)
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].user.id, bob.id);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_review_permissions() {
    let h = Harness::new().await;
    h.category("rust").await;
    let admin = h.admin("root").await;
    let alice = h.user("alice").await;

    let ApplyOutcome::Applied(own) = h.membership.apply(&admin.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };
    let result = h.membership.approve(&admin.id, &own.membership.id).await;
    assert!(matches!(result, Err(AppError::SelfApproval)));
    let result = h.membership.reject(&admin.id, &own.membership.id).await;
    assert!(matches!(result, Err(AppError::SelfApproval)));

    let err = h
        .membership
        .approve(&alice.id, &own.membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Forbidden);

    let err = h.membership.approve(&admin.id, "m-missing").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[tokio::test]
async fn test_reapply_after_rejection_reuses_row() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let admin = h.admin("root").await;
    let alice = h.user("alice").await;

    let ApplyOutcome::Applied(first) = h.membership.apply(&alice.id, "rust", REASON).await.unwrap()
    else {
        panic!("expected an application");
    };
    h.membership
        .reject(&admin.id, &first.membership.id)
        .await
        .unwrap();

    let ApplyOutcome::Applied(second) = h
        .auto_membership
        .apply(&alice.id, "rust", "Second try, with a longer reason this time")
        .await
        .unwrap()
    else {
        panic!("expected an application");
    };

    assert_eq!(second.membership.id, first.membership.id);
    assert_eq!(second.membership.status, MembershipStatus::Approved);
    assert_eq!(second.membership.vote_count, 0);
    assert_eq!(h.reload_category(&cat.id).await.member_count, 1);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_apply_reactivates_inactive_category() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let alice = h.user("alice").await;

    Category::update_many()
        .col_expr(category::Column::IsActive, Expr::value(false))
        .filter(category::Column::Id.eq(&cat.id))
        .exec(h.conn())
        .await
        .unwrap();

    h.membership.apply(&alice.id, "rust", REASON).await.unwrap();
    assert!(h.reload_category(&cat.id).await.is_active);
}
