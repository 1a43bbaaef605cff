//! Counter reconciliation and badge evaluation.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use rankx_common::BadgeConfig;
use rankx_core::{BadgeService, CounterDrift, CounterKind, CounterSynchronizer, DEFAULT_BADGES};
use rankx_db::entities::{Badge, Category, Membership, badge, category, membership};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};

#[tokio::test]
async fn test_reconcile_repairs_drift() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.join(&alice, &cat).await;
    h.join(&bob, &cat).await;
    h.votes_for(&alice, &cat, 2).await;

    // Corrupt counters behind the synchronizer's back
    Membership::update_many()
        .col_expr(membership::Column::VoteCount, Expr::value(0))
        .filter(membership::Column::UserId.eq(&alice.id))
        .exec(h.conn())
        .await
        .unwrap();
    Membership::update_many()
        .col_expr(membership::Column::VoteCount, Expr::value(5))
        .filter(membership::Column::UserId.eq(&bob.id))
        .exec(h.conn())
        .await
        .unwrap();
    Category::update_many()
        .col_expr(category::Column::TotalVotes, Expr::value(40))
        .col_expr(category::Column::MemberCount, Expr::value(7))
        .filter(category::Column::Id.eq(&cat.id))
        .exec(h.conn())
        .await
        .unwrap();

    let audit = h.reconcile.audit_counters().await.unwrap();
    assert!(!audit.is_clean());
    assert!(
        audit
            .drifts
            .iter()
            .any(|d| d.kind == CounterKind::CategoryMemberCount && d.actual == 2)
    );
    assert_eq!(audit.categories_to_rerank().len(), 1);

    let report = h.reconcile.reconcile_counters().await.unwrap();
    assert_eq!(report.drifts.len(), 4);
    h.assert_invariants().await;

    assert_eq!(h.member(&alice.id, &cat.id).await.unwrap().current_rank, Some(1));
    assert_eq!(h.member(&bob.id, &cat.id).await.unwrap().current_rank, Some(2));

    let again = h.reconcile.reconcile_counters().await.unwrap();
    assert!(again.is_clean());
}

#[tokio::test]
async fn test_correction_leaves_counter_that_moved_since_audit() {
    let h = Harness::new().await;
    let cat = h.category("rust").await;
    let alice = h.user("alice").await;
    h.join(&alice, &cat).await;
    h.votes_for(&alice, &cat, 2).await;
    let member = h.member(&alice.id, &cat.id).await.unwrap();

    // The audit saw 3, but a live vote has since moved the counter to 2
    let stale = CounterDrift {
        kind: CounterKind::MembershipVoteCount,
        id: member.id.clone(),
        category_id: Some(cat.id.clone()),
        stored: 3,
        actual: 1,
    };
    assert!(!CounterSynchronizer.correct(h.conn(), &stale).await.unwrap());
    assert_eq!(h.member(&alice.id, &cat.id).await.unwrap().vote_count, 2);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_badge_seed_and_award_are_idempotent() {
    let h = Harness::new().await;
    let badges = BadgeService::new(h.db.clone(), BadgeConfig::default());

    assert_eq!(badges.seed_default_badges().await.unwrap(), DEFAULT_BADGES.len());
    assert_eq!(badges.seed_default_badges().await.unwrap(), 0);

    let alice = h.user("alice").await;
    assert!(badges.award(&alice.id, "first-vote").await.unwrap());
    assert!(!badges.award(&alice.id, "first-vote").await.unwrap());
    assert!(!badges.award(&alice.id, "no-such-badge").await.unwrap());

    let first_vote = Badge::find()
        .filter(badge::Column::Slug.eq("first-vote"))
        .one(h.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_vote.awarded_count, 1);
}

#[tokio::test]
async fn test_check_all_awards_earned_badges() {
    let h = Harness::new().await;
    let badges = BadgeService::new(h.db.clone(), BadgeConfig::default());
    badges.seed_default_badges().await.unwrap();

    let cat = h.category("rust").await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.join(&alice, &cat).await;
    h.voting.cast_vote(&bob.id, &cat.id, &alice.id).await.unwrap();

    let awarded = badges.check_all(&alice.id, Some(&cat.id)).await.unwrap();
    for slug in [
        "first-supporter",
        "applicant",
        "approved",
        "new-member",
        "first-blood",
        "category-king",
        "gold-medalist",
        "on-the-board",
    ] {
        assert!(awarded.iter().any(|s| s == slug), "{slug} not awarded");
    }

    let voter_badges = badges.check_all(&bob.id, None).await.unwrap();
    assert!(voter_badges.iter().any(|s| s == "first-vote"));

    assert!(badges.check_all(&alice.id, Some(&cat.id)).await.unwrap().is_empty());
    assert!(badges.check_all("u-missing", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_badge_catalog_holdings_and_leaderboard() {
    let h = Harness::new().await;
    let badges = BadgeService::new(h.db.clone(), BadgeConfig::default());
    badges.seed_default_badges().await.unwrap();

    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    h.user("carol").await;
    assert!(badges.award(&alice.id, "first-vote").await.unwrap());
    assert!(badges.award(&alice.id, "applicant").await.unwrap());
    assert!(badges.award(&bob.id, "first-vote").await.unwrap());

    let catalog = badges.catalog(Some(&alice.id)).await.unwrap();
    assert_eq!(catalog.len(), DEFAULT_BADGES.len());
    let earned: Vec<&str> = catalog
        .iter()
        .filter(|c| c.earned)
        .map(|c| c.badge.slug.as_str())
        .collect();
    assert_eq!(earned.len(), 2);
    assert!(earned.contains(&"first-vote") && earned.contains(&"applicant"));
    assert!(catalog.iter().all(|c| c.earned == c.earned_at.is_some()));

    let anonymous = badges.catalog(None).await.unwrap();
    assert!(anonymous.iter().all(|c| !c.earned));

    let held = badges.user_badges(&alice.id).await.unwrap();
    assert_eq!(held.len(), 2);
    assert!(held[0].earned_at >= held[1].earned_at);

    let leaders = badges.badge_leaderboard().await.unwrap();
    assert_eq!(leaders.len(), 2);
    assert_eq!(leaders[0].user.handle, "alice");
    assert_eq!(leaders[0].badge_count, 2);
    assert_eq!(leaders[1].user.handle, "bob");
    assert_eq!(leaders[1].badge_count, 1);
}
