use keystone_accounts::domain::filter::{SortSpec, UserSearchFilter};
use keystone_accounts::domain::types::UserChanges;
use keystone_accounts::usecase::account::ChangePasswordInput;
use keystone_domain::pagination::PageRequest;
use keystone_domain::user::UserStatus;

use crate::helpers::{create_input, test_service};

#[tokio::test]
async fn should_serve_repeated_reads_from_cache() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    svc.get_by_id(alice.id).await.unwrap();
    svc.get_by_id(alice.id).await.unwrap();
    svc.get_by_id(alice.id).await.unwrap();

    assert_eq!(svc.users.reads(), 1, "only the first read should reach the store");
    assert_eq!(svc.cache.hits(), 2);
}

#[tokio::test]
async fn should_not_serve_stale_status_after_lock() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let cached = svc.get_by_id(alice.id).await.unwrap();
    assert_eq!(cached.status, UserStatus::Active);

    svc.lock(alice.id).await.unwrap();

    let fresh = svc.get_by_id(alice.id).await.unwrap();
    assert_eq!(fresh.status, UserStatus::Locked);
    assert!(fresh.account_locked);
}

#[tokio::test]
async fn should_evict_on_every_mutating_operation() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    let id = alice.id;

    svc.update(
        id,
        UserChanges {
            bio: Some("hi".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    svc.change_password(
        id,
        ChangePasswordInput {
            current_password: "s3cret-pass".into(),
            new_password: "n3w".into(),
            confirm_password: "n3w".into(),
        },
    )
    .await
    .unwrap();
    svc.lock(id).await.unwrap();
    svc.unlock(id).await.unwrap();
    svc.verify_email(id).await.unwrap();
    svc.add_role_to_user(id, "ADMIN").await.unwrap();
    svc.remove_role_from_user(id, "ADMIN").await.unwrap();
    svc.record_failed_login(id).await.unwrap();
    svc.reset_failed_logins(id).await.unwrap();
    svc.delete(id).await.unwrap();

    assert_eq!(svc.cache.evictions(), 10);
    assert!(svc.cache.inner.is_empty());
}

#[tokio::test]
async fn should_evict_even_when_mutation_fails() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    svc.get_by_id(alice.id).await.unwrap();
    assert_eq!(svc.cache.inner.len(), 1);

    let result = svc
        .change_password(
            alice.id,
            ChangePasswordInput {
                current_password: "wrong".into(),
                new_password: "n3w".into(),
                confirm_password: "n3w".into(),
            },
        )
        .await;

    assert!(result.is_err());
    assert_eq!(svc.cache.evictions(), 1);
    assert!(svc.cache.inner.is_empty());
}

#[tokio::test]
async fn should_reflect_role_changes_in_next_cached_read() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    assert!(svc.get_by_id(alice.id).await.unwrap().roles.is_empty());

    svc.add_role_to_user(alice.id, "USER").await.unwrap();

    let view = svc.get_by_id(alice.id).await.unwrap();
    assert!(view.roles.contains("USER"));
    assert!(view.permissions.contains("USER_READ"));
}

#[tokio::test]
async fn should_not_cache_lookups_by_name_or_listing() {
    let svc = test_service();
    svc.create(create_input("alice", "a@x.com")).await.unwrap();

    svc.get_by_username("alice").await.unwrap();
    svc.get_by_email("a@x.com").await.unwrap();
    svc.list(PageRequest::default(), SortSpec::default())
        .await
        .unwrap();
    svc.search(
        &UserSearchFilter::default(),
        PageRequest::default(),
        SortSpec::default(),
    )
    .await
    .unwrap();

    assert!(svc.cache.inner.is_empty());
}
