use std::collections::BTreeSet;

use keystone_accounts::domain::types::UserChanges;
use keystone_accounts::error::{AccountsError, ErrorCategory};
use keystone_accounts::usecase::account::{ChangePasswordInput, CreateUserInput};
use keystone_domain::id::UserId;
use keystone_domain::user::UserStatus;

use crate::helpers::{create_input, test_service};

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn password_change(current: &str, new: &str, confirm: &str) -> ChangePasswordInput {
    ChangePasswordInput {
        current_password: current.to_owned(),
        new_password: new.to_owned(),
        confirm_password: confirm.to_owned(),
    }
}

// ── Create ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_create_user_in_initial_state_with_derived_fields() {
    let svc = test_service();

    let view = svc
        .create(CreateUserInput {
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            role_names: vec!["user".into(), "Admin".into()],
            ..create_input("alice", "a@x.com")
        })
        .await
        .unwrap();

    assert_eq!(view.status, UserStatus::Active);
    assert!(!view.account_locked);
    assert!(!view.email_verified);
    assert_eq!(view.failed_login_attempts, 0);
    assert_eq!(view.full_name, "Alice Liddell");

    let fetched = svc.get_by_id(view.id).await.unwrap();
    assert_eq!(fetched.roles, names(&["ADMIN", "USER"]));
    assert_eq!(
        fetched.permissions,
        names(&["USER_DELETE", "USER_READ", "USER_WRITE"])
    );
}

#[tokio::test]
async fn should_store_hashed_secret_only() {
    let svc = test_service();
    let view = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let stored = svc.users.stored(view.id).unwrap();
    assert_eq!(stored.password_hash, "hashed:s3cret-pass");
}

#[tokio::test]
async fn should_reject_username_taken_in_other_case() {
    let svc = test_service();
    svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let result = svc.create(create_input("ALICE", "other@x.com")).await;

    assert!(
        matches!(result, Err(AccountsError::UsernameAlreadyExists)),
        "expected UsernameAlreadyExists, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_email_taken_in_other_case() {
    let svc = test_service();
    svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let result = svc.create(create_input("bob", "A@X.COM")).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AccountsError::EmailAlreadyExists));
    assert_eq!(err.category(), ErrorCategory::Conflict);
}

#[tokio::test]
async fn should_return_not_found_for_missing_role_and_store_nothing() {
    let svc = test_service();

    let result = svc
        .create(CreateUserInput {
            role_names: vec!["USER".into(), "AUDITOR".into()],
            ..create_input("alice", "a@x.com")
        })
        .await;

    assert!(matches!(result, Err(AccountsError::RoleNotFound(ref name)) if name == "AUDITOR"));
    assert!(!svc.exists_by_username("alice").await.unwrap());
}

// ── Existence ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_report_existence_until_deleted() {
    let svc = test_service();
    let view = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    assert!(svc.exists_by_username("alice").await.unwrap());
    assert!(svc.exists_by_email("A@x.com").await.unwrap());

    svc.delete(view.id).await.unwrap();

    assert!(!svc.exists_by_username("alice").await.unwrap());
    assert!(!svc.exists_by_email("a@x.com").await.unwrap());
    assert!(matches!(
        svc.get_by_id(view.id).await,
        Err(AccountsError::UserNotFound)
    ));
}

#[tokio::test]
async fn should_return_not_found_when_deleting_unknown_user() {
    let svc = test_service();
    let result = svc.delete(UserId::generate()).await;
    assert!(matches!(result, Err(AccountsError::UserNotFound)));
}

// ── Reads ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_find_by_username_and_email_ignoring_case() {
    let svc = test_service();
    let created = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    assert_eq!(svc.get_by_username("Alice").await.unwrap().id, created.id);
    assert_eq!(svc.get_by_email("A@X.com").await.unwrap().id, created.id);
    assert!(matches!(
        svc.get_by_username("nobody").await,
        Err(AccountsError::UserNotFound)
    ));
}

#[tokio::test]
async fn should_expose_raw_entity_for_authentication() {
    let svc = test_service();
    svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let user = svc.find_user_by_username("alice").await.unwrap();

    assert_eq!(user.password_hash, "hashed:s3cret-pass");
    assert_eq!(svc.cache.inner.len(), 0, "raw lookups must not populate the cache");
}

// ── Update ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_apply_only_present_fields() {
    let svc = test_service();
    let created = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let updated = svc
        .update(
            created.id,
            UserChanges {
                last_name: Some("Liddell".into()),
                bio: Some("curious".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name, "Test");
    assert_eq!(updated.last_name, "Liddell");
    assert_eq!(updated.full_name, "Test Liddell");
    assert_eq!(updated.bio.as_deref(), Some("curious"));
    assert_eq!(updated.email, "a@x.com");
    assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn should_reject_email_owned_by_another_user() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    svc.create(create_input("bob", "b@x.com")).await.unwrap();

    let result = svc
        .update(
            alice.id,
            UserChanges {
                email: Some("B@x.com".into()),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(AccountsError::EmailAlreadyExists)));
    assert_eq!(svc.users.stored(alice.id).unwrap().email, "a@x.com");
}

#[tokio::test]
async fn should_allow_keeping_own_email_in_other_case() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let updated = svc
        .update(
            alice.id,
            UserChanges {
                email: Some("A@X.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.email, "A@X.com");
}

#[tokio::test]
async fn should_return_not_found_when_updating_unknown_user() {
    let svc = test_service();
    let result = svc
        .update(UserId::generate(), UserChanges::default())
        .await;
    assert!(matches!(result, Err(AccountsError::UserNotFound)));
}

// ── Password ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_change_password_when_current_matches() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    svc.change_password(alice.id, password_change("s3cret-pass", "n3w-pass", "n3w-pass"))
        .await
        .unwrap();

    assert_eq!(
        svc.users.stored(alice.id).unwrap().password_hash,
        "hashed:n3w-pass"
    );
}

#[tokio::test]
async fn should_leave_hash_unchanged_on_wrong_current_password() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let result = svc
        .change_password(alice.id, password_change("guess", "n3w-pass", "n3w-pass"))
        .await;

    assert!(matches!(result, Err(AccountsError::InvalidCredential)));
    assert_eq!(
        svc.users.stored(alice.id).unwrap().password_hash,
        "hashed:s3cret-pass"
    );
}

#[tokio::test]
async fn should_leave_hash_unchanged_on_mismatched_confirmation() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let result = svc
        .change_password(alice.id, password_change("s3cret-pass", "n3w-pass", "typo"))
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationError);
    assert_eq!(
        svc.users.stored(alice.id).unwrap().password_hash,
        "hashed:s3cret-pass"
    );
}

#[tokio::test]
async fn should_return_not_found_when_changing_password_of_unknown_user() {
    let svc = test_service();
    let result = svc
        .change_password(UserId::generate(), password_change("a", "b", "b"))
        .await;
    assert!(matches!(result, Err(AccountsError::UserNotFound)));
}

// ── Account state ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_lock_on_fifth_failed_login_and_reset_on_unlock() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    for attempt in 1..=4 {
        let view = svc.record_failed_login(alice.id).await.unwrap();
        assert_eq!(view.failed_login_attempts, attempt);
        assert_eq!(view.status, UserStatus::Active);
    }
    let locked = svc.record_failed_login(alice.id).await.unwrap();
    assert_eq!(locked.status, UserStatus::Locked);
    assert!(locked.account_locked);

    let unlocked = svc.unlock(alice.id).await.unwrap();
    assert_eq!(unlocked.failed_login_attempts, 0);
    assert_eq!(unlocked.status, UserStatus::Active);
    assert!(!unlocked.account_locked);
}

#[tokio::test]
async fn should_reset_failed_logins_without_unlocking() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    for _ in 0..5 {
        svc.record_failed_login(alice.id).await.unwrap();
    }

    let view = svc.reset_failed_logins(alice.id).await.unwrap();

    assert_eq!(view.failed_login_attempts, 0);
    assert_eq!(view.status, UserStatus::Locked);
    assert!(view.account_locked);
}

#[tokio::test]
async fn should_lock_and_verify_email_explicitly() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    let locked = svc.lock(alice.id).await.unwrap();
    assert_eq!(locked.status, UserStatus::Locked);
    assert_eq!(locked.failed_login_attempts, 0);

    let verified = svc.verify_email(alice.id).await.unwrap();
    assert!(verified.email_verified);
    assert_eq!(verified.status, UserStatus::Locked);
}

#[tokio::test]
async fn should_return_not_found_for_transitions_on_unknown_user() {
    let svc = test_service();
    let id = UserId::generate();
    assert!(matches!(svc.lock(id).await, Err(AccountsError::UserNotFound)));
    assert!(matches!(svc.unlock(id).await, Err(AccountsError::UserNotFound)));
    assert!(matches!(
        svc.verify_email(id).await,
        Err(AccountsError::UserNotFound)
    ));
}

// ── Roles ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_restore_role_set_after_add_then_remove() {
    let svc = test_service();
    let alice = svc
        .create(CreateUserInput {
            role_names: vec!["USER".into()],
            ..create_input("alice", "a@x.com")
        })
        .await
        .unwrap();
    let before = svc.users.stored(alice.id).unwrap().role_ids;

    let with_admin = svc.add_role_to_user(alice.id, "ADMIN").await.unwrap();
    assert_eq!(with_admin.roles, names(&["ADMIN", "USER"]));
    assert!(with_admin.permissions.contains("USER_DELETE"));

    let restored = svc.remove_role_from_user(alice.id, "admin").await.unwrap();
    assert_eq!(restored.roles, names(&["USER"]));
    assert_eq!(restored.permissions, names(&["USER_READ"]));
    assert_eq!(svc.users.stored(alice.id).unwrap().role_ids, before);
}

#[tokio::test]
async fn should_return_not_found_for_unknown_role_or_user() {
    let svc = test_service();
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();

    assert!(matches!(
        svc.add_role_to_user(alice.id, "AUDITOR").await,
        Err(AccountsError::RoleNotFound(_))
    ));
    assert!(matches!(
        svc.add_role_to_user(UserId::generate(), "ADMIN").await,
        Err(AccountsError::UserNotFound)
    ));
    assert!(matches!(
        svc.remove_role_from_user(UserId::generate(), "AUDITOR").await,
        Err(AccountsError::UserNotFound)
    ));
}

#[tokio::test]
async fn should_answer_capability_checks_case_sensitively() {
    let svc = test_service();
    let alice = svc
        .create(CreateUserInput {
            role_names: vec!["ADMIN".into()],
            ..create_input("alice", "a@x.com")
        })
        .await
        .unwrap();

    assert!(svc.has_role(alice.id, "ADMIN").await.unwrap());
    assert!(!svc.has_role(alice.id, "admin").await.unwrap());
    assert!(!svc.has_role(alice.id, "USER").await.unwrap());
    assert!(svc.has_permission(alice.id, "USER_WRITE").await.unwrap());
    assert!(!svc.has_permission(alice.id, "user_write").await.unwrap());
}
