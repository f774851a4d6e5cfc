use chrono::{Duration, Utc};

use keystone_accounts::domain::filter::{SortField, SortSpec, UserSearchFilter};
use keystone_accounts::error::AccountsError;
use keystone_accounts::usecase::account::CreateUserInput;
use keystone_domain::pagination::{PageRequest, Sort};

use crate::helpers::{TestService, create_input, named_input, test_service};

async fn seed(svc: &TestService, count: usize) {
    for i in 0..count {
        svc.create(create_input(&format!("user{i:02}"), &format!("user{i:02}@example.com")))
            .await
            .unwrap();
    }
}

fn by_username() -> SortSpec {
    SortSpec::new(SortField::Username, Sort::Asc)
}

#[tokio::test]
async fn should_split_empty_filter_listing_into_consistent_pages() {
    let svc = test_service();
    seed(&svc, 45).await;

    let mut seen = 0;
    for number in 0..3 {
        let page = svc
            .search(
                &UserSearchFilter::default(),
                PageRequest::new(number, 20),
                by_username(),
            )
            .await
            .unwrap();

        assert_eq!(page.total_elements, 45);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.number, number);
        assert_eq!(page.first, number == 0);
        assert_eq!(page.last, number == 2);
        assert!(!page.empty);
        assert_eq!(page.number_of_elements as usize, page.content.len());
        seen += page.number_of_elements;
    }
    assert_eq!(u64::from(seen), 45);
}

#[tokio::test]
async fn should_return_empty_last_page_past_the_end() {
    let svc = test_service();
    seed(&svc, 5).await;

    let page = svc
        .list(PageRequest::new(3, 20), SortSpec::default())
        .await
        .unwrap();

    assert!(page.empty);
    assert!(page.last);
    assert!(!page.first);
    assert_eq!(page.number_of_elements, 0);
    assert_eq!(page.total_elements, 5);
}

#[tokio::test]
async fn should_report_empty_store_as_single_empty_first_page() {
    let svc = test_service();

    let page = svc
        .list(PageRequest::default(), SortSpec::default())
        .await
        .unwrap();

    assert!(page.empty && page.first && page.last);
    assert_eq!(page.total_pages, 0);
}

#[tokio::test]
async fn should_match_search_term_against_any_name_field_ignoring_case() {
    let svc = test_service();
    svc.create(named_input("alice", "Alice", "Liddell")).await.unwrap();
    svc.create(named_input("bob", "Bob", "Alison")).await.unwrap();
    svc.create(named_input("carol", "Carol", "King")).await.unwrap();
    svc.create(create_input("dave", "ali.dave@example.com")).await.unwrap();

    let page = svc
        .search(
            &UserSearchFilter {
                search_term: Some("ALI".into()),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();

    let usernames: Vec<_> = page.content.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(usernames, vec!["alice", "bob", "dave"]);
}

#[tokio::test]
async fn should_treat_whitespace_term_as_no_constraint() {
    let svc = test_service();
    seed(&svc, 3).await;

    let page = svc
        .search(
            &UserSearchFilter {
                search_term: Some("   ".into()),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();

    assert_eq!(page.total_elements, 3);
}

#[tokio::test]
async fn should_match_padded_term_including_its_spaces() {
    let svc = test_service();
    svc.create(named_input("alice", "Alice", "Liddell")).await.unwrap();
    svc.create(named_input("omar", "Omar", "Ben Ali Said")).await.unwrap();

    let page = svc
        .search(
            &UserSearchFilter {
                search_term: Some(" ali ".into()),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();

    let usernames: Vec<_> = page.content.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(usernames, vec!["omar"]);
}

#[tokio::test]
async fn should_conjoin_term_with_other_filters() {
    let svc = test_service();
    let alice = svc.create(named_input("alice", "Alice", "Liddell")).await.unwrap();
    svc.create(named_input("alina", "Alina", "Stone")).await.unwrap();
    svc.lock(alice.id).await.unwrap();

    let page = svc
        .search(
            &UserSearchFilter {
                search_term: Some("ali".into()),
                status: Some("LOCKED".into()),
                account_locked: Some(true),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();

    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].id, alice.id);
}

#[tokio::test]
async fn should_filter_by_role_name_ignoring_case() {
    let svc = test_service();
    svc.create(CreateUserInput {
        role_names: vec!["ADMIN".into()],
        ..create_input("root", "root@x.com")
    })
    .await
    .unwrap();
    seed(&svc, 4).await;

    let page = svc
        .search(
            &UserSearchFilter {
                role_name: Some("admin".into()),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();

    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].username, "root");
}

#[tokio::test]
async fn should_filter_by_email_verification_and_creation_window() {
    let svc = test_service();
    let before = Utc::now() - Duration::seconds(1);
    let alice = svc.create(create_input("alice", "a@x.com")).await.unwrap();
    svc.create(create_input("bob", "b@x.com")).await.unwrap();
    svc.verify_email(alice.id).await.unwrap();

    let page = svc
        .search(
            &UserSearchFilter {
                email_verified: Some(true),
                created_after: Some(before),
                created_before: Some(Utc::now() + Duration::seconds(1)),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].username, "alice");

    let future = svc
        .search(
            &UserSearchFilter {
                created_after: Some(Utc::now() + Duration::hours(1)),
                ..Default::default()
            },
            PageRequest::default(),
            by_username(),
        )
        .await
        .unwrap();
    assert!(future.empty);
}

#[tokio::test]
async fn should_reject_unknown_status_filter() {
    let svc = test_service();

    let result = svc
        .search(
            &UserSearchFilter {
                status: Some("BANNED".into()),
                ..Default::default()
            },
            PageRequest::default(),
            SortSpec::default(),
        )
        .await;

    assert!(matches!(result, Err(AccountsError::Validation(_))));
}

#[tokio::test]
async fn should_reject_unknown_sort_field_before_querying() {
    let result: Result<SortSpec, AccountsError> =
        SortSpec::parse(Some("passwordHash"), Some("ASC")).map_err(Into::into);
    assert!(matches!(result, Err(AccountsError::Validation(_))));
}

#[tokio::test]
async fn should_sort_descending_by_requested_field() {
    let svc = test_service();
    seed(&svc, 3).await;

    let page = svc
        .list(
            PageRequest::default(),
            SortSpec::parse(Some("username"), Some("desc")).unwrap(),
        )
        .await
        .unwrap();

    let usernames: Vec<_> = page.content.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(usernames, vec!["user02", "user01", "user00"]);
}

#[tokio::test]
async fn should_cap_oversized_pages() {
    let svc = test_service();
    seed(&svc, 3).await;

    let page = svc
        .list(PageRequest::new(0, 1_000), SortSpec::default())
        .await
        .unwrap();

    assert_eq!(page.size, 100);
    assert_eq!(page.number_of_elements, 3);
}
