use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use studygroupd::auth::{self, is_valid_code};
use studygroupd::config::RetryPolicy;
use studygroupd::model::Role;
use studygroupd::repository::GroupRepository;
use studygroupd::store::local::LocalStore;
use studygroupd::store::{AuthSession, Store, StorePath};
use studygroupd::AppError;

fn repo() -> GroupRepository {
    let store = Arc::new(LocalStore::open_in_memory().expect("open store"));
    GroupRepository::new(store, RetryPolicy::default())
}

/// Local store whose writes under `users/` fail a set number of times.
struct FlakyProfiles {
    inner: LocalStore,
    failures_left: AtomicUsize,
}

#[async_trait]
impl Store for FlakyProfiles {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }
    async fn sign_up(&self, email: &str, password: &str) -> studygroupd::Result<AuthSession> {
        self.inner.sign_up(email, password).await
    }
    async fn sign_in(&self, email: &str, password: &str) -> studygroupd::Result<AuthSession> {
        self.inner.sign_in(email, password).await
    }
    fn sign_out(&self) {
        self.inner.sign_out()
    }
    async fn delete_account(&self, account: &AuthSession) -> studygroupd::Result<()> {
        self.inner.delete_account(account).await
    }
    async fn get(&self, path: &StorePath) -> studygroupd::Result<Option<Value>> {
        self.inner.get(path).await
    }
    async fn set(&self, path: &StorePath, value: &Value) -> studygroupd::Result<()> {
        let under_users = path.segments().first().map(String::as_str) == Some("users");
        if under_users
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(AppError::Transport("connection reset".into()));
        }
        self.inner.set(path, value).await
    }
    async fn remove(&self, path: &StorePath) -> studygroupd::Result<()> {
        self.inner.remove(path).await
    }
    fn push_key(&self) -> String {
        self.inner.push_key()
    }
}

#[tokio::test]
async fn sign_up_then_sign_in_returns_chosen_role() {
    let repo = repo();
    for (email, role) in [("t@x.com", Role::Teacher), ("s@x.com", Role::Student)] {
        let user = auth::sign_up(&repo, email, "secret1", role)
            .await
            .expect("sign up");
        let session = auth::sign_in(&repo, email, "secret1").await.expect("sign in");
        assert_eq!(session.user_id, user.id);
        assert_eq!(session.role, role);
    }
}

#[tokio::test]
async fn sign_up_validation_happens_before_any_account_exists() {
    let repo = repo();
    let short = auth::sign_up(&repo, "t@x.com", "12345", Role::Teacher)
        .await
        .unwrap_err();
    assert!(matches!(short, AppError::Validation(_)));
    let empty = auth::sign_up(&repo, "", "secret1", Role::Teacher)
        .await
        .unwrap_err();
    assert!(matches!(empty, AppError::Validation(_)));

    // The short-password attempt must not have reserved the email.
    auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("sign up after rejection");
}

#[tokio::test]
async fn bad_credentials_surface_verbatim() {
    let repo = repo();
    auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("sign up");
    let e = auth::sign_in(&repo, "t@x.com", "wrong-1").await.unwrap_err();
    assert!(matches!(e, AppError::Auth(ref m) if m == "INVALID_LOGIN_CREDENTIALS"));
}

#[tokio::test]
async fn teacher_creates_algebra_group() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("sign up");
    let group_id = repo
        .create_group(&teacher.id, "Algebra", "9", "Math")
        .await
        .expect("create");

    let groups = repo
        .list_groups_for_teacher(&teacher.id)
        .await
        .expect("list");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, group_id);
    assert_eq!(
        (groups[0].name.as_str(), groups[0].grade.as_str(), groups[0].subject.as_str()),
        ("Algebra", "9", "Math")
    );
}

#[tokio::test]
async fn student_code_and_membership_scenario() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    let student = auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .expect("student");
    let code = student.student_code.clone().expect("student code");
    assert!(is_valid_code(&code), "{}", code);
    assert_eq!(teacher.student_code, None);

    let group_id = repo
        .create_group(&teacher.id, "Algebra", "9", "Math")
        .await
        .expect("create");
    repo.add_membership(&group_id, &student.id)
        .await
        .expect("add");

    let groups = repo
        .list_groups_for_student(&student.id)
        .await
        .expect("student groups");
    assert!(groups.iter().any(|g| g.id == group_id));

    // The code is denormalized onto the membership on the wire.
    let stored = repo
        .store()
        .get(
            &StorePath::parse(&format!("groups/{}/students/{}", group_id, student.id))
                .expect("path"),
        )
        .await
        .expect("read");
    assert_eq!(stored, Some(serde_json::Value::String(code)));
}

#[tokio::test]
async fn deleted_group_never_listed() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    let keep = repo
        .create_group(&teacher.id, "Keep", "1", "Art")
        .await
        .expect("create");
    let gone = repo
        .create_group(&teacher.id, "Gone", "2", "Art")
        .await
        .expect("create");
    repo.delete_group(&gone).await.expect("delete");

    let ids: Vec<String> = repo
        .list_groups_for_teacher(&teacher.id)
        .await
        .expect("list")
        .into_iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(ids, vec![keep]);
}

#[tokio::test]
async fn unassigned_list_round_trip() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    let s1 = auth::sign_up(&repo, "s1@x.com", "secret1", Role::Student)
        .await
        .expect("s1");
    let s2 = auth::sign_up(&repo, "s2@x.com", "secret1", Role::Student)
        .await
        .expect("s2");
    let g = repo
        .create_group(&teacher.id, "Algebra", "9", "Math")
        .await
        .expect("create");

    let ids = |list: Vec<studygroupd::model::StudentEntry>| -> Vec<String> {
        list.into_iter().map(|s| s.student_id).collect()
    };

    let before = ids(repo.list_unassigned_students(&g).await.expect("list"));
    assert!(before.contains(&s1.id) && before.contains(&s2.id));
    assert!(!before.contains(&teacher.id));

    repo.add_membership(&g, &s1.id).await.expect("add");
    let after_add = ids(repo.list_unassigned_students(&g).await.expect("list"));
    assert!(!after_add.contains(&s1.id));
    assert!(after_add.contains(&s2.id));

    repo.remove_membership(&g, &s1.id).await.expect("remove");
    let after_remove = ids(repo.list_unassigned_students(&g).await.expect("list"));
    assert!(after_remove.contains(&s1.id));
}

#[tokio::test]
async fn empty_field_group_writes_nothing() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    for (n, g, s) in [("", "9", "Math"), ("Algebra", "", "Math"), ("Algebra", "9", "")] {
        let e = repo.create_group(&teacher.id, n, g, s).await.unwrap_err();
        assert!(matches!(e, AppError::Validation(_)));
    }
    let groups = repo
        .store()
        .get(&StorePath::groups())
        .await
        .expect("read groups");
    assert_eq!(groups, None);
}

#[tokio::test]
async fn orphaned_membership_stays_visible_and_removable() {
    let repo = repo();
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    let student = auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .expect("student");
    let g = repo
        .create_group(&teacher.id, "Algebra", "9", "Math")
        .await
        .expect("create");
    repo.add_membership(&g, &student.id).await.expect("add");

    // Profile removed out of band.
    repo.store()
        .remove(&StorePath::users().child(&student.id).expect("path"))
        .await
        .expect("remove user");

    let assigned = repo.list_assigned_students(&g).await.expect("assigned");
    assert_eq!(assigned.len(), 1);
    assert_eq!(Some(assigned[0].code.clone()), student.student_code);

    repo.remove_membership(&g, &student.id)
        .await
        .expect("remove orphan");
    assert!(repo.list_assigned_students(&g).await.expect("assigned").is_empty());
}

#[tokio::test]
async fn failed_profile_write_leaves_email_reusable() {
    let store = Arc::new(FlakyProfiles {
        inner: LocalStore::open_in_memory().expect("open store"),
        failures_left: AtomicUsize::new(1),
    });
    let repo = GroupRepository::new(store, RetryPolicy::default());

    let first = auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .unwrap_err();
    assert_eq!(first.code(), "transport");
    let e = auth::sign_in(&repo, "s@x.com", "secret1").await.unwrap_err();
    assert!(matches!(e, AppError::Auth(_)));

    let user = auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .expect("sign up after the store recovers");
    let session = auth::sign_in(&repo, "s@x.com", "secret1").await.expect("sign in");
    assert_eq!(session.user_id, user.id);
    assert_eq!(session.role, Role::Student);
}

#[tokio::test]
async fn sign_up_does_not_leave_a_store_session() {
    let store = Arc::new(LocalStore::open_in_memory().expect("open store"));
    let repo = GroupRepository::new(store.clone(), RetryPolicy::default());
    auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    auth::sign_in(&repo, "t@x.com", "secret1").await.expect("sign in");
    assert!(store.current_uid().is_some());

    auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .expect("student");
    assert_eq!(store.current_uid(), None);
}
