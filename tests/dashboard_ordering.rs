use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use studygroupd::auth;
use studygroupd::config::RetryPolicy;
use studygroupd::model::Role;
use studygroupd::presenter::{ListState, Phase, TeacherDashboard};
use studygroupd::repository::GroupRepository;
use studygroupd::store::local::LocalStore;
use studygroupd::store::{AuthSession, Store, StorePath};

/// Wraps a local store and holds back reads of chosen paths. The read is
/// taken before the delay, so a delayed result is a snapshot of the past.
struct SlowStore {
    inner: LocalStore,
    delays: Mutex<HashMap<String, Vec<Duration>>>,
}

impl SlowStore {
    fn new() -> Self {
        Self {
            inner: LocalStore::open_in_memory().expect("open"),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// Queue delays for the next reads of `path`, consumed in order.
    fn delay_reads(&self, path: &str, delays: &[u64]) {
        self.delays.lock().expect("lock").insert(
            path.to_string(),
            delays.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        );
    }

    fn next_delay(&self, path: &StorePath) -> Option<Duration> {
        let mut map = self.delays.lock().expect("lock");
        let q = map.get_mut(&path.to_string())?;
        if q.is_empty() {
            None
        } else {
            Some(q.remove(0))
        }
    }
}

#[async_trait]
impl Store for SlowStore {
    fn backend_name(&self) -> &'static str {
        "slow"
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
        let snapshot = self.inner.get(path).await;
        if let Some(d) = self.next_delay(path) {
            tokio::time::sleep(d).await;
        }
        snapshot
    }
    async fn set(&self, path: &StorePath, value: &Value) -> studygroupd::Result<()> {
        self.inner.set(path, value).await
    }
    async fn remove(&self, path: &StorePath) -> studygroupd::Result<()> {
        self.inner.remove(path).await
    }
    fn push_key(&self) -> String {
        self.inner.push_key()
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(1_000),
        attempts: 1,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    }
}

async fn setup() -> (Arc<SlowStore>, GroupRepository, String) {
    let store = Arc::new(SlowStore::new());
    let repo = GroupRepository::new(store.clone(), policy());
    let teacher = auth::sign_up(&repo, "t@x.com", "secret1", Role::Teacher)
        .await
        .expect("teacher");
    (store, repo, teacher.id)
}

fn group_names(d: &TeacherDashboard) -> Vec<String> {
    match d.view().groups.state {
        ListState::Ready { items } => items.into_iter().map(|g| g.name).collect(),
        other => panic!("groups not ready: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn late_stale_group_list_is_discarded() {
    let (store, repo, teacher_id) = setup().await;
    let dash = TeacherDashboard::new(repo.clone(), teacher_id.clone());

    // First fetch sees an empty store but lands last.
    store.delay_reads("groups", &[50, 10]);
    let older = dash.refresh_groups();
    let newer = async {
        repo.create_group(&teacher_id, "Algebra", "9", "Math")
            .await
            .expect("create");
        dash.refresh_groups().await
    };
    let (older_applied, newer_applied) = tokio::join!(older, newer);

    assert!(newer_applied);
    assert!(!older_applied);
    assert_eq!(group_names(&dash), vec!["Algebra".to_string()]);
    assert_eq!(dash.view().phase, Phase::Ready);
}

#[tokio::test(start_paused = true)]
async fn closing_panel_drops_in_flight_student_lists() {
    let (store, repo, teacher_id) = setup().await;
    let student = auth::sign_up(&repo, "s@x.com", "secret1", Role::Student)
        .await
        .expect("student");
    let dash = TeacherDashboard::new(repo.clone(), teacher_id.clone());
    let g = dash
        .create_group("Algebra", "9", "Math")
        .await
        .expect("create");

    let group_path = format!("groups/{}", g);
    store.delay_reads(&group_path, &[40, 40]);
    let open = dash.select_group(&g);
    let close = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        dash.back();
    };
    let (opened, ()) = tokio::join!(open, close);
    opened.expect("select");
    assert!(dash.view().panel.is_none());

    // Reopening starts clean and loads normally.
    dash.select_group(&g).await.expect("reopen");
    let panel = dash.view().panel.expect("panel open");
    assert_eq!(panel.title, "Managing: Algebra");
    match panel.unassigned.state {
        ListState::Ready { items } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].student_id, student.id);
        }
        other => panic!("unassigned not ready: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn add_and_remove_student_settle_on_server_state() {
    let (_store, repo, teacher_id) = setup().await;
    let s1 = auth::sign_up(&repo, "s1@x.com", "secret1", Role::Student)
        .await
        .expect("s1");
    let dash = TeacherDashboard::new(repo.clone(), teacher_id);
    dash.refresh().await;
    let g = dash
        .create_group("Algebra", "9", "Math")
        .await
        .expect("create");
    dash.select_group(&g).await.expect("select");

    dash.add_student(&s1.id).await.expect("add");
    let panel = dash.view().panel.expect("panel");
    assert_eq!(
        panel.assigned.state,
        ListState::Ready {
            items: vec![studygroupd::model::StudentEntry {
                student_id: s1.id.clone(),
                code: s1.student_code.clone().expect("code"),
            }]
        }
    );
    assert_eq!(panel.unassigned.state, ListState::Ready { items: vec![] });
    match dash.view().groups.state {
        ListState::Ready { items } => assert_eq!(items[0].student_count, 1),
        other => panic!("{:?}", other),
    }

    dash.remove_student(&s1.id).await.expect("remove");
    let panel = dash.view().panel.expect("panel");
    assert_eq!(panel.assigned.state, ListState::Ready { items: vec![] });
}

#[tokio::test(start_paused = true)]
async fn failed_add_reconciles_optimistic_patch() {
    let (store, repo, teacher_id) = setup().await;
    let s1 = auth::sign_up(&repo, "s1@x.com", "secret1", Role::Student)
        .await
        .expect("s1");
    let dash = TeacherDashboard::new(repo.clone(), teacher_id);
    let g = dash
        .create_group("Algebra", "9", "Math")
        .await
        .expect("create");
    dash.select_group(&g).await.expect("select");

    // The student's code disappears before the add is processed.
    store
        .set(
            &StorePath::parse(&format!("users/{}/studentId", s1.id)).expect("path"),
            &Value::Null,
        )
        .await
        .expect("clear code");
    let err = dash.add_student(&s1.id).await.unwrap_err();
    assert_eq!(err.code(), "not_found");

    let panel = dash.view().panel.expect("panel");
    assert_eq!(panel.assigned.state, ListState::Ready { items: vec![] });
    match panel.unassigned.state {
        ListState::Ready { items } => assert_eq!(items.len(), 1),
        other => panic!("{:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn deleting_selected_group_closes_panel() {
    let (_store, repo, teacher_id) = setup().await;
    let dash = TeacherDashboard::new(repo, teacher_id);
    let g = dash
        .create_group("Algebra", "9", "Math")
        .await
        .expect("create");
    dash.select_group(&g).await.expect("select");
    dash.delete_group(&g).await.expect("delete");
    let view = dash.view();
    assert!(view.panel.is_none());
    assert_eq!(view.groups.state, ListState::Ready { items: vec![] });
}

#[tokio::test(start_paused = true)]
async fn hung_store_marks_list_retryable() {
    let (store, repo, teacher_id) = setup().await;
    let dash = TeacherDashboard::new(repo, teacher_id);
    store.delay_reads("groups", &[60_000]);
    dash.refresh_groups().await;

    let view = dash.view();
    assert_eq!(view.phase, Phase::Failed);
    match view.groups.state {
        ListState::Failed { retryable, .. } => assert!(retryable),
        other => panic!("{:?}", other),
    }

    // The retry action recovers once the store answers.
    dash.refresh().await;
    assert_eq!(dash.view().phase, Phase::Ready);
}

#[tokio::test(start_paused = true)]
async fn other_teachers_groups_are_off_limits() {
    let (_store, repo, teacher_id) = setup().await;
    let other = auth::sign_up(&repo, "t2@x.com", "secret1", Role::Teacher)
        .await
        .expect("t2");
    let theirs = repo
        .create_group(&other.id, "Theirs", "1", "Art")
        .await
        .expect("create");
    let dash = TeacherDashboard::new(repo, teacher_id);
    dash.refresh().await;
    assert!(group_names(&dash).is_empty());
    assert_eq!(
        dash.select_group(&theirs).await.unwrap_err().code(),
        "forbidden"
    );
    assert_eq!(
        dash.delete_group(&theirs).await.unwrap_err().code(),
        "forbidden"
    );
}

#[tokio::test(start_paused = true)]
async fn partial_group_left_by_a_late_add_can_be_deleted() {
    let (store, repo, teacher_id) = setup().await;
    store
        .set(
            &StorePath::parse("groups/leftover/students/s1").expect("path"),
            &Value::String("AB12".into()),
        )
        .await
        .expect("stub");
    let dash = TeacherDashboard::new(repo, teacher_id);
    dash.refresh().await;
    assert!(group_names(&dash).is_empty());

    dash.delete_group("leftover").await.expect("delete");
    assert_eq!(
        store
            .get(&StorePath::parse("groups/leftover").expect("path"))
            .await
            .expect("read"),
        None
    );
}
