use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, security, state::AppState};
use crate::db::models::{Answer, AnswerValue, Attempt, Exam, ExamOptions, Question, ScoreState};
use crate::db::types::{GradingStatus, QuestionType, UserRole};
use crate::repositories::exams::{ExamStore, MemoryExamStore};
use crate::services::notifications::{Notifier, NotifyError, SubmissionEvent};

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) notifier: Arc<RecordingNotifier>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADEGATE_ENV", "test");
    std::env::remove_var("GRADEGATE_STRICT_CONFIG");
    std::env::set_var("EXAM_STORE", "memory");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::remove_var("ALGORITHM");
    std::env::remove_var("PROMETHEUS_ENABLED");
    std::env::remove_var("NOTIFY_WEBHOOK_URL");
    std::env::remove_var("NOTIFY_TIMEOUT_SECONDS");
    std::env::remove_var("EXAM_WRITE_RETRIES");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("PROJECT_NAME");
}

pub(crate) fn memory_state(settings: Settings) -> (AppState, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let store: Arc<dyn ExamStore> = Arc::new(MemoryExamStore::new());
    (AppState::new(settings, store, notifier.clone()), notifier)
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let (state, notifier) = memory_state(settings);
    let app = api::router::router(state.clone());

    TestContext { state, app, notifier, _guard: guard }
}

impl TestContext {
    pub(crate) async fn seed(&self, exam: &Exam) {
        self.state.store().insert(exam).await.expect("seed exam");
    }

    pub(crate) async fn exam(&self, exam_id: &str) -> Exam {
        self.state.store().load(exam_id).await.expect("load").expect("exam exists").value
    }

    pub(crate) fn token(&self, sub: &str, role: UserRole, class_id: Option<&str>) -> String {
        bearer_token(self.state.settings(), sub, role, class_id)
    }
}

/// Three-question exam: Q1 objective (2), Q2 objective (3), Q3 theory (5); total 10.
pub(crate) fn scenario_exam(id: &str, allow_retakes: bool) -> Exam {
    Exam {
        id: id.to_string(),
        title: "General Science".to_string(),
        join_code: "SCI-101".to_string(),
        class_id: "class-1".to_string(),
        teacher_id: "teacher-1".to_string(),
        start_time: datetime!(2025-03-01 09:00 UTC),
        end_time: datetime!(2025-03-01 11:00 UTC),
        duration_minutes: 60,
        total_marks: 10.0,
        passing_marks: 5.0,
        options: ExamOptions { shuffle: false, allow_retakes, show_results: true },
        questions: vec![
            Question {
                question_number: 1,
                id: None,
                text: "Which planet is the largest?".to_string(),
                question_type: QuestionType::Objective,
                marks: 2.0,
                options: vec!["Mars".to_string(), "Jupiter".to_string()],
                correct_option: Some(1),
            },
            Question {
                question_number: 2,
                id: None,
                text: "What is the capital of France?".to_string(),
                question_type: QuestionType::Objective,
                marks: 3.0,
                options: vec!["London".to_string(), "Paris".to_string(), "Rome".to_string()],
                correct_option: Some(1),
            },
            Question {
                question_number: 3,
                id: None,
                text: "Explain photosynthesis.".to_string(),
                question_type: QuestionType::Theory,
                marks: 5.0,
                options: Vec::new(),
                correct_option: None,
            },
        ],
        attempts: Vec::new(),
        audit_log: Vec::new(),
    }
}

/// Scenario exam whose window is open right now.
pub(crate) fn open_exam(id: &str, allow_retakes: bool) -> Exam {
    let now = OffsetDateTime::now_utc();
    let mut exam = scenario_exam(id, allow_retakes);
    exam.start_time = now - Duration::minutes(10);
    exam.end_time = now + Duration::minutes(110);
    exam
}

pub(crate) fn blank_attempt(student_id: &str, attempt_number: u32, started_at: OffsetDateTime) -> Attempt {
    Attempt {
        id: format!("attempt-{student_id}-{attempt_number}"),
        student_id: student_id.to_string(),
        student_name: format!("Student {student_id}"),
        attempt_number,
        started_at,
        submitted_at: None,
        is_completed: false,
        submit_mode: None,
        answers: Vec::new(),
        time_spent_seconds: 0,
        question_order: vec![1, 2, 3],
        grading_status: GradingStatus::Pending,
        needs_grading: false,
        score: ScoreState::Ungraded,
        updated_at: started_at,
    }
}

pub(crate) fn answer(question_number: u32, value: AnswerValue) -> Answer {
    Answer { value, ..Answer::unanswered(question_number) }
}

pub(crate) fn bearer_token(
    settings: &Settings,
    sub: &str,
    role: UserRole,
    class_id: Option<&str>,
) -> String {
    let claims = security::Claims {
        sub: sub.to_string(),
        exp: (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
        role,
        name: Some(format!("User {sub}")),
        class_id: class_id.map(str::to_string),
    };
    security::create_access_token(&claims, settings).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(crate) async fn read_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Captures submission events for assertions.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<SubmissionEvent>>,
    notify: Notify,
}

impl RecordingNotifier {
    pub(crate) async fn wait_for(&self, count: usize) -> Vec<SubmissionEvent> {
        tokio::time::timeout(StdDuration::from_secs(2), async {
            loop {
                let notified = self.notify.notified();
                {
                    let events = self.events.lock().await;
                    if events.len() >= count {
                        return events.clone();
                    }
                }
                notified.await;
            }
        })
        .await
        .expect("notifications delivered")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_submission(&self, event: &SubmissionEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push(event.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Always fails, to prove delivery errors never surface.
#[derive(Default)]
pub(crate) struct FailingNotifier {
    calls: AtomicUsize,
    notify: Notify,
}

impl FailingNotifier {
    pub(crate) async fn wait_for_call(&self) {
        tokio::time::timeout(StdDuration::from_secs(2), async {
            loop {
                let notified = self.notify.notified();
                if self.calls.load(Ordering::SeqCst) > 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("notifier called");
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify_submission(&self, _event: &SubmissionEvent) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        Err(NotifyError::Status(500))
    }
}
