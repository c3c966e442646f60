use chrono::Duration;
use practice_core::graph::TagGraph;
use practice_core::model::{
    BoxLevel, Difficulty, PerformanceSummary, Problem, ProblemId, RecordedAttempt, SessionId,
    SessionRecord, SessionStatus, SessionType, TagName, Tier,
};
use practice_core::progression::ProgressionState;
use practice_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, ProblemRepository, ProgressionRepository, SessionRepository,
    StorageError, TagRelationshipRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn tags(names: &[&str]) -> Vec<TagName> {
    names.iter().map(|n| TagName::new(n).unwrap()).collect()
}

fn problem(id: u64, names: &[&str], difficulty: Difficulty) -> Problem {
    Problem::new(ProblemId::new(id), format!("Problem {id}"), tags(names), difficulty)
}

#[tokio::test]
async fn sqlite_roundtrips_problem_state_and_tag_order() {
    let repo = connect("memdb_problem_roundtrip").await;

    let mut p = problem(1, &["two pointers", "array", "sorting"], Difficulty::Medium);
    p.box_level = BoxLevel::new(4).unwrap();
    p.stability = 12.5;
    p.consecutive_failures = 2;
    p.cooldown = true;
    p.attempt_count = 6;
    p.last_attempt_at = Some(fixed_now());
    p.next_review_at = Some(fixed_now() + Duration::days(14));
    repo.upsert_problem(&p).await.unwrap();

    let fetched = repo.get_problem(ProblemId::new(1)).await.unwrap();
    assert_eq!(fetched, p);

    // Re-running the upsert (migration is idempotent too) keeps a single row.
    repo.migrate().await.unwrap();
    p.tags = tags(&["array"]);
    repo.upsert_problem(&p).await.unwrap();
    let all = repo.list_problems().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].tags, tags(&["array"]));

    assert!(matches!(
        repo.get_problem(ProblemId::new(99)).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_filters_due_and_new_by_cap() {
    let repo = connect("memdb_due_new").await;
    let now = fixed_now();

    let mut due_easy = problem(1, &["array"], Difficulty::Easy);
    due_easy.attempt_count = 2;
    due_easy.last_attempt_at = Some(now - Duration::days(3));
    due_easy.next_review_at = Some(now - Duration::hours(1));

    let mut due_hard = due_easy.clone();
    due_hard.id = ProblemId::new(2);
    due_hard.difficulty = Difficulty::Hard;

    let mut later = due_easy.clone();
    later.id = ProblemId::new(3);
    later.next_review_at = Some(now + Duration::days(1));

    for p in [
        due_easy,
        due_hard,
        later,
        problem(4, &["graph"], Difficulty::Medium),
        problem(5, &["graph"], Difficulty::Hard),
    ] {
        repo.upsert_problem(&p).await.unwrap();
    }

    let due = repo.due_problems(now, Difficulty::Medium).await.unwrap();
    assert_eq!(due.iter().map(|p| p.id.value()).collect::<Vec<_>>(), vec![1]);

    let fresh = repo.new_problems(Difficulty::Medium).await.unwrap();
    assert_eq!(fresh.iter().map(|p| p.id.value()).collect::<Vec<_>>(), vec![4]);
    assert_eq!(fresh[0].tags, tags(&["graph"]));
}

#[tokio::test]
async fn sqlite_attempts_keep_malformed_rows_readable() {
    let repo = connect("memdb_attempts").await;
    let id = ProblemId::new(1);
    let session = SessionId::generate();

    repo.append_attempt(&RecordedAttempt::new(id, fixed_now(), true, 4.0, 120).in_session(session))
        .await
        .unwrap();
    repo.append_attempt(&RecordedAttempt {
        problem_id: id,
        session_id: None,
        attempted_at: None,
        success: None,
        perceived_difficulty: None,
        time_spent_secs: None,
    })
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO attempts (problem_id, attempted_at, success, perceived_difficulty) VALUES (1, 'yesterday-ish', 1, 5.0)",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let history = repo.attempts_for_problem(id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].session_id, Some(session));
    assert_eq!(history[0].attempted_at, Some(fixed_now()));
    assert!(history[1].success.is_none());
    assert!(history[2].attempted_at.is_none());

    let since = repo.attempts_since(fixed_now()).await.unwrap();
    assert_eq!(since.len(), 1);
    assert_eq!(repo.list_attempts().await.unwrap().len(), 3);
}

#[tokio::test]
async fn sqlite_replaces_tag_graph_wholesale() {
    let repo = connect("memdb_tags").await;
    assert!(!repo.has_relationships().await.unwrap());

    let catalog = vec![
        problem(1, &["array", "hash table"], Difficulty::Easy),
        problem(2, &["array", "dp"], Difficulty::Hard),
    ];
    let graph = TagGraph::build(&catalog);
    repo.replace_relationships(&graph).await.unwrap();
    assert!(repo.has_relationships().await.unwrap());

    let loaded = repo.load_relationships().await.unwrap();
    assert_eq!(loaded, graph);
    let array = TagName::new("array").unwrap();
    assert_eq!(loaded.weight(&array, &TagName::new("hash table").unwrap()), 3);
    assert_eq!(loaded.tier_of(&array), Some(Tier::AdvancedTechnique));

    let smaller = TagGraph::build(&catalog[..1]);
    repo.replace_relationships(&smaller).await.unwrap();
    let loaded = repo.load_relationships().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(loaded.node(&TagName::new("dp").unwrap()).is_none());
}

#[tokio::test]
async fn sqlite_progression_defaults_then_persists() {
    let repo = connect("memdb_progression").await;
    assert_eq!(repo.load_progression().await.unwrap(), ProgressionState::default());

    let state = ProgressionState {
        current_difficulty_cap: Difficulty::Medium,
        consecutive_high_accuracy_sessions: 1,
        consecutive_low_accuracy_sessions: 0,
        num_sessions_completed: 7,
        recent_accuracies: vec![0.5, 0.75, 1.0],
    };
    repo.save_progression(&state).await.unwrap();
    repo.save_progression(&state).await.unwrap();
    assert_eq!(repo.load_progression().await.unwrap(), state);
}

#[tokio::test]
async fn sqlite_allows_one_active_session_per_type() {
    let repo = connect("memdb_sessions").await;
    let now = fixed_now();

    let first = SessionRecord::new(
        SessionId::generate(),
        SessionType::Standard,
        vec![ProblemId::new(1), ProblemId::new(2)],
        now,
    );
    let rival = SessionRecord::new(SessionId::generate(), SessionType::Standard, Vec::new(), now);
    assert_eq!(repo.insert_session(&first).await.unwrap(), first);
    assert_eq!(repo.insert_session(&rival).await.unwrap().id, first.id);

    let mut done = repo.active_session(SessionType::Standard).await.unwrap().unwrap();
    done.complete(PerformanceSummary::from_counts(2, 1).unwrap(), now + Duration::minutes(30))
        .unwrap();
    repo.update_session(&done).await.unwrap();

    let stored = repo.get_session(first.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.performance.unwrap().solved(), 1);
    assert!(repo.active_session(SessionType::Standard).await.unwrap().is_none());

    assert_eq!(repo.insert_session(&rival).await.unwrap().id, rival.id);
}
