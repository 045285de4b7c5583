use crate::*;
use async_trait::async_trait;
use sb_core::config::SessionConfig;
use sb_core::{
    Agent, AgentFailure, AgentKind, AgentOutput, AgentRequest, Artifacts, AuthContext,
    DuplicateAnswerPolicy, Memory, Role, SbError, Turn,
};
use sb_router::{AgentRouter, FixedRouter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_stream::StreamExt;

// ---------- fixtures ----------

/// Pushes the query as a user turn and answers with a fixed text, or
/// `"<kind>: <query>"` without one.
struct ScriptedAgent {
    kind: AgentKind,
    answer: Option<String>,
}

impl ScriptedAgent {
    fn echo(kind: AgentKind) -> Self {
        Self { kind, answer: None }
    }

    fn fixed(kind: AgentKind, answer: &str) -> Self {
        Self { kind, answer: Some(answer.to_string()) }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn name(&self) -> &str {
        match self.kind {
            AgentKind::Casual => "friday",
            _ => "worker",
        }
    }

    async fn process(&self, request: AgentRequest<'_>, memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        memory.push(Role::User, request.query);
        let answer = self
            .answer
            .clone()
            .unwrap_or_else(|| format!("{}: {}", self.kind, request.query));
        Ok(AgentOutput::new(answer, "thought about it"))
    }
}

/// Blocks until the gate opens and records how many callers were inside.
struct GatedAgent {
    gate: Arc<Notify>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl Agent for GatedAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Casual
    }

    fn name(&self) -> &str {
        "gated"
    }

    async fn process(&self, _request: AgentRequest<'_>, _memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.gate.notified().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(AgentOutput::new("done", ""))
    }
}

/// Waits for the stop token, then returns what it has.
struct PatientAgent;

#[async_trait]
impl Agent for PatientAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Coder
    }

    fn name(&self) -> &str {
        "patient"
    }

    async fn process(&self, request: AgentRequest<'_>, _memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        request.stop.cancelled().await;
        Ok(AgentOutput::new("partial", ""))
    }
}

struct BrokenAgent;

#[async_trait]
impl Agent for BrokenAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Casual
    }

    fn name(&self) -> &str {
        "broken"
    }

    async fn process(&self, _request: AgentRequest<'_>, _memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        Err(AgentFailure::Model("upstream unavailable".into()))
    }
}

struct SourcesAgent;

#[async_trait]
impl Agent for SourcesAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Retrieval
    }

    fn name(&self) -> &str {
        "librarian"
    }

    async fn process(&self, _request: AgentRequest<'_>, _memory: &mut Memory) -> Result<AgentOutput, AgentFailure> {
        let artifacts = Artifacts {
            search: Some("refund policy".into()),
            sources: vec!["policy.md".into()],
        };
        Ok(AgentOutput::new("30 days", "").with_artifacts(artifacts))
    }
}

/// "code ..." goes to the coder, everything else to the casual agent.
struct PrefixRouter;

impl AgentRouter for PrefixRouter {
    fn select(&self, query: &str, available: &[AgentKind]) -> Option<AgentKind> {
        let kind = if query.starts_with("code") { AgentKind::Coder } else { AgentKind::Casual };
        available.contains(&kind).then_some(kind)
    }
}

/// Casual + coder echo agents, counting builds.
#[derive(Default)]
struct CountingFactory {
    builds: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl SessionFactory for CountingFactory {
    async fn build(&self, _id: &str) -> anyhow::Result<AgentRegistry> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AgentRegistry::new()
            .with_agent(ScriptedAgent::echo(AgentKind::Casual))
            .with_agent(ScriptedAgent::echo(AgentKind::Coder)))
    }
}

/// Fails its first build after a delay, succeeds afterwards.
#[derive(Default)]
struct FailOnceFactory {
    builds: AtomicUsize,
}

#[async_trait]
impl SessionFactory for FailOnceFactory {
    async fn build(&self, _id: &str) -> anyhow::Result<AgentRegistry> {
        if self.builds.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            anyhow::bail!("first build fails");
        }
        Ok(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)))
    }
}

struct FailingFactory;

#[async_trait]
impl SessionFactory for FailingFactory {
    async fn build(&self, _id: &str) -> anyhow::Result<AgentRegistry> {
        anyhow::bail!("model backend unreachable")
    }
}

/// Hands out one prepared registry per build.
struct FnFactory(Box<dyn Fn() -> AgentRegistry + Send + Sync>);

#[async_trait]
impl SessionFactory for FnFactory {
    async fn build(&self, _id: &str) -> anyhow::Result<AgentRegistry> {
        Ok((self.0)())
    }
}

#[derive(Default)]
struct CountingStore {
    saves: AtomicUsize,
}

#[async_trait]
impl MemoryStore for CountingStore {
    async fn load(&self, _cid: &str, _kind: AgentKind) -> sb_core::Result<Option<Memory>> {
        Ok(None)
    }

    async fn save(&self, _cid: &str, _kind: AgentKind, _memory: &Memory) -> sb_core::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn manager_with(factory: impl SessionFactory + 'static, router: impl AgentRouter + 'static) -> SessionManager {
    SessionManager::new(Arc::new(factory), Arc::new(router), &SessionConfig::default())
}

fn interaction(registry: AgentRegistry, router: impl AgentRouter + 'static) -> Interaction {
    Interaction::new("cid-1", registry, Arc::new(router))
}

fn auth() -> AuthContext {
    AuthContext::new("acme", "u1")
}

fn answer_of(outcome: ThinkOutcome) -> Option<String> {
    match outcome {
        ThinkOutcome::Answered(cycle) => cycle.answer,
        other => panic!("expected an answer, got {other:?}"),
    }
}

async fn wait_until_generating(interaction: &Interaction) {
    while !interaction.is_generating() {
        tokio::task::yield_now().await;
    }
}

// ========== Session Manager ==========

#[tokio::test]
async fn test_concurrent_get_or_create_builds_once() {
    let factory = Arc::new(CountingFactory { delay: Duration::from_millis(20), ..Default::default() });
    let manager = SessionManager::new(factory.clone(), Arc::new(PrefixRouter), &SessionConfig::default());

    let (a, b) = tokio::join!(manager.get_or_create("x"), manager.get_or_create("x"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    assert_eq!(manager.count(), 1);
}

#[tokio::test]
async fn test_get_or_create_reuses_existing() {
    let factory = Arc::new(CountingFactory::default());
    let manager = SessionManager::new(factory.clone(), Arc::new(PrefixRouter), &SessionConfig::default());

    let first = manager.get_or_create("x").await.unwrap();
    let second = manager.get_or_create("x").await.unwrap();
    let other = manager.get_or_create("y").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_get_does_not_construct() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);
    assert!(manager.get("nope").is_none());
    assert!(!manager.contains("nope"));
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_failed_construction_leaves_no_entry() {
    let manager = manager_with(FailingFactory, PrefixRouter);

    let err = manager.get_or_create("bad").await.err().unwrap();
    assert!(matches!(err, SbError::SessionConstruction { ref id, .. } if id == "bad"));
    assert_eq!(err.code(), "session_failure");
    assert!(err.to_string().contains("model backend unreachable"));
    assert!(!manager.contains("bad"));
    assert_eq!(manager.count(), 0);
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_failed_build_is_shared_by_waiters_then_retried() {
    let factory = Arc::new(FailOnceFactory::default());
    let manager = SessionManager::new(factory.clone(), Arc::new(PrefixRouter), &SessionConfig::default());

    let (a, b) = tokio::join!(manager.get_or_create("x"), manager.get_or_create("x"));
    assert!(a.is_err() && b.is_err());
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    assert!(!manager.contains("x"));

    let (c, d) = tokio::join!(manager.get_or_create("x"), manager.get_or_create("x"));
    let (c, d) = (c.unwrap(), d.unwrap());
    assert!(Arc::ptr_eq(&c, &d));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    assert_eq!(manager.count(), 1);
    assert!(Arc::ptr_eq(&manager.get("x").unwrap(), &c));
}

#[tokio::test(start_paused = true)]
async fn test_lookup_racing_eviction_never_returns_released_session() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);

    manager.get_or_create("x").await.unwrap();
    tokio::time::advance(Duration::from_secs(1801)).await;
    let (evicted, session) = tokio::join!(manager.evict_idle(), manager.get_or_create("x"));
    let session = session.unwrap();
    assert_eq!(evicted, 1);
    assert!(!session.is_released());
    assert!(Arc::ptr_eq(&manager.get("x").unwrap(), &session));

    tokio::time::advance(Duration::from_secs(1801)).await;
    let (session, evicted) = tokio::join!(manager.get_or_create("x"), manager.evict_idle());
    let session = session.unwrap();
    assert_eq!(evicted, 0);
    assert!(!session.is_released());
    assert!(Arc::ptr_eq(&manager.get("x").unwrap(), &session));
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_evicted_and_released_once() {
    let store = Arc::new(CountingStore::default());
    let manager = SessionManager::new(
        Arc::new(CountingFactory::default()),
        Arc::new(PrefixRouter),
        &SessionConfig::default(),
    )
    .with_store(store.clone());

    let session = manager.get_or_create("idle").await.unwrap();
    assert_eq!(manager.evict_idle().await, 0);

    tokio::time::advance(Duration::from_secs(1801)).await;
    assert_eq!(manager.evict_idle().await, 1);
    assert!(!manager.contains("idle"));
    assert!(session.is_released());
    // one save per agent
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);

    assert!(!session.release().await);
    assert_eq!(manager.evict_idle().await, 0);
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_access_refreshes_idle_clock() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);
    manager.get_or_create("warm").await.unwrap();

    tokio::time::advance(Duration::from_secs(1000)).await;
    manager.get_or_create("warm").await.unwrap();
    tokio::time::advance(Duration::from_secs(1000)).await;

    assert_eq!(manager.evict_idle().await, 0);
    assert!(manager.contains("warm"));
}

#[tokio::test(start_paused = true)]
async fn test_eviction_skips_generating_session() {
    let gate = Arc::new(Notify::new());
    let agent_gate = gate.clone();
    let factory = FnFactory(Box::new(move || {
        AgentRegistry::new().with_agent(GatedAgent {
            gate: agent_gate.clone(),
            active: Arc::default(),
            max_active: Arc::default(),
        })
    }));
    let manager = manager_with(factory, FixedRouter(Some(AgentKind::Casual)));
    let session = manager.get_or_create("busy").await.unwrap();

    let worker = session.clone();
    let cycle = tokio::spawn(async move { worker.think("hello", auth()).await });
    wait_until_generating(&session).await;

    tokio::time::advance(Duration::from_secs(4000)).await;
    assert_eq!(manager.evict_idle().await, 0);
    assert!(manager.contains("busy"));

    gate.notify_one();
    assert_eq!(answer_of(cycle.await.unwrap().unwrap()), Some("done".into()));
}

#[tokio::test]
async fn test_evicted_id_is_rebuilt_fresh() {
    let factory = Arc::new(CountingFactory::default());
    let manager = SessionManager::new(factory.clone(), Arc::new(PrefixRouter), &SessionConfig::default());

    let old = manager.get_or_create("x").await.unwrap();
    assert!(manager.remove("x").await);
    let new = manager.get_or_create("x").await.unwrap();

    assert!(!Arc::ptr_eq(&old, &new));
    assert!(old.is_released());
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_remove_unknown_is_false() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);
    assert!(!manager.remove("ghost").await);
}

#[tokio::test]
async fn test_shutdown_releases_all() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);
    let a = manager.get_or_create("a").await.unwrap();
    let b = manager.get_or_create("b").await.unwrap();

    assert_eq!(manager.shutdown().await, 2);
    assert_eq!(manager.count(), 0);
    assert!(a.is_released() && b.is_released());
}

#[tokio::test]
async fn test_list_sorted_by_id() {
    let manager = manager_with(CountingFactory::default(), PrefixRouter);
    for id in ["c", "a", "b"] {
        manager.get_or_create(id).await.unwrap();
    }
    let ids: Vec<String> = manager.list().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(manager.list().iter().all(|s| !s.generating));
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_and_stops() {
    let config = SessionConfig { timeout_secs: 10, sweep_interval_secs: 5, ..Default::default() };
    let manager = Arc::new(SessionManager::new(
        Arc::new(CountingFactory::default()),
        Arc::new(PrefixRouter),
        &config,
    ));
    manager.get_or_create("x").await.unwrap();

    let shutdown = sb_core::CancellationToken::new();
    let sweeper = manager.spawn_sweeper(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(manager.count(), 0);

    shutdown.cancel();
    sweeper.await.unwrap();
}

// ========== Think Cycle ==========

#[tokio::test]
async fn test_empty_query_rejected_without_state_change() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), PrefixRouter);
    let before = i.snapshot().await;

    assert_eq!(i.think("   ", auth()).await.unwrap(), ThinkOutcome::Rejected);

    let after = i.snapshot().await;
    assert_eq!(before, after);
    assert_eq!(after.last_answer, None);
    assert_eq!(after.current_agent, None);
    assert!(!after.is_generating);
}

#[tokio::test]
async fn test_answer_recorded() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::fixed(AgentKind::Casual, "Paris")), PrefixRouter);

    let outcome = i.think("capital of France?", auth()).await.unwrap();
    let ThinkOutcome::Answered(cycle) = outcome else { panic!("no answer") };
    assert_eq!(cycle.agent, AgentKind::Casual);
    assert_eq!(cycle.answer.as_deref(), Some("Paris"));
    assert_eq!(cycle.reasoning, "thought about it");
    assert!(!cycle.stopped);

    let snap = i.snapshot().await;
    assert_eq!(snap.last_query.as_deref(), Some("capital of France?"));
    assert_eq!(snap.last_answer.as_deref(), Some("Paris"));
    assert_eq!(snap.current_agent, Some(AgentKind::Casual));
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.cycles, 1);
}

#[tokio::test]
async fn test_duplicate_answer_suppressed() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::fixed(AgentKind::Casual, "Paris")), PrefixRouter);

    assert_eq!(answer_of(i.think("capital of France?", auth()).await.unwrap()), Some("Paris".into()));
    assert_eq!(answer_of(i.think("capital of France?", auth()).await.unwrap()), None);
    assert_eq!(i.snapshot().await.last_answer, None);
}

#[tokio::test]
async fn test_duplicate_answer_kept_when_policy_keeps() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::fixed(AgentKind::Casual, "Paris")), PrefixRouter)
        .with_duplicate_answers(DuplicateAnswerPolicy::Keep);

    i.think("capital of France?", auth()).await.unwrap();
    assert_eq!(answer_of(i.think("capital of France?", auth()).await.unwrap()), Some("Paris".into()));
}

#[tokio::test]
async fn test_concurrent_think_rejected_as_busy() {
    let gate = Arc::new(Notify::new());
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let agent = GatedAgent { gate: gate.clone(), active: active.clone(), max_active: max_active.clone() };
    let i = Arc::new(interaction(AgentRegistry::new().with_agent(agent), FixedRouter(Some(AgentKind::Casual))));

    let worker = i.clone();
    let first = tokio::spawn(async move { worker.think("one", auth()).await });
    wait_until_generating(&i).await;

    let err = i.think("two", auth()).await.unwrap_err();
    assert!(matches!(err, SbError::Busy { .. }));
    assert_eq!(err.code(), "busy");
    assert!(i.is_busy());

    gate.notify_one();
    assert_eq!(answer_of(first.await.unwrap().unwrap()), Some("done".into()));
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(i.snapshot().await.last_query.as_deref(), Some("one"));
}

#[tokio::test]
async fn test_readers_holding_session_do_not_make_think_busy() {
    let i = Arc::new(interaction(
        AgentRegistry::new().with_agent(ScriptedAgent::fixed(AgentKind::Casual, "hi")),
        FixedRouter(Some(AgentKind::Casual)),
    ));

    let held = i.session.lock().await;
    let worker = i.clone();
    let cycle = tokio::spawn(async move { worker.think("hello", auth()).await });
    while !i.is_busy() {
        tokio::task::yield_now().await;
    }
    assert!(matches!(i.think("again", auth()).await, Err(SbError::Busy { .. })));
    drop(held);

    assert_eq!(answer_of(cycle.await.unwrap().unwrap()), Some("hi".into()));
    assert!(!i.is_busy());
}

#[tokio::test]
async fn test_cancelled_caller_stops_cycle_before_it_starts() {
    let i = interaction(AgentRegistry::new().with_agent(PatientAgent), FixedRouter(Some(AgentKind::Coder)));
    let caller = sb_core::CancellationToken::new();
    caller.cancel();

    let ThinkOutcome::Answered(result) = i.think_until("long job", auth(), caller).await.unwrap() else {
        panic!("no answer")
    };
    assert!(result.stopped);
    assert_eq!(result.answer.as_deref(), Some("partial"));
}

#[tokio::test]
async fn test_agent_switch_hands_prior_answer_to_previous_agent() {
    let registry = AgentRegistry::new()
        .with_agent(ScriptedAgent::echo(AgentKind::Casual))
        .with_agent(ScriptedAgent::echo(AgentKind::Coder));
    let i = interaction(registry, PrefixRouter);

    i.think("hello", auth()).await.unwrap();
    i.think("code a parser", auth()).await.unwrap();

    let casual = i.memory(AgentKind::Casual).await.unwrap();
    let coder = i.memory(AgentKind::Coder).await.unwrap();
    assert_eq!(casual.last_of(Role::Assistant).map(|t| t.content.as_str()), Some("casual: hello"));
    assert!(coder.last_of(Role::Assistant).is_none());
    assert_eq!(i.snapshot().await.current_agent, Some(AgentKind::Coder));
}

#[tokio::test]
async fn test_same_agent_gets_no_handoff_turn() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), PrefixRouter);

    i.think("hello", auth()).await.unwrap();
    i.think("again", auth()).await.unwrap();

    let casual = i.memory(AgentKind::Casual).await.unwrap();
    assert!(casual.last_of(Role::Assistant).is_none());
    assert_eq!(casual.len(), 2);
}

#[tokio::test]
async fn test_no_agent_leaves_state_unchanged() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), FixedRouter(None));

    assert_eq!(i.think("anything", auth()).await.unwrap(), ThinkOutcome::NoAgent);
    let snap = i.snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.last_query, None);
    assert_eq!(snap.last_answer, None);
}

#[tokio::test]
async fn test_router_pick_outside_registry_is_no_agent() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), PrefixRouter);
    assert_eq!(i.think("code something", auth()).await.unwrap(), ThinkOutcome::NoAgent);
}

#[tokio::test]
async fn test_agent_failure_returns_to_idle() {
    let i = interaction(AgentRegistry::new().with_agent(BrokenAgent), FixedRouter(Some(AgentKind::Casual)));

    let err = i.think("hi", auth()).await.unwrap_err();
    assert!(matches!(err, SbError::Agent { kind: AgentKind::Casual, source: AgentFailure::Model(_) }));
    assert_eq!(err.code(), "agent_failure");

    let snap = i.snapshot().await;
    assert!(!snap.is_generating);
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.last_answer, None);
    assert!(!i.is_generating());
}

#[tokio::test]
async fn test_stop_cancels_running_cycle() {
    let i = Arc::new(interaction(AgentRegistry::new().with_agent(PatientAgent), FixedRouter(Some(AgentKind::Coder))));
    assert!(!i.stop());

    let worker = i.clone();
    let cycle = tokio::spawn(async move { worker.think("long job", auth()).await });
    wait_until_generating(&i).await;

    assert!(i.stop());
    let ThinkOutcome::Answered(result) = cycle.await.unwrap().unwrap() else { panic!("no answer") };
    assert!(result.stopped);
    assert_eq!(result.answer.as_deref(), Some("partial"));
}

#[tokio::test]
async fn test_artifacts_surface_in_cycle_and_snapshot() {
    let i = interaction(AgentRegistry::new().with_agent(SourcesAgent), FixedRouter(Some(AgentKind::Retrieval)));

    let ThinkOutcome::Answered(cycle) = i.think("refunds?", auth()).await.unwrap() else { panic!("no answer") };
    assert_eq!(cycle.artifacts.sources, vec!["policy.md".to_string()]);
    assert_eq!(i.snapshot().await.artifacts.search.as_deref(), Some("refund policy"));
}

#[tokio::test]
async fn test_released_session_refuses_cycles() {
    let i = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), PrefixRouter);
    assert!(i.release().await);
    let err = i.think("hello", auth()).await.unwrap_err();
    assert!(matches!(err, SbError::SessionNotFound { .. }));
}

#[tokio::test]
async fn test_default_agent_name() {
    let with_casual = interaction(AgentRegistry::new().with_agent(ScriptedAgent::echo(AgentKind::Casual)), PrefixRouter);
    let without = interaction(AgentRegistry::new().with_agent(PatientAgent), PrefixRouter);
    assert_eq!(with_casual.default_agent_name().await, "friday");
    assert_eq!(without.default_agent_name().await, "jarvis");
}

// ========== Registry ==========

#[test]
fn test_registry_replaces_same_kind_in_place() {
    let registry = AgentRegistry::new()
        .with_agent(ScriptedAgent::echo(AgentKind::Coder))
        .with_agent(ScriptedAgent::echo(AgentKind::Casual))
        .with_agent(ScriptedAgent::fixed(AgentKind::Coder, "x"));
    assert_eq!(registry.kinds(), vec![AgentKind::Coder, AgentKind::Casual]);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_registry_recover_skips_planner() {
    struct PlannerStub;

    #[async_trait]
    impl Agent for PlannerStub {
        fn kind(&self) -> AgentKind {
            AgentKind::Planner
        }
        fn name(&self) -> &str {
            "planner"
        }
        async fn process(&self, _r: AgentRequest<'_>, _m: &mut Memory) -> Result<AgentOutput, AgentFailure> {
            Ok(AgentOutput::default())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let store = FileMemoryStore::new(dir.path());
    let mut saved = Memory::new();
    saved.push(Role::User, "remember me");
    store.save("c1", AgentKind::Casual, &saved).await.unwrap();
    store.save("c1", AgentKind::Planner, &saved).await.unwrap();

    let mut registry = AgentRegistry::new()
        .with_agent(ScriptedAgent::echo(AgentKind::Casual))
        .with_agent(PlannerStub);
    assert_eq!(registry.recover(&store, "c1").await.unwrap(), 1);
    assert_eq!(registry.memory(AgentKind::Casual).unwrap().len(), 1);
    assert!(registry.memory(AgentKind::Planner).unwrap().is_empty());
}

// ========== Persistence ==========

#[tokio::test]
async fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileMemoryStore::new(dir.path());

    let mut memory = Memory::with_system_prompt("be brief");
    memory.push(Role::User, "hi");
    memory.push(Role::Assistant, "hello");
    store.save("conv-1", AgentKind::Casual, &memory).await.unwrap();

    let loaded = store.load("conv-1", AgentKind::Casual).await.unwrap().unwrap();
    assert_eq!(loaded, memory);
    assert!(dir.path().join("conv-1").join("casual.jsonl").exists());
}

#[tokio::test]
async fn test_file_store_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileMemoryStore::new(dir.path());
    assert!(store.load("nothing", AgentKind::Coder).await.unwrap().is_none());
}

#[test]
fn test_file_store_escapes_cid() {
    let store = FileMemoryStore::new("/data");
    let path = store.path_for("../etc/passwd", AgentKind::Files);
    assert_eq!(path, std::path::PathBuf::from("/data/%2E%2E%2Fetc%2Fpasswd/files.jsonl"));
    assert_eq!(store.path_for("conv-1", AgentKind::Casual), std::path::PathBuf::from("/data/conv-1/casual.jsonl"));
}

#[tokio::test]
async fn test_file_store_keeps_similar_cids_apart() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileMemoryStore::new(dir.path());

    let mut memory = Memory::default();
    memory.push(Role::User, "secret of conversation a/b");
    store.save("a/b", AgentKind::Casual, &memory).await.unwrap();

    for other in ["a_b", "a.b", "a%2Fb", "a-b"] {
        assert!(store.load(other, AgentKind::Casual).await.unwrap().is_none(), "{other}");
    }
    assert_eq!(store.load("a/b", AgentKind::Casual).await.unwrap().unwrap(), memory);

    let ids = ["a/b", "a_b", "a.b", "a%2Fb", "a b", ""];
    let paths: std::collections::HashSet<_> = ids.iter().map(|id| store.path_for(id, AgentKind::Casual)).collect();
    assert_eq!(paths.len(), ids.len());
}

// ========== Compression ==========

#[test]
fn test_compressor_under_budget_untouched() {
    let mut memory = Memory::with_system_prompt("sys");
    memory.push(Role::User, "q");
    assert_eq!(MemoryCompressor::new().compress(&mut memory), 0);
    assert_eq!(memory.len(), 2);
}

#[test]
fn test_compressor_keeps_prompt_and_recent_turns() {
    let mut memory = Memory::with_system_prompt("sys");
    for i in 0..10 {
        memory.push(Role::User, format!("question {i}"));
        memory.push(Role::Assistant, format!("answer {i}"));
    }
    let compressor = MemoryCompressor::new().with_max_turns(8);

    // body of 20 turns keeps 6
    assert_eq!(compressor.compress(&mut memory), 14);
    assert_eq!(memory.len(), 8);
    assert_eq!(memory.system_prompt(), Some("sys"));
    assert!(memory.turns()[1].content.starts_with("# Earlier Conversation"));
    assert_eq!(memory.last().unwrap().content, "answer 9");
}

#[test]
fn test_summary_truncates_long_topics() {
    let long = "x".repeat(80);
    let turns = vec![Turn::user(long), Turn::assistant("ok")];
    let summary = MemoryCompressor::new().generate_summary(&turns);
    assert!(summary.contains("1 user turns, 2 turns"));
    assert!(summary.contains(&format!("{}...", "x".repeat(50))));
}

// ========== Streaming ==========

#[test]
fn test_derived_conversation_id_is_deterministic() {
    let a = derive_conversation_id("u1", 1_700_000_000.25);
    let b = derive_conversation_id("u1", 1_700_000_000.25);
    let c = derive_conversation_id("u1", 1_700_000_001.25);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(uuid::Uuid::parse_str(&a).unwrap().get_version_num(), 5);
}

#[test]
fn test_explicit_cid_wins() {
    let request = QueryRequest::new("hi", "u1").with_cid("abc");
    assert_eq!(request.conversation_id(1.0), "abc");
    let blank = QueryRequest::new("hi", "u1").with_cid("  ");
    assert_eq!(blank.conversation_id(1.0), derive_conversation_id("u1", 1.0));
}

#[test]
fn test_query_request_collects_extras() {
    let request: QueryRequest = serde_json::from_str(
        r#"{"query":"q","uid":"u","org":"o","bot_key":"k","locale":"fr"}"#,
    )
    .unwrap();
    let auth = request.auth_context();
    assert_eq!(auth.bot_key.as_deref(), Some("k"));
    assert_eq!(auth.org, "o");
    assert_eq!(auth.extras.get("locale"), Some(&serde_json::json!("fr")));
}

#[test]
fn test_event_wire_format() {
    assert_eq!(StreamEvent::Running.to_ndjson(), "{\"status\":\"RUNNING\"}\n");

    let success = StreamEvent::Success {
        answer: None,
        thinking: "t".into(),
        end: 2,
        search: None,
        sources: vec![],
    };
    let value = serde_json::to_value(&success).unwrap();
    assert_eq!(value, serde_json::json!({"status": "SUCCESS", "answer": null, "thinking": "t", "end": 2}));

    let error = StreamEvent::failure(&SbError::NoAgent, 0);
    let value = serde_json::to_value(&error).unwrap();
    assert_eq!(value["status"], "ERROR");
    assert_eq!(value["code"], "no_agent");
    assert!(error.is_terminal());
}

#[tokio::test]
async fn test_stream_running_then_success() {
    let factory = FnFactory(Box::new(|| {
        AgentRegistry::new().with_agent(ScriptedAgent::fixed(AgentKind::Casual, "Paris"))
    }));
    let manager = Arc::new(manager_with(factory, PrefixRouter));
    let responder = StreamingResponder::new(manager.clone());

    let (cid, stream) = responder.respond(QueryRequest::new("capital of France?", "u1"));
    let events: Vec<StreamEvent> = stream.collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::Running);
    match &events[1] {
        StreamEvent::Success { answer, thinking, .. } => {
            assert_eq!(answer.as_deref(), Some("Paris"));
            assert_eq!(thinking, "thought about it");
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert!(manager.contains(&cid));
}

#[tokio::test]
async fn test_stream_includes_artifacts() {
    let factory = FnFactory(Box::new(|| AgentRegistry::new().with_agent(SourcesAgent)));
    let manager = Arc::new(manager_with(factory, FixedRouter(Some(AgentKind::Retrieval))));
    let responder = StreamingResponder::new(manager);

    let (_, stream) = responder.respond(QueryRequest::new("refunds?", "u1").with_cid("c"));
    let events: Vec<StreamEvent> = stream.collect().await;
    let StreamEvent::Success { search, sources, .. } = &events[1] else { panic!("expected success") };
    assert_eq!(search.as_deref(), Some("refund policy"));
    assert_eq!(sources, &vec!["policy.md".to_string()]);
}

#[tokio::test]
async fn test_stream_no_agent_error() {
    let manager = Arc::new(manager_with(CountingFactory::default(), FixedRouter(None)));
    let responder = StreamingResponder::new(manager.clone());

    let (cid, stream) = responder.respond(QueryRequest::new("capital of France?", "u1").with_cid("c-none"));
    let events: Vec<StreamEvent> = stream.collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::Running);
    assert!(matches!(&events[1], StreamEvent::Error { code, .. } if code == "no_agent"));

    let snap = manager.get(&cid).unwrap().snapshot().await;
    assert_eq!(snap.phase, Phase::Idle);
    assert_eq!(snap.last_answer, None);
}

#[tokio::test]
async fn test_stream_rejects_empty_query() {
    let manager = Arc::new(manager_with(CountingFactory::default(), PrefixRouter));
    let responder = StreamingResponder::new(manager);

    let (_, stream) = responder.respond(QueryRequest::new("", "u1"));
    let events: Vec<StreamEvent> = stream.collect().await;
    assert!(matches!(&events[1], StreamEvent::Error { code, .. } if code == "rejected"));
}

#[tokio::test]
async fn test_stream_reports_construction_failure() {
    let manager = Arc::new(manager_with(FailingFactory, PrefixRouter));
    let responder = StreamingResponder::new(manager.clone());

    let (cid, stream) = responder.respond(QueryRequest::new("hi", "u1"));
    let events: Vec<StreamEvent> = stream.collect().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1], StreamEvent::Error { code, .. } if code == "session_failure"));
    assert!(!manager.contains(&cid));
}

#[tokio::test]
async fn test_dropped_stream_stops_cycle() {
    let factory = FnFactory(Box::new(|| AgentRegistry::new().with_agent(PatientAgent)));
    let manager = Arc::new(manager_with(factory, FixedRouter(Some(AgentKind::Coder))));
    let responder = StreamingResponder::new(manager.clone());

    let (cid, mut stream) = responder.respond(QueryRequest::new("long job", "u1").with_cid("drop"));
    assert_eq!(stream.next().await, Some(StreamEvent::Running));

    let session = loop {
        if let Some(session) = manager.get(&cid) {
            break session;
        }
        tokio::task::yield_now().await;
    };
    wait_until_generating(&session).await;
    drop(stream);

    // the patient agent only returns once stopped
    while session.is_generating() {
        tokio::task::yield_now().await;
    }
    assert_eq!(session.snapshot().await.last_answer.as_deref(), Some("partial"));
}

#[tokio::test]
async fn test_stream_dropped_before_cycle_starts_stops_it() {
    let factory = FnFactory(Box::new(|| AgentRegistry::new().with_agent(PatientAgent)));
    let manager = Arc::new(manager_with(factory, FixedRouter(Some(AgentKind::Coder))));
    let responder = StreamingResponder::new(manager.clone());

    let (cid, mut stream) = responder.respond(QueryRequest::new("long job", "u1").with_cid("early"));
    assert_eq!(stream.next().await, Some(StreamEvent::Running));
    drop(stream);

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(session) = manager.get(&cid) {
                let snapshot = session.snapshot().await;
                if snapshot.cycles == 1 {
                    break snapshot;
                }
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(finished.last_answer.as_deref(), Some("partial"));
}
