use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::time::Instant;

use crate::agent::*;
use crate::cli::*;
use crate::completion::*;
use crate::config::*;
use crate::credentials::*;
use crate::error::*;
use crate::orchestrator::*;
use crate::output::*;
use crate::roster::*;
use crate::runtime::*;
use crate::telemetry::*;

struct ScriptedAgent {
    name: String,
    delay: Duration,
    reply: Result<String, String>,
}

impl ScriptedAgent {
    fn ok(name: &str, delay_ms: u64, text: &str) -> Arc<dyn AgentCapability> {
        Arc::new(Self {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
            reply: Ok(text.to_string()),
        })
    }

    fn failing(name: &str, delay_ms: u64, message: &str) -> Arc<dyn AgentCapability> {
        Arc::new(Self {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
            reply: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl AgentCapability for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test agent"
    }

    async fn invoke(&self, _task: &str) -> Result<String, OrchestrationError> {
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(OrchestrationError::AgentInvocation {
                agent: self.name.clone(),
                message: message.clone(),
            }),
        }
    }
}

fn base_cfg() -> RuntimeConfig {
    RuntimeConfig {
        profile: "default".to_string(),
        config_path: ".ensemble/config.toml".to_string(),
        completion: None,
        remote: None,
        agents: Vec::new(),
        timeout_secs: DEFAULT_TIMEOUT_SECS,
        telemetry_enabled: false,
        telemetry_path: ".ensemble/test-telemetry.jsonl".to_string(),
    }
}

fn test_cli(config_path: &str, profile: &str) -> Cli {
    Cli {
        profile: profile.to_string(),
        config_path: config_path.to_string(),
        endpoint: None,
        deployment: None,
        api_key_env: None,
        remote_endpoint: None,
        remote_agent_id: None,
        remote_token_env: None,
        timeout_secs: None,
        telemetry_enabled: None,
        telemetry_path: None,
        log_filter: "error".to_string(),
        command: None,
    }
}

async fn started_runtime() -> Runtime {
    let runtime = Runtime::new();
    runtime.start().expect("runtime should start");
    runtime
}

#[tokio::test]
async fn orchestration_yields_one_attributed_slot_per_member() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("analyst", 0, "analysis"),
        ScriptedAgent::ok("skeptic", 0, "doubts"),
        ScriptedAgent::ok("hosted", 0, "remote view"),
    ])
    .expect("orchestration should build");

    let runtime = started_runtime().await;
    let run = orchestration
        .invoke("plan the rollout", &runtime)
        .expect("invoke should dispatch");
    assert_eq!(run.member_count(), 3);

    let outcomes = run
        .get(Duration::from_secs(5))
        .await
        .expect("retrieval should succeed");

    assert_eq!(outcomes.len(), 3);
    let names = outcomes
        .iter()
        .map(|outcome| outcome.agent.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(names, vec!["analyst", "skeptic", "hosted"]);
    assert_eq!(
        outcomes[0].response().map(|r| r.content),
        Some("analysis".to_string())
    );

    runtime
        .stop_when_idle()
        .await
        .expect("runtime should drain");
}

#[tokio::test]
async fn outcomes_follow_registration_order_not_completion_order() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("slow-first", 120, "late"),
        ScriptedAgent::ok("fast-second", 0, "early"),
    ])
    .expect("orchestration should build");

    let runtime = started_runtime().await;
    let outcomes = orchestration
        .invoke("task", &runtime)
        .expect("invoke should dispatch")
        .get(Duration::from_secs(5))
        .await
        .expect("retrieval should succeed");

    assert_eq!(outcomes[0].agent, "slow-first");
    assert_eq!(outcomes[1].agent, "fast-second");
}

#[tokio::test]
async fn fan_out_latency_tracks_slowest_member_not_sum() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("a", 100, "one"),
        ScriptedAgent::ok("b", 150, "two"),
        ScriptedAgent::ok("c", 50, "three"),
    ])
    .expect("orchestration should build");

    let runtime = started_runtime().await;
    let started = Instant::now();
    let outcomes = orchestration
        .invoke("task", &runtime)
        .expect("invoke should dispatch")
        .get(Duration::from_secs(5))
        .await
        .expect("retrieval should succeed");
    let elapsed = started.elapsed();

    assert_eq!(outcomes.len(), 3);
    assert!(
        elapsed >= Duration::from_millis(140),
        "total should be bounded below by the slowest member, got {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(280),
        "members should run concurrently, not sequentially, got {elapsed:?}"
    );
}

#[tokio::test]
async fn timeout_fails_retrieval_and_names_pending_members() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("quick", 10, "done"),
        ScriptedAgent::ok("stuck", 10_000, "never"),
    ])
    .expect("orchestration should build");

    let runtime = started_runtime().await;
    let err = orchestration
        .invoke("task", &runtime)
        .expect("invoke should dispatch")
        .get(Duration::from_millis(100))
        .await
        .expect_err("retrieval should time out");

    match err {
        OrchestrationError::Timeout { pending, .. } => {
            assert_eq!(pending, vec!["stuck".to_string()]);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    // Aborted members must still drain; stop_when_idle cannot hang.
    tokio::time::timeout(Duration::from_secs(1), runtime.stop_when_idle())
        .await
        .expect("drain should not wait on aborted members")
        .expect("runtime should stop");
    assert_eq!(runtime.state(), RuntimeState::Stopped);
}

#[tokio::test]
async fn member_failure_is_recorded_in_its_slot_without_aborting_the_run() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::failing("flaky", 0, "connection reset"),
        ScriptedAgent::ok("steady", 0, "all good"),
    ])
    .expect("orchestration should build");

    let runtime = started_runtime().await;
    let outcomes = orchestration
        .invoke("task", &runtime)
        .expect("invoke should dispatch")
        .get(Duration::from_secs(5))
        .await
        .expect("retrieval should degrade gracefully, not fail");

    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].is_success());
    match &outcomes[0].result {
        Err(OrchestrationError::AgentInvocation { agent, message }) => {
            assert_eq!(agent, "flaky");
            assert!(message.contains("connection reset"));
        }
        other => panic!("expected AgentInvocation, got {other:?}"),
    }
    assert_eq!(
        outcomes[1].response().map(|r| r.content),
        Some("all good".to_string())
    );
}

#[tokio::test]
async fn duplicate_member_names_fail_at_construction() {
    let err = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("twin", 0, "first"),
        ScriptedAgent::ok("twin", 0, "second"),
    ])
    .map(|_| ())
    .expect_err("duplicate names should be rejected");

    match err {
        OrchestrationError::Configuration(message) => {
            assert!(message.contains("twin"), "message should name the duplicate");
        }
        other => panic!("expected Configuration, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_member_set_fails_at_construction() {
    let err = ConcurrentOrchestration::new(Vec::new())
        .map(|_| ())
        .expect_err("empty member set should be rejected");
    assert!(matches!(err, OrchestrationError::Configuration(_)));
}

#[tokio::test]
async fn empty_task_fails_before_dispatch() {
    let orchestration = ConcurrentOrchestration::new(vec![ScriptedAgent::ok("only", 0, "text")])
        .expect("orchestration should build");
    let runtime = started_runtime().await;

    let err = orchestration
        .invoke("   ", &runtime)
        .map(|_| ())
        .expect_err("blank task should be rejected");
    assert!(matches!(err, OrchestrationError::Configuration(_)));
    assert_eq!(runtime.outstanding(), 0, "nothing should have been scheduled");
}

#[tokio::test]
async fn repeated_invocations_are_independent_runs() {
    let orchestration = ConcurrentOrchestration::new(vec![
        ScriptedAgent::ok("analyst", 0, "same answer"),
        ScriptedAgent::ok("skeptic", 0, "same doubts"),
    ])
    .expect("orchestration should build");
    let runtime = started_runtime().await;

    let first = orchestration
        .invoke("task", &runtime)
        .expect("first invoke should dispatch")
        .get(Duration::from_secs(5))
        .await
        .expect("first retrieval should succeed");
    let second = orchestration
        .invoke("task", &runtime)
        .expect("second invoke should dispatch")
        .get(Duration::from_secs(5))
        .await
        .expect("second retrieval should succeed");

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.agent, b.agent);
        assert_eq!(a.response(), b.response());
    }
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test]
async fn invoke_before_runtime_start_fails_with_runtime_not_ready() {
    let orchestration = ConcurrentOrchestration::new(vec![ScriptedAgent::ok("only", 0, "text")])
        .expect("orchestration should build");
    let runtime = Runtime::new();

    let err = orchestration
        .invoke("task", &runtime)
        .map(|_| ())
        .expect_err("invoke without start should fail");
    assert_eq!(
        err,
        OrchestrationError::RuntimeNotReady {
            state: RuntimeState::NotStarted
        }
    );
}

#[tokio::test]
async fn runtime_lifecycle_gates_scheduling() {
    let runtime = Runtime::new();
    assert_eq!(runtime.state(), RuntimeState::NotStarted);
    assert!(runtime.schedule(async { 1 }).is_err());

    runtime.start().expect("runtime should start");
    assert_eq!(runtime.state(), RuntimeState::Running);
    let mut handle = runtime
        .schedule(async { 41 + 1 })
        .expect("schedule should succeed while running");
    assert_eq!(handle.join().await.expect("task should join"), 42);

    runtime
        .stop_when_idle()
        .await
        .expect("runtime should drain");
    assert_eq!(runtime.state(), RuntimeState::Stopped);

    let err = runtime
        .schedule(async { 0 })
        .map(|_| ())
        .expect_err("schedule after stop should fail");
    assert_eq!(
        err,
        OrchestrationError::RuntimeNotReady {
            state: RuntimeState::Stopped
        }
    );
    assert!(runtime.start().is_err(), "stopped runtime must not restart");
}

#[tokio::test]
async fn runtime_drains_aborted_tasks() {
    let runtime = started_runtime().await;
    let handle = runtime
        .schedule(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .expect("schedule should succeed");
    assert_eq!(runtime.outstanding(), 1);

    handle.abort();
    tokio::time::timeout(Duration::from_secs(1), runtime.stop_when_idle())
        .await
        .expect("drain should observe the aborted task")
        .expect("runtime should stop");
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test]
async fn stop_when_idle_waits_for_concurrently_admitted_tasks() {
    let runtime = Arc::new(started_runtime().await);

    let mut attempts = Vec::new();
    for _ in 0..64 {
        let runtime = runtime.clone();
        attempts.push(tokio::spawn(async move {
            runtime.schedule(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
        }));
    }
    let stopper = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.stop_when_idle().await })
    };

    let mut admitted = Vec::new();
    for attempt in attempts {
        // Attempts racing the drain may be rejected with RuntimeNotReady;
        // only admitted tasks must be covered by the drain.
        if let Ok(Ok(handle)) = attempt.await {
            admitted.push(handle);
        }
    }
    stopper
        .await
        .expect("stopper task should join")
        .expect("runtime should stop");

    assert_eq!(runtime.state(), RuntimeState::Stopped);
    assert_eq!(runtime.outstanding(), 0);
    for handle in &admitted {
        assert!(
            handle.is_finished(),
            "stop_when_idle returned before an admitted task finished"
        );
    }
}

#[tokio::test]
async fn remote_auth_failure_keeps_local_members_in_the_roster() {
    let mut cfg = base_cfg();
    cfg.agents = vec![LocalAgentEntry {
        name: "analyst".to_string(),
        source: AgentSource::Implicit,
        description: "Answers directly".to_string(),
        instructions: "Answer the task directly.".to_string(),
    }];
    cfg.completion = Some(CompletionSettings {
        endpoint: "https://example.openai.azure.com".to_string(),
        deployment: "gpt-4o".to_string(),
        // Any always-set env var serves as the key source; no request is
        // issued during roster construction.
        api_key_env: "PATH".to_string(),
        api_version: None,
    });
    cfg.remote = Some(RemoteSettings {
        endpoint: "https://agents.example.com".to_string(),
        agent_id: "asst_123".to_string(),
        agent_name: "hosted".to_string(),
        token_env: "ENSEMBLE_TEST_UNSET_ROSTER_TOKEN".to_string(),
    });

    let members = build_members(&cfg)
        .await
        .expect("local members should survive a remote credential failure");
    let names = members
        .iter()
        .map(|member| member.name())
        .collect::<Vec<&str>>();
    assert_eq!(names, vec!["analyst", "hosted"]);

    let err = members[1]
        .invoke("task")
        .await
        .expect_err("unavailable remote member should fail its own slot");
    assert!(matches!(err, OrchestrationError::Authentication(_)));
}

#[test]
fn profile_overlay_resolves_completion_and_remote_settings() {
    let dir = tempdir().expect("temp directory should create");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[profiles.staging]
endpoint = "https://staging.example.com"
deployment = "gpt-4o"
api_key_env = "STAGING_COMPLETION_KEY"
remote_endpoint = "https://agents.example.com"
remote_agent_id = "asst_123"
remote_agent_name = "orders"
timeout_secs = 45
"#,
    )
    .expect("config should write");

    let config_path = config_path.to_string_lossy().to_string();
    let profiles = load_profiles(&config_path).expect("profiles should load");
    let cli = test_cli(&config_path, "staging");
    let cfg =
        resolve_runtime_config(&cli, &profiles, Vec::new()).expect("config should resolve");

    let completion = cfg.completion.expect("completion settings should resolve");
    assert_eq!(completion.endpoint, "https://staging.example.com");
    assert_eq!(completion.deployment, "gpt-4o");
    assert_eq!(completion.api_key_env, "STAGING_COMPLETION_KEY");

    let remote = cfg.remote.expect("remote settings should resolve");
    assert_eq!(remote.agent_id, "asst_123");
    assert_eq!(remote.agent_name, "orders");
    assert_eq!(remote.token_env, "ENSEMBLE_REMOTE_TOKEN");
    assert_eq!(cfg.timeout_secs, 45);
}

#[test]
fn unknown_profile_fails_and_lists_available_profiles() {
    let dir = tempdir().expect("temp directory should create");
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[profiles.alpha]\ntimeout_secs = 5\n")
        .expect("config should write");

    let config_path = config_path.to_string_lossy().to_string();
    let profiles = load_profiles(&config_path).expect("profiles should load");
    let cli = test_cli(&config_path, "missing");

    let err = resolve_runtime_config(&cli, &profiles, Vec::new())
        .expect_err("unknown profile should fail");
    match err {
        OrchestrationError::Configuration(message) => {
            assert!(message.contains("alpha"), "message should list profiles");
        }
        other => panic!("expected Configuration, got {other:?}"),
    }
}

#[test]
fn partial_completion_settings_fail_at_resolution() {
    let profiles = ProfilesFile::default();
    let mut cli = test_cli(".ensemble/config.toml", "default");
    cli.endpoint = Some("https://example.com".to_string());

    let err = resolve_runtime_config(&cli, &profiles, Vec::new())
        .expect_err("endpoint without deployment should fail");
    assert!(matches!(err, OrchestrationError::Configuration(_)));
}

#[test]
fn partial_remote_settings_fail_at_resolution() {
    let profiles = ProfilesFile::default();
    let mut cli = test_cli(".ensemble/config.toml", "default");
    cli.remote_agent_id = Some("asst_123".to_string());

    let err = resolve_runtime_config(&cli, &profiles, Vec::new())
        .expect_err("agent id without endpoint should fail");
    assert!(matches!(err, OrchestrationError::Configuration(_)));
}

#[test]
fn local_catalog_overrides_implicit_agents_and_disables_entries() {
    let dir = tempdir().expect("temp directory should create");
    let catalog = dir.path().join("agents.toml");
    std::fs::write(
        &catalog,
        r#"
[agents.analyst]
description = "Project-specific analyst"
instructions = "Answer with this project's conventions in mind."

[agents.skeptic]
enabled = false
instructions = "unused"

[agents.menu]
instructions = "Suggest menu options that match the order."
"#,
    )
    .expect("catalog should write");

    let paths = AgentPaths {
        local_catalog: catalog,
        global_catalog: None,
    };
    let entries = load_local_agent_entries(&paths).expect("entries should resolve");

    let names = entries
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(names, vec!["analyst", "menu"]);
    assert_eq!(entries[0].source, AgentSource::Local);
    assert_eq!(entries[0].description, "Project-specific analyst");
    assert_eq!(entries[1].source, AgentSource::Local);
}

#[test]
fn implicit_agents_are_available_without_catalog_files() {
    let dir = tempdir().expect("temp directory should create");
    let paths = AgentPaths {
        local_catalog: dir.path().join("does-not-exist.toml"),
        global_catalog: None,
    };
    let entries = load_local_agent_entries(&paths).expect("entries should resolve");

    let names = entries
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(names, vec!["analyst", "skeptic"]);
    assert!(entries.iter().all(|entry| entry.source == AgentSource::Implicit));
}

#[test]
fn catalog_agent_without_instructions_fails_configuration() {
    let dir = tempdir().expect("temp directory should create");
    let catalog = dir.path().join("agents.toml");
    std::fs::write(&catalog, "[agents.mute]\ndescription = \"no text\"\n")
        .expect("catalog should write");

    let paths = AgentPaths {
        local_catalog: catalog,
        global_catalog: None,
    };
    let err = load_local_agent_entries(&paths).expect_err("missing instructions should fail");
    match err {
        OrchestrationError::Configuration(message) => {
            assert!(message.contains("mute"));
            assert!(message.contains("instructions"));
        }
        other => panic!("expected Configuration, got {other:?}"),
    }
}

#[test]
fn missing_credential_env_is_an_authentication_error() {
    let err = resolve_remote_credential("ENSEMBLE_TEST_UNSET_TOKEN")
        .expect_err("unset credential env should fail");
    assert!(matches!(err, OrchestrationError::Authentication(_)));
}

#[test]
fn blank_credential_token_is_rejected() {
    let err = Credential::new("   ").expect_err("blank token should be rejected");
    assert!(matches!(err, OrchestrationError::Authentication(_)));
    let credential = Credential::new("tok-123").expect("token should be accepted");
    assert_eq!(credential.secret(), "tok-123");
    assert_eq!(format!("{credential:?}"), "Credential([REDACTED])");
}

#[test]
fn missing_completion_api_key_is_a_configuration_error() {
    let settings = CompletionSettings {
        endpoint: "https://example.com".to_string(),
        deployment: "gpt-4o".to_string(),
        api_key_env: "ENSEMBLE_TEST_UNSET_KEY".to_string(),
        api_version: None,
    };
    let err = settings.api_key().expect_err("unset key env should fail");
    assert!(matches!(err, OrchestrationError::Configuration(_)));
}

#[test]
fn error_categories_map_to_codes_and_hints() {
    let cases: Vec<(anyhow::Error, &str)> = vec![
        (
            OrchestrationError::Configuration("bad".to_string()).into(),
            "CONFIG",
        ),
        (
            OrchestrationError::Authentication("expired".to_string()).into(),
            "AUTH",
        ),
        (
            OrchestrationError::AgentInvocation {
                agent: "analyst".to_string(),
                message: "503".to_string(),
            }
            .into(),
            "AGENT",
        ),
        (
            OrchestrationError::Timeout {
                waited: Duration::from_secs(20),
                pending: vec!["stuck".to_string()],
            }
            .into(),
            "TIMEOUT",
        ),
        (
            OrchestrationError::RuntimeNotReady {
                state: RuntimeState::NotStarted,
            }
            .into(),
            "RUNTIME",
        ),
        (anyhow::anyhow!("something else"), "INTERNAL"),
    ];

    for (err, code) in cases {
        let formatted = format_cli_error(&err);
        assert!(
            formatted.starts_with(&format!("[{code}]")),
            "expected code {code} in '{formatted}'"
        );
        assert!(formatted.contains("Hint:"), "hint missing in '{formatted}'");
    }
}

#[test]
fn rendered_outcomes_prefix_agent_names() {
    let ok = AgentOutcome {
        agent: "analyst".to_string(),
        result: Ok("looks fine".to_string()),
    };
    assert_eq!(render_outcome(&ok), "# analyst:\n looks fine\n");

    let failed = AgentOutcome {
        agent: "flaky".to_string(),
        result: Err(OrchestrationError::AgentInvocation {
            agent: "flaky".to_string(),
            message: "connection reset".to_string(),
        }),
    };
    let rendered = render_outcome(&failed);
    assert!(rendered.starts_with("# flaky:\n [failed]"));
    assert!(rendered.contains("connection reset"));
}

#[test]
fn completion_text_extraction_handles_standard_and_empty_payloads() {
    let payload = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": "  Hello there.  "}}]
    });
    assert_eq!(
        extract_completion_text(&payload).expect("content should extract"),
        "Hello there."
    );

    let empty = serde_json::json!({"choices": []});
    assert!(extract_completion_text(&empty).is_err());

    let blank = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": "   "}}]
    });
    assert!(extract_completion_text(&blank).is_err());
}

#[test]
fn telemetry_sink_appends_jsonl_records() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("events.jsonl");

    let mut cfg = base_cfg();
    cfg.telemetry_enabled = true;
    cfg.telemetry_path = path.to_string_lossy().to_string();

    let sink = TelemetrySink::new(&cfg, "ask".to_string());
    sink.emit(
        "orchestration.dispatched",
        serde_json::json!({ "members": ["analyst"] }),
    );
    sink.emit("command.completed", serde_json::json!({}));

    let content = std::fs::read_to_string(&path).expect("telemetry file should exist");
    let lines = content.lines().collect::<Vec<&str>>();
    assert_eq!(lines.len(), 2);
    let first = serde_json::from_str::<serde_json::Value>(lines[0])
        .expect("telemetry line should be valid JSON");
    assert_eq!(first["event"], "orchestration.dispatched");
    assert_eq!(first["command"], "ask");
    assert_eq!(first["profile"], "default");
}

#[test]
fn disabled_telemetry_sink_writes_nothing() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("events.jsonl");

    let mut cfg = base_cfg();
    cfg.telemetry_path = path.to_string_lossy().to_string();

    let sink = TelemetrySink::new(&cfg, "ask".to_string());
    sink.emit("command.completed", serde_json::json!({}));
    assert!(!path.exists(), "disabled sink must not create the file");
}
