//! Teardown flows end-to-end: provider plans, retries, confirmation gates

use std::time::Duration;

use capstan::config::Config;
use capstan::deploy::interaction::mocks::MockUserInteraction;
use capstan::deploy::{
    confirm_destroy, confirm_reset, RetryPolicy, TeardownCoordinator,
};
use capstan::providers;
use capstan::subprocess::SubprocessManager;

fn fast_coordinator() -> TeardownCoordinator {
    TeardownCoordinator::new(RetryPolicy {
        max_attempts: 5,
        backoff_unit: Duration::from_millis(1),
    })
}

#[tokio::test]
async fn test_local_reset_continues_past_stubborn_stack() {
    let (subprocess, mut mock) = SubprocessManager::mock();
    // The volume teardown succeeds, the plain stack teardown never does
    mock.expect_command("docker")
        .with_args(|args| args.iter().any(|a| a == "--volumes"))
        .finish();
    mock.expect_command("docker")
        .returns_stderr("error while removing network: network capstan_default has active endpoints")
        .returns_exit_code(1)
        .finish();

    let config = Config::default();
    let plans = providers::reset_plans("local", &config, &subprocess).unwrap();
    assert_eq!(plans.len(), 2);

    let interaction = MockUserInteraction::new();
    let report = fast_coordinator().run(&plans, &interaction).await;

    assert!(!report.is_clean());
    assert_eq!(report.failed_kinds(), vec!["application stack"]);
    // The failing kind exhausted its retries, the next kind still ran
    assert_eq!(report.outcomes[0].attempts, 5);
    assert!(report.outcomes[1].succeeded());

    let messages = interaction.messages();
    assert!(messages
        .iter()
        .any(|m| m.starts_with("WARN") && m.contains("manual cleanup")));
}

#[tokio::test]
async fn test_ssh_destroy_declined_runs_nothing() {
    let (subprocess, mock) = SubprocessManager::mock();
    let mut config = Config::default();
    config.ssh.host = "203.0.113.7".to_string();

    let plans = providers::destroy_plans("ssh", &config, &subprocess).unwrap();
    let interaction = MockUserInteraction::new();
    interaction.add_yes_no_response(false);

    let kinds: Vec<&str> = plans.iter().map(|p| p.kind.as_str()).collect();
    let confirmed = confirm_destroy(&interaction, "capstan", &kinds).await.unwrap();
    assert!(!confirmed);
    assert_eq!(mock.calls_to("ssh"), 0);
}

#[tokio::test]
async fn test_reset_demands_second_gate() {
    let interaction = MockUserInteraction::new();
    interaction.add_yes_no_response(true);
    interaction.add_phrase_response(false);

    assert!(!confirm_reset(&interaction, "capstan").await.unwrap());

    // Both prompts were actually issued
    let messages = interaction.messages();
    assert!(messages.iter().any(|m| m.starts_with("PROMPT")));
    assert!(messages.iter().any(|m| m.starts_with("PHRASE")));
}

#[tokio::test]
async fn test_destroy_happy_path_reports_each_kind() {
    let (subprocess, mut mock) = SubprocessManager::mock();
    mock.expect_command("docker").finish();

    let config = Config::default();
    let plans = providers::destroy_plans("local", &config, &subprocess).unwrap();

    let interaction = MockUserInteraction::new();
    let report = fast_coordinator().run(&plans, &interaction).await;

    assert!(report.is_clean());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].attempts, 1);
    assert!(interaction
        .messages()
        .iter()
        .any(|m| m.contains("application stack removed")));
}
