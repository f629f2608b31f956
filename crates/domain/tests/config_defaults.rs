use cg_domain::config::{Config, ConfigSeverity, MissingCorrelationId};

#[test]
fn default_limits_match_loop_contract() {
    let config = Config::default();
    assert_eq!(config.orchestrator.max_iterations, 30);
    assert_eq!(config.orchestrator.max_execution_secs, 60);
    assert_eq!(config.sessions.memory_window, 10);
}

#[test]
fn default_correlation_policy_is_null() {
    let config = Config::default();
    assert_eq!(
        config.orchestrator.missing_correlation_id,
        MissingCorrelationId::Null
    );
}

#[test]
fn zero_correlation_policy_parses() {
    let toml_str = r#"
[orchestrator]
missing_correlation_id = "zero"
max_iterations = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(
        config.orchestrator.missing_correlation_id,
        MissingCorrelationId::Zero
    );
    assert_eq!(config.orchestrator.max_iterations, 5);
    assert_eq!(config.orchestrator.max_execution_secs, 60);
}

#[test]
fn default_knows_every_builtin_kind() {
    let config = Config::default();
    assert_eq!(
        config.capabilities.kinds,
        vec!["home_assistant", "duckduckgo", "googlesearch", "movies"]
    );
}

#[test]
fn home_assistant_filters_parse() {
    let toml_str = r#"
[capabilities]
kinds = ["home_assistant"]

[capabilities.home_assistant]
allowed_domains = ["person"]
entity_ids = ["light.studio_led", "lock.nuki_lock"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.capabilities.kinds, vec!["home_assistant"]);
    assert_eq!(config.capabilities.home_assistant.allowed_domains, vec!["person"]);
    assert_eq!(config.capabilities.home_assistant.entity_ids.len(), 2);
}

#[test]
fn default_config_is_valid() {
    let issues = Config::default().validate();
    assert!(
        issues.iter().all(|i| i.severity != ConfigSeverity::Error),
        "unexpected errors: {issues:?}"
    );
}

#[test]
fn zero_iterations_is_an_error() {
    let mut config = Config::default();
    config.orchestrator.max_iterations = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "orchestrator.max_iterations" && i.severity == ConfigSeverity::Error));
}

#[test]
fn unknown_kind_is_an_error() {
    let mut config = Config::default();
    config.capabilities.kinds.push("teleporter".into());
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "capabilities.kinds[4]" && i.message.contains("teleporter")));
}

#[test]
fn plaintext_key_is_warned() {
    let mut config = Config::default();
    config.llm.api_key = Some("sk-test".into());
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "llm.api_key" && i.severity == ConfigSeverity::Warning));
}
