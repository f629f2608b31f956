use cg_domain::config::{Config, ConfigSeverity};

/// Lines describing every config issue plus a totals line, and whether the
/// config is usable (no errors; warnings are fine).
pub fn report(config: &Config, config_path: &str) -> (Vec<String>, bool) {
    let issues = config.validate();
    if issues.is_empty() {
        return (vec![format!("Config OK ({config_path})")], true);
    }

    let errors = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warnings = issues.len() - errors;

    let mut lines: Vec<String> = issues.iter().map(ToString::to_string).collect();
    lines.push(format!(
        "\n{errors} error(s), {warnings} warning(s) in {config_path}"
    ));
    (lines, errors == 0)
}

/// `concierge config validate`. Returns `false` when errors were found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let (lines, ok) = report(config, config_path);
    for line in lines {
        println!("{line}");
    }
    ok
}

/// `concierge config show`: the resolved config with defaults filled in.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}
