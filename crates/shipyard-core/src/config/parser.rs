//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use super::schema::ShipyardConfig;

/// Parse shipyard.toml with detailed error messages
pub fn parse_shipyard_toml(path: &Path) -> Result<ShipyardConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_shipyard_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse shipyard.toml content from string
pub fn parse_shipyard_toml_str(content: &str) -> Result<ShipyardConfig> {
    let config: ShipyardConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    validate_config(&config)?;

    Ok(config)
}

pub fn to_toml(config: &ShipyardConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config to TOML")
}

/// Point at the offending line when the parser reports a span
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    match error.span() {
        Some(span) => {
            let line_num = content[..span.start.min(content.len())]
                .matches('\n')
                .count()
                + 1;
            anyhow::anyhow!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num,
                get_line_context(content, line_num),
                message
            )
        }
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let n = start + i + 1;
            let marker = if n == line_num { ">" } else { " " };
            format!("{} {:4} | {}", marker, n, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn validate_config(config: &ShipyardConfig) -> Result<()> {
    if config.deploy.script_timeout_secs == Some(0) {
        anyhow::bail!("deploy.script_timeout_secs must be greater than zero");
    }
    if config.verify.timeout_secs == Some(0) {
        anyhow::bail!("verify.timeout_secs must be greater than zero");
    }
    if config.deploy.max_log_bytes == Some(0) {
        anyhow::bail!("deploy.max_log_bytes must be greater than zero");
    }
    if let Some(endpoints) = &config.verify.endpoints {
        for endpoint in endpoints {
            parse_endpoint(endpoint)?;
        }
    }
    Ok(())
}

/// Parse a health endpoint; only http and https are probed.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid endpoint URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("Unsupported endpoint scheme '{}' in {}", other, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = parse_shipyard_toml_str(
            r#"
            target_root = "/var/www/app"

            [deploy]
            script_timeout_secs = 60

            [verify]
            endpoints = ["https://app.example.com/health", "http://localhost:8080/"]
            auto_rollback = true

            [snapshots]
            keep = 3
            "#,
        )
        .unwrap();

        assert_eq!(
            config.target_root.as_deref(),
            Some(Path::new("/var/www/app"))
        );
        assert_eq!(config.deploy.script_timeout_secs, Some(60));
        assert_eq!(config.verify.endpoints.as_ref().map(Vec::len), Some(2));
        assert_eq!(config.verify.auto_rollback, Some(true));
        assert_eq!(config.snapshots.keep, Some(3));
    }

    #[test]
    fn empty_config_is_valid() {
        assert_eq!(
            parse_shipyard_toml_str("").unwrap(),
            ShipyardConfig::default()
        );
    }

    #[test]
    fn rejects_zero_timeouts() {
        let err = parse_shipyard_toml_str("[verify]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("verify.timeout_secs"));
    }

    #[test]
    fn rejects_non_http_endpoints() {
        let err =
            parse_shipyard_toml_str("[verify]\nendpoints = [\"ftp://example.com\"]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported endpoint scheme"));
    }

    #[test]
    fn syntax_errors_carry_line_context() {
        let err = parse_shipyard_toml_str("target_root = \"/srv\"\n[deploy\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "got: {}", msg);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_shipyard_toml_str("target = \"/srv\"\n").is_err());
    }

    #[test]
    fn to_toml_round_trips() {
        let config = parse_shipyard_toml_str("target_root = \"/srv\"\n[snapshots]\nkeep = 2\n")
            .unwrap();
        let rendered = to_toml(&config).unwrap();
        assert_eq!(parse_shipyard_toml_str(&rendered).unwrap(), config);
    }
}
