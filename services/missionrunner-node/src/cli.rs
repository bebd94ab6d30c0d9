use clap::Parser;
use missionrunner_core::{Config, LogFormat};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "missionrunner-node",
    about = "Replay scripted vehicle link events through the headless mission runner"
)]
pub struct Cli {
    /// Mission plan file (overrides `mission.plan_file` from the config).
    #[arg(long)]
    pub plan: Option<PathBuf>,
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// JSON-lines replay script.
    #[arg(long)]
    pub script: PathBuf,
    /// Emit logs as JSON regardless of the config.
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

impl Cli {
    /// Load the config file (or defaults) and apply command-line overrides.
    pub fn resolve_config(&self) -> missionrunner_core::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default_config(),
        };
        if let Some(plan) = &self.plan {
            config.mission.plan_file = plan.clone();
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mission]\nplan_file = \"from-config.plan\"").unwrap();

        let cli = Cli::parse_from([
            "missionrunner-node",
            "--config",
            file.path().to_str().unwrap(),
            "--plan",
            "from-flag.plan",
            "--script",
            "steps.jsonl",
            "--json-logs",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.mission.plan_file, PathBuf::from("from-flag.plan"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_defaults_without_config() {
        let cli = Cli::parse_from(["missionrunner-node", "--script", "steps.jsonl"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config, Config::default_config());
    }

    #[test]
    fn test_bundled_demo_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/missionrunner.toml");
        let cli = Cli::parse_from(["missionrunner-node", "--config", path, "--script", "x.jsonl"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.mission.plan_file, PathBuf::from("survey.plan"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
