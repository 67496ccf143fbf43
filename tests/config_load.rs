//! Loading partial config files from disk.

use tempfile::TempDir;
use tinypet::config::{BusyPolicy, Config};
use tinypet::sim::SimRules;

async fn load_str(body: &str) -> anyhow::Result<Config> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(&path, body).await.unwrap();
    Config::load(path.to_str().unwrap()).await
}

#[tokio::test]
async fn partial_file_keeps_defaults_elsewhere() {
    let config = load_str(
        r##"
[bot]
pet_name = "Mochi"

[simulation]
max_level = 50

[simulation.hunger]
period_secs = 60
step = 2

[gateway]
busy_policy = "reject"

[commands.aliases]
nom = "feed"

[irc]
enabled = true
channels = ["#garden"]
"##,
    )
    .await
    .unwrap();

    assert_eq!(config.bot.pet_name, "Mochi");
    assert_eq!(config.simulation.max_level, 50);
    assert_eq!(config.simulation.hunger.period_secs, 60);
    assert_eq!(config.simulation.hunger.step, 2);
    assert_eq!(config.simulation.energy, SimRules::default().energy);
    assert_eq!(config.gateway.busy_policy, BusyPolicy::Reject);
    assert_eq!(config.gateway.max_pending, 8);
    assert_eq!(config.irc.channels, vec!["#garden".to_string()]);
    assert_eq!(config.irc.port, 6667);
    config.validate().unwrap();
}

#[tokio::test]
async fn unknown_verbs_fail_validation() {
    let config = load_str("[commands]\nenabled = [\"help\", \"dance\"]\n")
        .await
        .unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("dance"), "error was: {}", err);
}

#[tokio::test]
async fn alias_for_disabled_verb_fails_validation() {
    let config = load_str(
        "[commands]\nenabled = [\"help\", \"look\"]\n[commands.aliases]\nnom = \"feed\"\n",
    )
    .await
    .unwrap();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn zero_tick_interval_fails_validation() {
    let config = load_str("[scheduler]\ntick_interval_secs = 0\n").await.unwrap();
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn malformed_file_names_the_path() {
    let err = load_str("[bot\npet_name = ").await.unwrap_err().to_string();
    assert!(err.contains("config.toml"), "error was: {}", err);
}

#[tokio::test]
async fn missing_file_is_an_error() {
    assert!(Config::load("/nonexistent/tinypet/config.toml").await.is_err());
}
