//! Config files written to disk build a working service graph.

use coachline::{CoachConfig, Services};

#[test]
fn default_config_survives_toml_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = CoachConfig::default();
    config.sweeps.nudge_days = vec![2, 4];
    config.persona.coach_name = "Juno".to_owned();
    std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

    let loaded = CoachConfig::from_file(&path).unwrap();
    assert_eq!(loaded.sweeps.nudge_days, vec![2, 4]);
    assert_eq!(loaded.persona.coach_name, "Juno");
    assert_eq!(loaded.sms.rate_limit_per_minute, config.sms.rate_limit_per_minute);
    assert_eq!(loaded.call.prompt_refresh_secs, config.call.prompt_refresh_secs);
}

#[test]
fn services_create_database_under_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("nested").join("coachline.db");

    let mut config = CoachConfig::default();
    config.server.public_url = "https://coach.example".to_owned();
    config.store.database_path = Some(database.clone());
    config.blob.root_dir = Some(dir.path().join("blobs"));

    let services = Services::from_config(&config).unwrap();
    assert!(database.exists());
    assert_eq!(services.gateway.public_host, "coach.example");
    assert!(!services.shutdown.is_cancelled());
}
