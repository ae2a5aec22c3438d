pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, load_settings_with, read_settings_with};
pub use paths::{
    default_global_config_path, default_state_root, GLOBAL_SETTINGS_FILE_NAME, GLOBAL_STATE_DIR,
};
pub use settings::{
    EventsSettings, ExplorerSettings, MonitorSettings, PollingSettings, Settings, ToolSettings,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let settings: Settings = serde_yaml::from_str(
            r#"
service_url: https://sp.example
service_name: pdp-client
recordkeeper: "0x6170dE2b09b404776197485F3dc6c968Ef948505"
"#,
        )
        .expect("parse settings");

        assert_eq!(settings.staging_dir, PathBuf::from("pdp-data"));
        assert_eq!(settings.tool.data_mount, "/data");
        assert_eq!(settings.events.endpoint, None);
        assert_eq!(settings.monitor.bind, "127.0.0.1:5555");
        assert_eq!(settings.poll_policy().interval, Duration::from_secs(5));
        settings.validate().expect("valid");
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("pdpflow.yaml");
        fs::write(
            &path,
            "service_url: https://file.example\nservice_name: from-file\nrecordkeeper: rk\n",
        )
        .expect("write config");

        let settings = load_settings_with(
            Some(path.as_path()),
            env(&[
                ("SERVICE_URL", "https://env.example"),
                ("SERVICE_NAME", ""),
                ("PDP_DATA_DIR", "/srv/pdp-data"),
                ("PDPFLOW_EVENTS_URL", "ws://127.0.0.1:5555"),
            ]),
        )
        .expect("load");

        assert_eq!(settings.service_url, "https://env.example");
        assert_eq!(settings.service_name, "from-file");
        assert_eq!(settings.staging_dir, PathBuf::from("/srv/pdp-data"));
        assert_eq!(
            settings.events.endpoint.as_deref(),
            Some("ws://127.0.0.1:5555")
        );
    }

    #[test]
    fn missing_service_fields_are_rejected() {
        let err = Settings::default().validate().expect_err("must fail");
        assert!(err.to_string().contains("service_url"));
    }

    #[test]
    fn rejects_non_websocket_event_endpoint() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[
            ("SERVICE_URL", "https://sp"),
            ("SERVICE_NAME", "svc"),
            ("RECORDKEEPER", "rk"),
            ("PDPFLOW_EVENTS_URL", "tcp://localhost:5555"),
        ]));
        let err = settings.validate().expect_err("must fail");
        assert!(err.to_string().contains("events.endpoint"));
    }

    #[test]
    fn default_launcher_mounts_staging_dir_into_container() {
        let mut settings = Settings::default();
        settings.staging_dir = PathBuf::from("/srv/pdp-data");
        let tool = settings.tool_context().expect("tool context");
        assert_eq!(tool.launcher.program, "docker");
        assert!(tool
            .launcher
            .args
            .contains(&"type=bind,src=/srv/pdp-data,dst=/data".to_string()));
    }

    #[test]
    fn unbounded_polling_is_expressible() {
        let settings: Settings = serde_yaml::from_str(
            "polling:\n  max_attempts: null\n  max_wait_secs: null\n  interval_secs: 2\n",
        )
        .expect("parse");
        let policy = settings.poll_policy();
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.max_wait, None);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_interval, Duration::from_secs(60));
    }
}
