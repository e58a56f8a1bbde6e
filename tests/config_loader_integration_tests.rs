use presence_player::config::{BluetoothMode, ConfigLoader};
use presence_player::system::{MockFileSystem, StandardFileSystem};
use std::path::PathBuf;

/// ConfigLoader over the mock and the real file system

#[cfg(test)]
mod config_loader_tests {
    use super::*;

    #[test]
    fn test_config_loading_with_mock_filesystem() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");

        let config_content = r#"
[general]
log_level = "debug"
serialize_arbitration = false

[wifi]
poll_interval_ms = 5000
allow_ssid_fallback = false

[bluetooth]
mode = "connected"
min_rssi = -70

[playback]
player_command = ["mpv", "--no-video"]
background_playback = false

[storage]
data_dir = "/var/lib/presence-player"
"#;
        file_system.add_file(&config_path, config_content.to_string());

        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());
        let config = config_loader.load_config().unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert!(!config.general.serialize_arbitration);
        assert_eq!(config.wifi.poll_interval_ms, 5000);
        assert!(!config.wifi.allow_ssid_fallback);
        assert_eq!(config.bluetooth.mode, BluetoothMode::Connected);
        assert_eq!(config.bluetooth.min_rssi, Some(-70));
        assert_eq!(config.playback.player_command, vec!["mpv", "--no-video"]);
        assert!(!config.playback.background_playback);
        assert_eq!(
            config.storage.resolve_data_dir().unwrap(),
            PathBuf::from("/var/lib/presence-player")
        );

        // Verify file system was called
        let read_calls = file_system.get_read_calls();
        assert_eq!(read_calls.len(), 1);
        assert_eq!(read_calls[0], config_path);
    }

    #[test]
    fn test_edited_file_is_picked_up_on_reload() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");

        file_system.add_file(&config_path, "[wifi]\npoll_interval_ms = 6000\n".to_string());
        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());
        let current = config_loader.load_config().unwrap();

        assert!(config_loader.reload_config(&current).unwrap().is_none());

        file_system.add_file(
            &config_path,
            "[wifi]\npoll_interval_ms = 9000\n\n[bluetooth]\nmin_rssi = -60\n".to_string(),
        );
        let reloaded = config_loader.reload_config(&current).unwrap().unwrap();
        assert_eq!(reloaded.wifi.poll_interval_ms, 9000);
        assert_eq!(reloaded.bluetooth.min_rssi, Some(-60));
        assert_eq!(current.changed_sections(&reloaded), vec!["wifi", "bluetooth"]);
    }

    #[test]
    fn test_config_error_handling() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");

        file_system.set_read_failure(true);
        file_system.add_file(&config_path, "[general]\n".to_string());
        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());
        assert!(config_loader.load_config().is_err());

        file_system.set_read_failure(false);
        file_system.add_file(&config_path, "[wifi\npoll_interval_ms = ".to_string());
        assert!(config_loader.load_config().is_err());

        // Parses, but a scan window longer than the scan interval is rejected
        file_system.add_file(
            &config_path,
            "[bluetooth]\npoll_interval_ms = 5000\nscan_window_ms = 8000\n".to_string(),
        );
        let error = config_loader.load_config().unwrap_err();
        assert!(format!("{:#}", error).contains("scan_window_ms"));
    }

    #[test]
    fn test_missing_config_is_written_with_defaults() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/home/user/.config/presence-player/config.toml");
        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());

        let config = config_loader.load_config().unwrap();
        assert_eq!(config.wifi.poll_interval_ms, 7000);
        assert_eq!(config.bluetooth.poll_interval_ms, 25000);
        assert!(file_system.file_exists(&config_path));

        let writes = file_system.get_write_calls();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].1.contains("[bluetooth]"));
        assert!(writes[0].1.contains("ffplay"));
    }

    #[test]
    fn test_config_round_trip_through_real_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested/config.toml");
        let config_loader = ConfigLoader::new(StandardFileSystem, config_path.clone());

        let mut config = config_loader.load_config().unwrap();
        assert!(config_path.exists());

        config.bluetooth.mode = BluetoothMode::Scan;
        config.wifi.enabled = false;
        config_loader.save_config(&config).unwrap();

        let reloaded = config_loader.load_config().unwrap();
        assert_eq!(reloaded.bluetooth.mode, BluetoothMode::Scan);
        assert!(!reloaded.wifi.enabled);
    }
}
