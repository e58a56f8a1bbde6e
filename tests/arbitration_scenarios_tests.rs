mod test_utils;

use presence_player::Decision;
use presence_player::config::BluetoothMode;
use presence_player::playback::SourceType;
use presence_player::presence::SignalSource;
use test_utils::{BluetoothDeviceBuilder, MappingBuilder, ServiceFixture};

const COFFEE_SHOP: &str = "AA:BB:CC:DD:EE:FF";
const GUEST: &str = "11:22:33:44:55:66";
const CAR: &str = "00:11:22:33:44:55";

async fn coffee_shop_fixture() -> ServiceFixture {
    let fixture = ServiceFixture::new();
    fixture
        .save(SignalSource::Wifi, MappingBuilder::new().identity(COFFEE_SHOP).build())
        .await;
    fixture
        .save(
            SignalSource::Bluetooth,
            MappingBuilder::new()
                .identity(CAR)
                .name("Car Stereo")
                .audio("drive.mp3")
                .build(),
        )
        .await;
    fixture
}

fn played(identity: &str) -> Decision {
    Decision::Played(identity.to_string())
}

#[cfg(test)]
mod wifi_arbitration {
    use super::*;

    #[tokio::test]
    async fn test_same_network_twice_plays_once() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);

        assert_eq!(fixture.service.run_wifi_tick().await, played(COFFEE_SHOP));
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Unchanged);

        assert_eq!(fixture.sink.loaded_uris(), vec!["jazz.mp3"]);
        assert_eq!(fixture.sink.play_count(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_network_stops_playback() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        fixture.service.run_wifi_tick().await;

        fixture.wifi.connect("Guest", GUEST);
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Stopped);
        assert!(!fixture.is_playing());
        assert_eq!(fixture.sink.unload_count(), 1);

        // Staying on the unmapped network does not stop again
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Unchanged);
        assert_eq!(fixture.sink.unload_count(), 1);
    }

    #[tokio::test]
    async fn test_sensor_failure_reads_as_disconnected() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        fixture.service.run_wifi_tick().await;

        fixture.wifi.set_ssid_failure(true);
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Stopped);
        assert_eq!(fixture.active_identity(), None);
    }

    #[tokio::test]
    async fn test_unknown_ssid_sentinel_is_not_connected() {
        let fixture = ServiceFixture::new();
        fixture
            .save(SignalSource::Wifi, MappingBuilder::new().identity("ssid:<unknown ssid>").build())
            .await;
        fixture.wifi.set_ssid(Some("<unknown ssid>"));

        // No transition from the initial empty state
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Stopped);
        assert_eq!(fixture.sink.load_count(), 0);
    }

    #[tokio::test]
    async fn test_ssid_fallback_key_when_bssid_unresolved() {
        let fixture = ServiceFixture::new();
        fixture
            .save(
                SignalSource::Wifi,
                MappingBuilder::new().identity("ssid:Home").name("Home").audio("home.mp3").build(),
            )
            .await;
        fixture.wifi.set_ssid(Some("Home"));
        fixture.wifi.set_network_failure(true);

        assert_eq!(fixture.service.run_wifi_tick().await, played("ssid:Home"));
        assert_eq!(fixture.sink.loaded_uris(), vec!["home.mp3"]);
    }

    #[tokio::test]
    async fn test_missing_audio_file_leaves_slot_idle_without_retrying() {
        let fixture = ServiceFixture::new();
        fixture
            .save(
                SignalSource::Wifi,
                MappingBuilder::new().identity(COFFEE_SHOP).audio("gone.mp3").build(),
            )
            .await;
        fixture.sink.set_missing("gone.mp3");
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);

        assert!(matches!(
            fixture.service.run_wifi_tick().await,
            Decision::Failed(_)
        ));
        assert!(!fixture.is_playing());

        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Unchanged);
        assert_eq!(fixture.sink.load_count(), 1);
    }

    #[tokio::test]
    async fn test_playing_identity_always_matches_mapped_network() {
        let fixture = ServiceFixture::new();
        for (identity, audio) in [("AA:AA", "a.mp3"), ("CC:CC", "c.mp3")] {
            fixture
                .save(
                    SignalSource::Wifi,
                    MappingBuilder::new().identity(identity).audio(audio).build(),
                )
                .await;
        }

        let walk = [
            Some(("Alpha", "AA:AA")),
            Some(("Bravo", "BB:BB")),
            Some(("Alpha", "AA:AA")),
            Some(("Charlie", "CC:CC")),
            None,
            Some(("Charlie", "CC:CC")),
            Some(("Charlie", "CC:CC")),
        ];

        for step in walk {
            match step {
                Some((ssid, bssid)) => fixture.wifi.connect(ssid, bssid),
                None => fixture.wifi.disconnect(),
            }
            fixture.service.run_wifi_tick().await;

            let expected = step
                .map(|(_, bssid)| bssid)
                .filter(|bssid| *bssid != "BB:BB")
                .map(str::to_string);
            assert_eq!(fixture.active_identity(), expected, "after {:?}", step);
        }

        assert_eq!(
            fixture.sink.loaded_uris(),
            vec!["a.mp3", "a.mp3", "c.mp3", "c.mp3"]
        );
    }
}

#[cfg(test)]
mod bluetooth_priority {
    use super::*;

    async fn wifi_playing() -> ServiceFixture {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        assert_eq!(fixture.service.run_wifi_tick().await, played(COFFEE_SHOP));
        fixture
    }

    #[tokio::test]
    async fn test_mapped_device_preempts_wifi() {
        let fixture = wifi_playing().await;
        fixture
            .bluetooth
            .set_connected(vec![BluetoothDeviceBuilder::new().id(CAR).build()]);

        assert_eq!(fixture.service.run_bluetooth_tick().await, played(CAR));
        let state = fixture.service.engine().playback().snapshot();
        assert_eq!(state.source_type, SourceType::Bluetooth);
        assert!(fixture.service.engine().has_bluetooth_priority());

        // WiFi, changed or not, yields while the Bluetooth clip plays
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Skipped);
        fixture.wifi.connect("Guest", GUEST);
        assert_eq!(fixture.service.run_wifi_tick().await, Decision::Skipped);
        assert_eq!(fixture.service.force_recheck().await, Decision::Skipped);

        assert_eq!(fixture.sink.loaded_uris(), vec!["jazz.mp3", "drive.mp3"]);
        assert_eq!(fixture.active_identity().as_deref(), Some(CAR));
    }

    #[tokio::test]
    async fn test_device_leaving_hands_back_to_wifi() {
        let fixture = wifi_playing().await;
        fixture
            .bluetooth
            .set_connected(vec![BluetoothDeviceBuilder::new().id(CAR).build()]);
        fixture.service.run_bluetooth_tick().await;

        fixture.bluetooth.clear();
        assert_eq!(fixture.service.run_bluetooth_tick().await, Decision::Stopped);
        assert!(!fixture.is_playing());

        assert_eq!(fixture.service.run_wifi_tick().await, played(COFFEE_SHOP));
        assert_eq!(
            fixture.sink.loaded_uris(),
            vec!["jazz.mp3", "drive.mp3", "jazz.mp3"]
        );
    }

    #[tokio::test]
    async fn test_finished_bluetooth_clip_releases_priority() {
        let fixture = wifi_playing().await;
        fixture
            .bluetooth
            .set_connected(vec![BluetoothDeviceBuilder::new().id(CAR).build()]);
        fixture.service.run_bluetooth_tick().await;

        fixture.sink.finish();
        assert!(!fixture.service.engine().has_bluetooth_priority());
        assert_eq!(fixture.service.run_wifi_tick().await, played(COFFEE_SHOP));
    }

    #[tokio::test]
    async fn test_unmapped_device_stops_wifi_clip() {
        let fixture = wifi_playing().await;
        fixture.bluetooth.set_connected(vec![
            BluetoothDeviceBuilder::new().id("66:77:88:99:AA:BB").name("Headphones").build(),
        ]);

        assert_eq!(fixture.service.run_bluetooth_tick().await, Decision::Stopped);
        assert!(!fixture.is_playing());
        assert_eq!(fixture.sink.unload_count(), 1);

        // The device stays present without acting again
        assert_eq!(fixture.service.run_bluetooth_tick().await, Decision::Unchanged);
        assert_eq!(fixture.sink.unload_count(), 1);

        // Nothing holds Bluetooth priority, so WiFi re-evaluates on its next tick
        assert_eq!(fixture.service.run_wifi_tick().await, played(COFFEE_SHOP));
        assert_eq!(fixture.sink.load_count(), 2);
    }

    #[tokio::test]
    async fn test_bluetooth_lookup_failure_stops_playback() {
        let fixture = wifi_playing().await;
        fixture
            .bluetooth
            .set_connected(vec![BluetoothDeviceBuilder::new().id(CAR).build()]);

        fixture.kv.set_read_failure(true);
        assert!(matches!(
            fixture.service.run_bluetooth_tick().await,
            Decision::Failed(_)
        ));
        assert!(!fixture.is_playing());
    }

    #[tokio::test]
    async fn test_strongest_discovered_device_wins() {
        let mut config = presence_player::Config::default();
        config.bluetooth.mode = BluetoothMode::Scan;
        config.bluetooth.min_rssi = Some(-85);
        let fixture = ServiceFixture::with_config(config);
        for (identity, audio) in [("11:11", "far.mp3"), ("22:22", "near.mp3"), ("33:33", "faint.mp3")] {
            fixture
                .save(
                    SignalSource::Bluetooth,
                    MappingBuilder::new().identity(identity).audio(audio).build(),
                )
                .await;
        }
        fixture.bluetooth.set_scan_results(vec![
            BluetoothDeviceBuilder::new().id("11:11").rssi(-80).build(),
            BluetoothDeviceBuilder::new().id("22:22").rssi(-50).build(),
            BluetoothDeviceBuilder::new().id("33:33").rssi(-95).build(),
        ]);

        assert_eq!(fixture.service.run_bluetooth_tick().await, played("22:22"));
        assert_eq!(fixture.sink.loaded_uris(), vec!["near.mp3"]);
        assert_eq!(
            fixture.bluetooth.get_scan_calls(),
            vec![std::time::Duration::from_millis(10000)]
        );
    }

    #[tokio::test]
    async fn test_same_device_on_next_scan_does_not_replay() {
        let fixture = coffee_shop_fixture().await;
        fixture
            .bluetooth
            .set_connected(vec![BluetoothDeviceBuilder::new().id(CAR).build()]);

        assert_eq!(fixture.service.run_bluetooth_tick().await, played(CAR));
        assert_eq!(fixture.service.run_bluetooth_tick().await, Decision::Unchanged);
        assert_eq!(fixture.sink.load_count(), 1);
    }
}

#[cfg(test)]
mod user_actions {
    use super::*;

    #[tokio::test]
    async fn test_deleting_playing_mapping_stops_it() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        fixture.service.run_wifi_tick().await;

        fixture
            .service
            .mappings()
            .delete_mapping(SignalSource::Wifi, COFFEE_SHOP)
            .await
            .unwrap();

        assert!(!fixture.is_playing());
        assert!(
            fixture
                .service
                .engine()
                .store()
                .get(SignalSource::Wifi, COFFEE_SHOP)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_mapping_test_replays_current_clip() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        fixture.service.run_wifi_tick().await;

        let found = fixture
            .service
            .mappings()
            .test_mapping(SignalSource::Wifi, COFFEE_SHOP)
            .await
            .unwrap();

        assert!(found);
        assert_eq!(fixture.sink.loaded_uris(), vec!["jazz.mp3", "jazz.mp3"]);
    }

    #[tokio::test]
    async fn test_reload_forces_wifi_replay() {
        let fixture = coffee_shop_fixture().await;
        fixture.wifi.connect("CoffeeShop", COFFEE_SHOP);
        fixture.service.run_wifi_tick().await;

        assert_eq!(fixture.service.reload().await, played(COFFEE_SHOP));
        assert_eq!(fixture.sink.load_count(), 2);
        assert_eq!(fixture.service.mappings().list_mappings(SignalSource::Wifi).len(), 1);
    }
}
