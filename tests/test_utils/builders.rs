//! Builders for mappings and radio readings used across integration tests

use presence_player::config::Config;
use presence_player::mapping::Mapping;
use presence_player::presence::BluetoothDevice;

/// Builder for creating test Mapping instances
pub struct MappingBuilder {
    identity: String,
    display_name: String,
    audio_ref: String,
    audio_label: String,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self {
            identity: "AA:BB:CC:DD:EE:FF".to_string(),
            display_name: "CoffeeShop".to_string(),
            audio_ref: "jazz.mp3".to_string(),
            audio_label: "Jazz Mix".to_string(),
        }
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    /// Sets the audio reference and derives the label from it
    pub fn audio(mut self, audio_ref: &str) -> Self {
        self.audio_ref = audio_ref.to_string();
        self.audio_label = audio_ref
            .rsplit('/')
            .next()
            .unwrap_or(audio_ref)
            .trim_end_matches(".mp3")
            .to_string();
        self
    }

    pub fn build(self) -> Mapping {
        Mapping::new(
            self.identity,
            self.display_name,
            self.audio_ref,
            self.audio_label,
        )
    }
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test BluetoothDevice instances
pub struct BluetoothDeviceBuilder {
    id: String,
    name: String,
    rssi: Option<i16>,
    connected: bool,
}

impl BluetoothDeviceBuilder {
    pub fn new() -> Self {
        Self {
            id: "00:11:22:33:44:55".to_string(),
            name: "Car Stereo".to_string(),
            rssi: None,
            connected: false,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn connected(mut self) -> Self {
        self.connected = true;
        self
    }

    pub fn build(self) -> BluetoothDevice {
        let mut device = BluetoothDevice::new(self.id, self.name).set_connected(self.connected);
        if let Some(rssi) = self.rssi {
            device = device.with_rssi(rssi);
        }
        device
    }
}

impl Default for BluetoothDeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Config with short poll intervals for timer-driven tests
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.wifi.initial_delay_ms = 100;
    config.wifi.poll_interval_ms = 1000;
    config.bluetooth.initial_delay_ms = 100;
    config.bluetooth.poll_interval_ms = 3000;
    config.bluetooth.scan_window_ms = 500;
    config
}
