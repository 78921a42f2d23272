//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter     | Implements           | Connects to                    |
//! |-------------|----------------------|--------------------------------|
//! | `wifi`      | LinkPort             | ESP-IDF WiFi STA/AP            |
//! | `mqtt`      | BrokerPort           | ESP-IDF MQTT client            |
//! | `nvs`       | ConfigStore          | NVS / in-memory store          |
//! | `hardware`  | SensorBus            | DHT20 over I2C                 |
//! |             | OutputBank           | 8x GPIO outputs                |
//! |             | IndicatorPort        | WS2812 status LED              |
//! | `system`    | SystemPort           | ESP32 timer/heap/restart       |
//! | `dns`       | —                    | captive DNS for config mode    |
//! | `device_id` | —                    | eFuse MAC identity             |
//!
//! Every adapter carries a simulation backend for
//! `not(target_os = "espidf")` so the workers run on the host under test.

pub mod device_id;
pub mod dns;
pub mod hardware;
pub mod mqtt;
pub mod nvs;
pub mod system;
pub mod wifi;
