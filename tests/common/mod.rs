//! Shared fixtures for the loopback integration tests.
#![allow(dead_code)]

use std::time::Duration;
use trigno_daq::config::ConnectionConfig;
use trigno_daq::data::SensorId;
use trigno_daq::network::{MockBaseStation, RunningBaseStation, SensorConfiguration};

/// Sample rate of the scripted sensors: two frames per second.
pub const RATE: f64 = 2.0;

pub fn id(n: u8) -> SensorId {
    SensorId::new(n).unwrap()
}

/// Connection settings pointing at a running mock.
pub fn settings(station: &RunningBaseStation) -> ConnectionConfig {
    ConnectionConfig {
        address: station.address().to_string(),
        command_port: station.command_port(),
        emg_port: station.emg_port(),
        aux_port: station.aux_port(),
        connect_timeout: Duration::from_millis(500),
        command_timeout: Duration::from_millis(500),
        data_timeout: Duration::from_millis(500),
    }
}

/// Sensor 1 at byte offset 0 and sensor 2 at byte offset 4 of the EMG record, both
/// single channel.
pub fn two_sensors() -> [SensorConfiguration; 2] {
    let mut left = SensorConfiguration::active(id(1), 1, 1, 0, RATE);
    left.set_label("left");
    let right = SensorConfiguration::active(id(2), 2, 1, 0, RATE);
    [left, right]
}

/// EMG record carrying `a` for sensor 1 and `b` for sensor 2.
pub fn emg_record(a: f32, b: f32) -> Vec<f32> {
    let mut record = vec![0.0; 16];
    record[0] = a;
    record[1] = b;
    record
}

/// Mock with [`two_sensors`] streaming `count` EMG records after `START`.
pub fn two_sensor_station(count: usize, interval: Duration) -> MockBaseStation {
    let records = (0..count)
        .map(|i| emg_record(i as f32, -(i as f32)))
        .collect();
    let [left, right] = two_sensors();
    MockBaseStation::new()
        .with_sensor(&left)
        .with_sensor(&right)
        .with_emg_records(records, interval)
        .stream_after_start(Duration::ZERO)
}
