// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;
use std::time::Duration;

use power_stats::fake::FakePowerStats;
use power_stats::PowerStats;
use power_stats::PowerStatsHalWrapper;
use power_stats::PowerStatsHalWrapperImpl;
use power_stats::PowerStatsStub;
use power_stats::SERVICE_NAME;
use service_manager::ServiceHost;
use service_manager::SocketServiceManager;

fn publish(dir: &std::path::Path, hal: Arc<FakePowerStats>) -> ServiceHost {
    ServiceHost::publish(dir, SERVICE_NAME, Arc::new(PowerStatsStub::new(hal))).unwrap()
}

#[test]
fn wrapper_over_socket_follows_restart() {
    let dir = tempfile::tempdir().unwrap();
    let hal = Arc::new(FakePowerStats::sample());
    let host = publish(dir.path(), Arc::clone(&hal));

    let sm = Arc::new(SocketServiceManager::new(
        dir.path(),
        Duration::from_millis(500),
    ));
    let wrapper = PowerStatsHalWrapperImpl::new(sm);
    assert!(wrapper.initialize());
    assert_eq!(
        wrapper.read_energy_meters(&[]),
        hal.read_energy_meters(&[]).unwrap()
    );

    host.shutdown();
    // Either the death notification or the failed call leaves the facade empty.
    assert!(wrapper.get_power_entity_info().is_empty());

    let host = publish(dir.path(), Arc::clone(&hal));
    let mut entities = Vec::new();
    for _ in 0..50 {
        entities = wrapper.get_power_entity_info();
        if !entities.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(entities, hal.get_power_entity_info().unwrap());
    host.shutdown();
}
