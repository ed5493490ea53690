// Copyright 2020 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use base::error;
use base::info;
use service_manager::LazyServiceCache;
use service_manager::ServiceManager;
use sync::Mutex;

use crate::Channel;
use crate::EnergyConsumerResult;
use crate::EnergyMeasurement;
use crate::PowerEntity;
use crate::PowerStats;
use crate::PowerStatsProxy;
use crate::Result;
use crate::StateResidencyResult;
use crate::SERVICE_NAME;

/// The power statistics HAL as seen by the rest of the system.
///
/// Never fails: when the HAL cannot be reached or a call to it fails, the error is logged and
/// an empty result is returned. Id filters are forwarded as given; an empty filter means all.
pub trait PowerStatsHalWrapper: Send + Sync {
    fn get_power_entity_info(&self) -> Vec<PowerEntity>;
    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Vec<StateResidencyResult>;
    fn get_energy_consumer_info(&self) -> Vec<i32>;
    fn get_energy_consumed(&self, energy_consumer_ids: &[i32]) -> Vec<EnergyConsumerResult>;
    fn get_energy_meter_info(&self) -> Vec<Channel>;
    fn read_energy_meters(&self, channel_ids: &[i32]) -> Vec<EnergyMeasurement>;

    /// Connects to the HAL. Returns whether the connection was established.
    fn initialize(&self) -> bool;
}

/// `PowerStatsHalWrapper` backed by the HAL registered as [`SERVICE_NAME`].
///
/// Nothing is looked up until [`initialize`](PowerStatsHalWrapper::initialize) succeeds; until
/// then every call returns an empty result.
pub struct PowerStatsHalWrapperImpl {
    service_manager: Arc<dyn ServiceManager>,
    hal: Mutex<Option<Arc<LazyServiceCache<dyn PowerStats>>>>,
}

impl PowerStatsHalWrapperImpl {
    pub fn new(service_manager: Arc<dyn ServiceManager>) -> Self {
        PowerStatsHalWrapperImpl {
            service_manager,
            hal: Mutex::new(None),
        }
    }

    fn call<R: Default>(&self, what: &str, f: impl FnOnce(&dyn PowerStats) -> Result<R>) -> R {
        let cache = match self.hal.lock().as_ref() {
            Some(cache) => Arc::clone(cache),
            None => return R::default(),
        };
        let hal = match cache.get() {
            Some(hal) => hal,
            None => return R::default(),
        };
        match f(hal.as_ref()) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to get {} from PowerStats HAL: {}", what, e);
                R::default()
            }
        }
    }
}

impl PowerStatsHalWrapper for PowerStatsHalWrapperImpl {
    fn get_power_entity_info(&self) -> Vec<PowerEntity> {
        self.call("power entity info", |hal| hal.get_power_entity_info())
    }

    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Vec<StateResidencyResult> {
        self.call("state residency", |hal| {
            hal.get_state_residency(power_entity_ids)
        })
    }

    fn get_energy_consumer_info(&self) -> Vec<i32> {
        self.call("energy consumer info", |hal| hal.get_energy_consumer_info())
    }

    fn get_energy_consumed(&self, energy_consumer_ids: &[i32]) -> Vec<EnergyConsumerResult> {
        self.call("energy consumer results", |hal| {
            hal.get_energy_consumed(energy_consumer_ids)
        })
    }

    fn get_energy_meter_info(&self) -> Vec<Channel> {
        self.call("energy meter info", |hal| hal.get_energy_meter_info())
    }

    fn read_energy_meters(&self, channel_ids: &[i32]) -> Vec<EnergyMeasurement> {
        self.call("energy measurements", |hal| {
            hal.read_energy_meters(channel_ids)
        })
    }

    fn initialize(&self) -> bool {
        let cache = Arc::new(LazyServiceCache::new(
            Arc::clone(&self.service_manager),
            SERVICE_NAME,
            PowerStatsProxy::as_interface,
        ));
        let connected = cache.get().is_some();
        *self.hal.lock() = if connected {
            info!("Connected to PowerStats HAL");
            Some(cache)
        } else {
            error!("Unable to connect to PowerStats HAL");
            None
        };
        connected
    }
}
