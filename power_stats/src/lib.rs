// Copyright 2020 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Client for the power statistics HAL (`IPowerStats`).
//!
//! [`PowerStats`] is the remote interface. [`PowerStatsHalWrapper`] is what the rest of the
//! system uses: it resolves the HAL lazily, survives HAL restarts, and turns every failure into
//! an empty result.

pub mod fake;
mod proxy;
mod wrapper;

use serde::Deserialize;
use serde::Serialize;

pub use crate::proxy::PowerStatsProxy;
pub use crate::proxy::PowerStatsStub;
pub use crate::proxy::TransactionCode;
pub use crate::wrapper::PowerStatsHalWrapper;
pub use crate::wrapper::PowerStatsHalWrapperImpl;

/// Name the HAL is registered under.
pub const SERVICE_NAME: &str = "android.hardware.power.stats.IPowerStats/default";

pub type Result<T> = service_manager::Result<T>;

/// A subsystem, peripheral or power domain that contributes to device power consumption.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerEntity {
    pub id: i32,
    pub name: String,
    pub states: Vec<State>,
}

/// One of the states a `PowerEntity` can reside in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: i32,
    pub name: String,
}

/// Residency of every state of one `PowerEntity`, accumulated since boot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResidencyResult {
    /// `PowerEntity::id` this result belongs to.
    pub id: i32,
    pub state_residency_data: Vec<StateResidency>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResidency {
    /// `State::id` within the owning entity.
    pub id: i32,
    pub total_time_in_state_ms: i64,
    pub total_state_entry_count: i64,
    pub last_entry_timestamp_ms: i64,
}

/// Energy attributed to one energy consumer (power model).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyConsumerResult {
    pub id: i32,
    pub timestamp_ms: i64,
    /// Accumulated energy in microwatt-seconds.
    pub energy_uws: i64,
}

/// An energy meter channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i32,
    pub name: String,
    pub subsystem: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyMeasurement {
    /// `Channel::id` the measurement was taken on.
    pub id: i32,
    pub timestamp_ms: i64,
    pub duration_ms: i64,
    /// Accumulated energy in microwatt-seconds.
    pub energy_uws: i64,
}

/// The power statistics HAL.
///
/// Every id filter follows the same rule: an empty slice asks for all available items.
pub trait PowerStats: Send + Sync {
    /// Entities for which state residency data is available.
    fn get_power_entity_info(&self) -> Result<Vec<PowerEntity>>;

    /// Accumulated state residency for each requested entity.
    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Result<Vec<StateResidencyResult>>;

    /// Ids of the energy consumers available on the device.
    fn get_energy_consumer_info(&self) -> Result<Vec<i32>>;

    /// Energy consumed by each requested consumer.
    fn get_energy_consumed(&self, energy_consumer_ids: &[i32])
        -> Result<Vec<EnergyConsumerResult>>;

    /// Channels of every available energy meter.
    fn get_energy_meter_info(&self) -> Result<Vec<Channel>>;

    /// Measurements for each requested channel.
    fn read_energy_meters(&self, channel_ids: &[i32]) -> Result<Vec<EnergyMeasurement>>;
}

impl<T: PowerStats + ?Sized> PowerStats for std::sync::Arc<T> {
    fn get_power_entity_info(&self) -> Result<Vec<PowerEntity>> {
        (**self).get_power_entity_info()
    }

    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Result<Vec<StateResidencyResult>> {
        (**self).get_state_residency(power_entity_ids)
    }

    fn get_energy_consumer_info(&self) -> Result<Vec<i32>> {
        (**self).get_energy_consumer_info()
    }

    fn get_energy_consumed(
        &self,
        energy_consumer_ids: &[i32],
    ) -> Result<Vec<EnergyConsumerResult>> {
        (**self).get_energy_consumed(energy_consumer_ids)
    }

    fn get_energy_meter_info(&self) -> Result<Vec<Channel>> {
        (**self).get_energy_meter_info()
    }

    fn read_energy_meters(&self, channel_ids: &[i32]) -> Result<Vec<EnergyMeasurement>> {
        (**self).read_energy_meters(channel_ids)
    }
}
