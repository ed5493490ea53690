// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Binder plumbing for `PowerStats`: a proxy for callers and a stub for implementations.

use std::sync::Arc;

use enumn::N;
use serde_json::Value;
use service_manager::read_parcel;
use service_manager::transact_typed;
use service_manager::write_parcel;
use service_manager::Error;
use service_manager::Service;
use service_manager::SpBinder;

use crate::Channel;
use crate::EnergyConsumerResult;
use crate::EnergyMeasurement;
use crate::PowerEntity;
use crate::PowerStats;
use crate::Result;
use crate::StateResidencyResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum TransactionCode {
    GetPowerEntityInfo = 1,
    GetStateResidency = 2,
    GetEnergyConsumerInfo = 3,
    GetEnergyConsumed = 4,
    GetEnergyMeterInfo = 5,
    ReadEnergyMeters = 6,
}

/// `PowerStats` implemented by transactions on a remote object.
pub struct PowerStatsProxy {
    binder: SpBinder,
}

impl PowerStatsProxy {
    pub fn new(binder: SpBinder) -> Self {
        PowerStatsProxy { binder }
    }

    /// Wraps a resolved binder, for use as a `LazyServiceCache` interface cast.
    pub fn as_interface(binder: SpBinder) -> Arc<dyn PowerStats> {
        Arc::new(PowerStatsProxy::new(binder))
    }

    fn call<Resp: serde::de::DeserializeOwned>(
        &self,
        code: TransactionCode,
        ids: Option<&[i32]>,
    ) -> Result<Resp> {
        transact_typed(self.binder.as_ref(), code as u32, &ids)
    }
}

impl PowerStats for PowerStatsProxy {
    fn get_power_entity_info(&self) -> Result<Vec<PowerEntity>> {
        self.call(TransactionCode::GetPowerEntityInfo, None)
    }

    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Result<Vec<StateResidencyResult>> {
        self.call(TransactionCode::GetStateResidency, Some(power_entity_ids))
    }

    fn get_energy_consumer_info(&self) -> Result<Vec<i32>> {
        self.call(TransactionCode::GetEnergyConsumerInfo, None)
    }

    fn get_energy_consumed(
        &self,
        energy_consumer_ids: &[i32],
    ) -> Result<Vec<EnergyConsumerResult>> {
        self.call(TransactionCode::GetEnergyConsumed, Some(energy_consumer_ids))
    }

    fn get_energy_meter_info(&self) -> Result<Vec<Channel>> {
        self.call(TransactionCode::GetEnergyMeterInfo, None)
    }

    fn read_energy_meters(&self, channel_ids: &[i32]) -> Result<Vec<EnergyMeasurement>> {
        self.call(TransactionCode::ReadEnergyMeters, Some(channel_ids))
    }
}

/// Serves a local `PowerStats` implementation to remote callers.
pub struct PowerStatsStub<T: PowerStats> {
    hal: T,
}

impl<T: PowerStats> PowerStatsStub<T> {
    pub fn new(hal: T) -> Self {
        PowerStatsStub { hal }
    }
}

fn ids(data: Value) -> Result<Vec<i32>> {
    Ok(read_parcel::<Option<Vec<i32>>>(data)?.unwrap_or_default())
}

impl<T: PowerStats> Service for PowerStatsStub<T> {
    fn on_transact(&self, code: u32, data: Value) -> Result<Value> {
        let code = TransactionCode::n(code).ok_or(Error::UnknownTransaction(code))?;
        match code {
            TransactionCode::GetPowerEntityInfo => write_parcel(&self.hal.get_power_entity_info()?),
            TransactionCode::GetStateResidency => {
                write_parcel(&self.hal.get_state_residency(&ids(data)?)?)
            }
            TransactionCode::GetEnergyConsumerInfo => {
                write_parcel(&self.hal.get_energy_consumer_info()?)
            }
            TransactionCode::GetEnergyConsumed => {
                write_parcel(&self.hal.get_energy_consumed(&ids(data)?)?)
            }
            TransactionCode::GetEnergyMeterInfo => write_parcel(&self.hal.get_energy_meter_info()?),
            TransactionCode::ReadEnergyMeters => {
                write_parcel(&self.hal.read_energy_meters(&ids(data)?)?)
            }
        }
    }
}
