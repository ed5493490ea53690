// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-memory `PowerStats` implementation, used by tests and by `sysshim serve`.

use service_manager::Error;
use sync::Mutex;

use crate::Channel;
use crate::EnergyConsumerResult;
use crate::EnergyMeasurement;
use crate::PowerEntity;
use crate::PowerStats;
use crate::Result;
use crate::State;
use crate::StateResidency;
use crate::StateResidencyResult;

/// A call observed by `FakePowerStats`, with the id filter it carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    PowerEntityInfo,
    StateResidency(Vec<i32>),
    EnergyConsumerInfo,
    EnergyConsumed(Vec<i32>),
    EnergyMeterInfo,
    ReadEnergyMeters(Vec<i32>),
}

#[derive(Default)]
pub struct FakePowerStats {
    pub entities: Vec<PowerEntity>,
    pub residencies: Vec<StateResidencyResult>,
    pub consumers: Vec<EnergyConsumerResult>,
    pub channels: Vec<Channel>,
    pub measurements: Vec<EnergyMeasurement>,
    requests: Mutex<Vec<Request>>,
}

/// Keeps the items whose id is in `ids`, or all of them when `ids` is empty. Every requested id
/// must exist.
fn select<T: Clone>(
    items: &[T],
    ids: &[i32],
    id: impl Fn(&T) -> i32,
    what: &str,
) -> Result<Vec<T>> {
    if ids.is_empty() {
        return Ok(items.to_vec());
    }
    ids.iter()
        .map(|want| {
            items
                .iter()
                .find(|item| id(item) == *want)
                .cloned()
                .ok_or_else(|| Error::FailedTransaction(format!("invalid {} id {}", what, want)))
        })
        .collect()
}

impl FakePowerStats {
    /// A small device: a CPU cluster and a modem, two energy consumers, two meter channels.
    pub fn sample() -> Self {
        let entities = vec![
            PowerEntity {
                id: 0,
                name: String::from("cpu_cluster0"),
                states: vec![
                    State {
                        id: 0,
                        name: String::from("active"),
                    },
                    State {
                        id: 1,
                        name: String::from("sleep"),
                    },
                ],
            },
            PowerEntity {
                id: 1,
                name: String::from("modem"),
                states: vec![
                    State {
                        id: 0,
                        name: String::from("on"),
                    },
                    State {
                        id: 1,
                        name: String::from("off"),
                    },
                ],
            },
        ];
        let residencies = entities
            .iter()
            .map(|entity| StateResidencyResult {
                id: entity.id,
                state_residency_data: entity
                    .states
                    .iter()
                    .map(|state| StateResidency {
                        id: state.id,
                        total_time_in_state_ms: 1000 * (entity.id as i64 + 1) * (state.id as i64 + 1),
                        total_state_entry_count: 10 + state.id as i64,
                        last_entry_timestamp_ms: 50_000 + state.id as i64,
                    })
                    .collect(),
            })
            .collect();
        FakePowerStats {
            entities,
            residencies,
            consumers: vec![
                EnergyConsumerResult {
                    id: 0,
                    timestamp_ms: 60_000,
                    energy_uws: 1_250_000,
                },
                EnergyConsumerResult {
                    id: 1,
                    timestamp_ms: 60_000,
                    energy_uws: 480_000,
                },
            ],
            channels: vec![
                Channel {
                    id: 0,
                    name: String::from("VSYS_PWR_DISPLAY"),
                    subsystem: String::from("display"),
                },
                Channel {
                    id: 1,
                    name: String::from("VSYS_PWR_MODEM"),
                    subsystem: String::from("modem"),
                },
            ],
            measurements: vec![
                EnergyMeasurement {
                    id: 0,
                    timestamp_ms: 60_000,
                    duration_ms: 60_000,
                    energy_uws: 3_000_000,
                },
                EnergyMeasurement {
                    id: 1,
                    timestamp_ms: 60_000,
                    duration_ms: 60_000,
                    energy_uws: 900_000,
                },
            ],
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn record(&self, request: Request) {
        self.requests.lock().push(request);
    }
}

impl PowerStats for FakePowerStats {
    fn get_power_entity_info(&self) -> Result<Vec<PowerEntity>> {
        self.record(Request::PowerEntityInfo);
        Ok(self.entities.clone())
    }

    fn get_state_residency(&self, power_entity_ids: &[i32]) -> Result<Vec<StateResidencyResult>> {
        self.record(Request::StateResidency(power_entity_ids.to_vec()));
        select(&self.residencies, power_entity_ids, |r| r.id, "power entity")
    }

    fn get_energy_consumer_info(&self) -> Result<Vec<i32>> {
        self.record(Request::EnergyConsumerInfo);
        Ok(self.consumers.iter().map(|c| c.id).collect())
    }

    fn get_energy_consumed(
        &self,
        energy_consumer_ids: &[i32],
    ) -> Result<Vec<EnergyConsumerResult>> {
        self.record(Request::EnergyConsumed(energy_consumer_ids.to_vec()));
        select(&self.consumers, energy_consumer_ids, |c| c.id, "energy consumer")
    }

    fn get_energy_meter_info(&self) -> Result<Vec<Channel>> {
        self.record(Request::EnergyMeterInfo);
        Ok(self.channels.clone())
    }

    fn read_energy_meters(&self, channel_ids: &[i32]) -> Result<Vec<EnergyMeasurement>> {
        self.record(Request::ReadEnergyMeters(channel_ids.to_vec()));
        select(&self.measurements, channel_ids, |m| m.id, "channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_selects_everything() {
        let hal = FakePowerStats::sample();
        assert_eq!(hal.get_state_residency(&[]).unwrap().len(), 2);
        assert_eq!(hal.read_energy_meters(&[]).unwrap().len(), 2);
    }

    #[test]
    fn filter_keeps_requested_order() {
        let hal = FakePowerStats::sample();
        let ids: Vec<i32> = hal
            .get_energy_consumed(&[1, 0])
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 0]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let hal = FakePowerStats::sample();
        assert!(hal.read_energy_meters(&[7]).is_err());
        assert_eq!(
            hal.requests(),
            vec![Request::ReadEnergyMeters(vec![7])]
        );
    }
}
