//! Local fare tariffs, used when the estimate endpoint cannot be reached.

use crate::models::{Coordinates, FareEstimate, VehicleType};

/// Average urban speed used to turn distance into a duration.
const AVERAGE_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tariff {
    pub base: f64,
    pub per_km: f64,
    pub per_minute: f64,
}

impl VehicleType {
    pub fn tariff(&self) -> Tariff {
        match self {
            VehicleType::Car => Tariff {
                base: 50.0,
                per_km: 15.0,
                per_minute: 2.0,
            },
            VehicleType::Moto => Tariff {
                base: 20.0,
                per_km: 8.0,
                per_minute: 1.5,
            },
            VehicleType::Auto => Tariff {
                base: 30.0,
                per_km: 10.0,
                per_minute: 1.5,
            },
            VehicleType::Other(_) => VehicleType::Car.tariff(),
        }
    }
}

/// Straight-line estimate for a trip.
pub fn estimate_locally(
    origin: &Coordinates,
    destination: &Coordinates,
    vehicle: &VehicleType,
) -> FareEstimate {
    let tariff = vehicle.tariff();
    let distance = origin.distance_km(destination);
    let duration = distance / AVERAGE_SPEED_KMH * 60.0;
    let distance_charge = round2(distance * tariff.per_km);
    let time_charge = round2(duration * tariff.per_minute);
    FareEstimate {
        distance: round2(distance),
        duration: duration.round(),
        base_fare: tariff.base,
        distance_charge,
        time_charge,
        total: round2(tariff.base + distance_charge + time_charge),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
