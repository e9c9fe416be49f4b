use btleplug::api::{CharPropFlags, Characteristic, Peripheral};
use btleplug::platform::Peripheral as PlatformPeripheral;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::SessionError;

pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Run service discovery on a connected sensor and report whether it
/// exposes the heart rate service at all.
pub async fn discover_heart_rate_service(
    peripheral: &PlatformPeripheral,
) -> Result<bool, SessionError> {
    peripheral.discover_services().await.map_err(|err| {
        error!("service discovery failed: {err}");
        SessionError::DiscoveryFailed
    })?;

    Ok(peripheral
        .services()
        .iter()
        .any(|service| service.uuid == HEART_RATE_SERVICE_UUID))
}

/// Walk the discovered topology for the first notifiable heart rate
/// measurement characteristic under a heart rate service. Later matches are
/// ignored; at most one subscription ever exists.
pub fn find_measurement_characteristic(
    peripheral: &PlatformPeripheral,
) -> Option<Characteristic> {
    for service in peripheral.services() {
        if service.uuid != HEART_RATE_SERVICE_UUID {
            continue;
        }
        for characteristic in service.characteristics {
            if characteristic.uuid == HEART_RATE_MEASUREMENT_UUID
                && characteristic.properties.contains(CharPropFlags::NOTIFY)
            {
                debug!("found measurement characteristic {}", characteristic.uuid);
                return Some(characteristic);
            }
        }
    }
    None
}
