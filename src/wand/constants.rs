//! Kano wand protocol constants
//!
//! This module contains all the constants needed for wand communication:
//! - GATT service and characteristic UUIDs
//! - Fixed notification handles of the wand firmware
//! - Notification enable/disable payloads
//! - Timing defaults

use uuid::Uuid;

// ============================================================================
// BLE Discovery Constants
// ============================================================================

/// Advertised name prefix shared by every Kano wand
pub const WAND_NAME_PREFIX: &str = "Kano-Wand";

// ============================================================================
// Information Service
// ============================================================================

/// Device information service UUID
pub const INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x64a70010_f691_4b93_a6f4_0968f5b648f8);

/// Organization name (UTF-8 string)
pub const ORGANIZATION_CHAR_UUID: Uuid = Uuid::from_u128(0x64a7000b_f691_4b93_a6f4_0968f5b648f8);

/// Software version (UTF-8 string)
pub const SOFTWARE_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70013_f691_4b93_a6f4_0968f5b648f8);

/// Hardware version (UTF-8 string)
pub const HARDWARE_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70001_f691_4b93_a6f4_0968f5b648f8);

// ============================================================================
// IO Service
// ============================================================================

/// IO service UUID
pub const IO_SERVICE_UUID: Uuid = Uuid::from_u128(0x64a70012_f691_4b93_a6f4_0968f5b648f8);

/// Battery level (1 byte, READ + NOTIFY)
pub const BATTERY_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70007_f691_4b93_a6f4_0968f5b648f8);

/// User button state (1 byte, READ + NOTIFY)
pub const USER_BUTTON_CHAR_UUID: Uuid = Uuid::from_u128(0x64a7000d_f691_4b93_a6f4_0968f5b648f8);

/// Vibrator pattern (1 byte, WRITE)
pub const VIBRATOR_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70008_f691_4b93_a6f4_0968f5b648f8);

/// LED state and RGB565 colour (3 bytes, WRITE)
pub const LED_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70009_f691_4b93_a6f4_0968f5b648f8);

/// Keep alive (1 byte, WRITE)
pub const KEEP_ALIVE_CHAR_UUID: Uuid = Uuid::from_u128(0x64a7000f_f691_4b93_a6f4_0968f5b648f8);

// ============================================================================
// Sensor Service
// ============================================================================

/// Motion sensor service UUID
pub const SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x64a70011_f691_4b93_a6f4_0968f5b648f8);

/// Temperature (2 bytes little-endian, READ + NOTIFY)
pub const TEMPERATURE_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70014_f691_4b93_a6f4_0968f5b648f8);

/// Quaternion position data (8 bytes, NOTIFY)
pub const QUATERNIONS_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70002_f691_4b93_a6f4_0968f5b648f8);

/// Magnetometer calibration (WRITE + NOTIFY with a 1-byte status)
pub const MAGN_CALIBRATE_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70021_f691_4b93_a6f4_0968f5b648f8);

/// Quaternion reset (1 byte, WRITE)
pub const QUATERNIONS_RESET_CHAR_UUID: Uuid = Uuid::from_u128(0x64a70004_f691_4b93_a6f4_0968f5b648f8);

// ============================================================================
// Notification Handles (firmware layout)
// ============================================================================

/// Value handle the wand uses for quaternion notifications
pub const POSITION_NOTIFICATION_HANDLE: u16 = 41;

/// Value handle the wand uses for user button notifications
pub const BUTTON_NOTIFICATION_HANDLE: u16 = 33;

/// Value handle the wand uses for temperature notifications
pub const TEMPERATURE_NOTIFICATION_HANDLE: u16 = 56;

/// Value handle the wand uses for battery notifications
pub const BATTERY_NOTIFICATION_HANDLE: u16 = 23;

/// Offset from a characteristic's value handle to its CCC descriptor
pub const CCC_HANDLE_OFFSET: u16 = 1;

// ============================================================================
// Payloads
// ============================================================================

/// Written to a CCC descriptor to enable notifications
pub const NOTIFICATIONS_ON: [u8; 2] = [1, 0];

/// Written to a CCC descriptor to disable notifications
pub const NOTIFICATIONS_OFF: [u8; 2] = [0, 0];

/// Written to the quaternion reset characteristic
pub const RESET_POSITION_COMMAND: [u8; 1] = [1];

/// Written to the keep alive characteristic
pub const KEEP_ALIVE_COMMAND: [u8; 1] = [1];

/// Written to the calibration characteristic to start calibrating
pub const CALIBRATE_COMMAND: [u8; 1] = [1];

/// Calibration status reported when the magnetometer is calibrated
pub const CALIBRATION_DONE: u8 = 2;

/// Calibration status reported when calibration failed
pub const CALIBRATION_FAILED: u8 = 3;

/// Default LED colour (the colour the wand ships with)
pub const DEFAULT_LED_COLOR: &str = "0x2185d0";

// ============================================================================
// Timing Constants
// ============================================================================

/// Wait per notification loop cycle (milliseconds)
pub const NOTIFICATION_TIMEOUT_MS: u64 = 1000;

/// Default discovery scan duration (milliseconds)
pub const SCAN_TIMEOUT_MS: u64 = 1000;
