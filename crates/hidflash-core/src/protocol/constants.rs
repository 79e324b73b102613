//! Protocol constants for the HID bootloader.
//!
//! Frame sizes, offsets and opcodes are fixed by the bootloader firmware.

// ============================================================================
// Device Identification
// ============================================================================

/// pid.codes shared Vendor ID used by the HID bootloader.
pub const BOOTLOADER_VENDOR_ID: u16 = 0x1209;

/// HID bootloader Product ID.
pub const BOOTLOADER_PRODUCT_ID: u16 = 0xBEBA;

/// Oldest bootloader release (bcdDevice) that speaks this protocol (v3.00).
pub const MIN_BOOTLOADER_RELEASE: u16 = 0x0300;

// ============================================================================
// Frame Layout
// ============================================================================

/// Outbound report: 1 report selector byte followed by the payload.
pub const TX_FRAME_SIZE: usize = 65;

/// Payload bytes carried by one outbound report.
pub const TX_PAYLOAD_SIZE: usize = TX_FRAME_SIZE - 1;

/// Inbound status report size.
pub const RX_FRAME_SIZE: usize = 9;

/// Report selector value. The bootloader uses unnumbered reports.
pub const REPORT_ID: u8 = 0x00;

/// Offset of the report selector byte.
pub const REPORT_ID_OFFSET: usize = 0;

/// Offset of the first payload byte.
pub const PAYLOAD_OFFSET: usize = 1;

/// Command signature, followed by the opcode byte.
pub const COMMAND_SIGNATURE: [u8; 7] = *b"BTLDCMD";

/// Offset of the opcode byte within the frame.
pub const OPCODE_OFFSET: usize = PAYLOAD_OFFSET + COMMAND_SIGNATURE.len();

/// Offset of the commit status byte within a status report.
pub const COMMIT_STATUS_OFFSET: usize = 7;

/// Commit status: sector written, ready for the next one.
pub const STATUS_SECTOR_COMMITTED: u8 = 0x02;

// ============================================================================
// Flash Geometry
// ============================================================================

/// Bytes acknowledged by the device as one flash write.
pub const SECTOR_SIZE: usize = 1024;

/// Data frames needed to carry one (zero-padded) sector.
pub const DATA_CHUNKS_PER_SECTOR: usize = SECTOR_SIZE / TX_PAYLOAD_SIZE;

// ============================================================================
// Retry Budgets
// ============================================================================

/// Write attempts before a frame is given up on.
pub const MAX_WRITE_RETRIES: u32 = 20;

/// Enumeration passes while waiting for the bootloader to appear.
pub const MAX_DISCOVERY_ATTEMPTS: u32 = 30;

/// Status polls per sector before the device is considered dead.
pub const MAX_COMMIT_POLLS: u32 = 20_000;
