use uuid::Uuid;

/// Produces a fresh identifier without an entropy source.
///
/// Bare-metal builds have no RNG wired into `uuid`, so identifiers come from
/// a monotonic counter shaped as an RFC 4122 v4 UUID.
#[cfg(target_os = "none")]
pub fn fresh_uuid() -> Uuid {
    use core::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(1);
    let serial = NEXT.fetch_add(1, Ordering::Relaxed);

    let mut bytes = [0u8; 16];
    bytes[8..].copy_from_slice(&serial.to_be_bytes());
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

#[cfg(not(target_os = "none"))]
pub fn fresh_uuid() -> Uuid {
    Uuid::new_v4()
}
