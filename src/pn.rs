//! CCSDS pseudo-noise (PN) derandomization.
//!
//! The randomizer sequence is produced by the 8-bit LFSR with polynomial
//! `x^8 + x^7 + x^5 + x^3 + 1` seeded with all ones, repeating every 255
//! bytes. Randomization is an XOR, so encode and decode are the same
//! operation.
//!
//! Reference: TM Synchronization and Channel Coding (CCSDS 131.0-B),
//! Section 10.
use std::sync::OnceLock;

static TABLE: OnceLock<[u8; 255]> = OnceLock::new();

/// The 255-byte PN sequence, generated once and shared.
pub(crate) fn table() -> &'static [u8; 255] {
    TABLE.get_or_init(|| {
        let mut tab = [0u8; 255];
        // Register holds the next 8 sequence bits, oldest in the MSB.
        let mut reg: u8 = 0xff;
        for byte in tab.iter_mut() {
            let mut b = 0u8;
            for _ in 0..8 {
                b = (b << 1) | (reg >> 7);
                // Taps at x^7, x^5, x^3, and x^0 of the current window
                let fb = ((reg >> 7) ^ (reg >> 4) ^ (reg >> 2) ^ reg) & 1;
                reg = (reg << 1) | fb;
            }
            *byte = b;
        }
        tab
    })
}

/// XOR `dat` against the PN sequence, restarting the sequence at index 0.
///
/// Applies to everything after the attached sync marker of a CADU.
#[must_use]
pub fn derandomize(dat: &[u8]) -> Vec<u8> {
    let tab = table();
    dat.iter()
        .zip(tab.iter().cycle())
        .map(|(b, p)| b ^ p)
        .collect()
}
