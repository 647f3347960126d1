//! Dual-basis representation transform.
//!
//! CCSDS Reed-Solomon symbols are transmitted in Berlekamp's dual basis
//! rather than the conventional polynomial basis. The change of basis is
//! linear over GF(2), so each byte maps through a 256-entry table built
//! from the eight generator constants below (CCSDS 131.0-B, Annex).
use std::sync::OnceLock;

const TAL: [u8; 8] = [0x8d, 0xef, 0xec, 0x86, 0xfa, 0x99, 0xaf, 0x7b];

struct Tables {
    // conventional -> dual
    dual: [u8; 256],
    // dual -> conventional
    conv: [u8; 256],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let mut dual = [0u8; 256];
        let mut conv = [0u8; 256];
        for i in 0..256usize {
            let mut d = 0u8;
            for (j, &t) in TAL.iter().rev().enumerate() {
                if i & (1 << j) != 0 {
                    d ^= t;
                }
            }
            dual[i] = d;
            conv[d as usize] = i as u8;
        }
        Tables { dual, conv }
    })
}

/// Map dual-basis symbols to the conventional basis for decoding.
pub fn to_conv(dat: &[u8]) -> Vec<u8> {
    let t = tables();
    dat.iter().map(|&b| t.conv[b as usize]).collect()
}

/// Map conventional-basis symbols back to the transmitted dual basis.
pub fn to_dual(dat: &[u8]) -> Vec<u8> {
    let t = tables();
    dat.iter().map(|&b| t.dual[b as usize]).collect()
}
