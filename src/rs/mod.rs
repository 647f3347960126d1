//! Reed-Solomon (223,255) forward error correction.
//!
//! Implements the CCSDS-documented RS code over GF(2^8): 223 message
//! symbols, 32 parity symbols, up to 16 correctable symbol errors per
//! codeword. Transmitted symbols use the dual-basis representation; the
//! decoder converts to the conventional basis, runs the standard
//! syndrome / Berlekamp-Massey / Chien / Forney stages, and converts the
//! corrected symbols back.
//!
//! Interleaved codeblocks (`I` codewords per transfer frame, symbols
//! round-robined byte-by-byte) are handled by [`correct_codeblock`],
//! which decodes the contained codewords independently and in parallel.
//!
//! Reference: TM Synchronization and Channel Coding (CCSDS 131.0-B),
//! Section 4.
mod dual_basis;
mod gf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Symbols per codeword.
pub const CODEWORD_LEN: usize = 255;
/// Message symbols per codeword.
pub const MESSAGE_LEN: usize = 223;
/// Parity symbols per codeword.
pub const PARITY_LEN: usize = 32;

// Root of the generator polynomial: alpha^11
const GEN: u8 = 173;
// Exponent of the first consecutive generator root: 128 - E
const FCR: i32 = 112;

/// Disposition of Reed-Solomon decoding for a frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum RsState {
    /// No codeword required correction.
    Ok,
    /// All errors corrected; contains the total corrected symbol count.
    Corrected(usize),
    /// At least one codeword could not be corrected. Frame data is
    /// best-effort and should normally not be trusted.
    Uncorrected,
    /// Reed-Solomon was not attempted.
    NotPerformed,
}

fn syndromes(msg: &[u8]) -> Vec<u8> {
    let mut synd = vec![0u8; PARITY_LEN + 1];
    for (i, s) in synd.iter_mut().skip(1).enumerate() {
        *s = gf::poly_eval(msg, gf::pow(GEN, i as i32 + FCR));
    }
    synd
}

/// Berlekamp-Massey over the syndrome polynomial (without the leading
/// zero term). Returns the error locator, highest degree first.
fn error_locator(synd: &[u8]) -> Vec<u8> {
    let mut errloc = vec![1u8];
    let mut oldloc = vec![1u8];
    let synd_shift = synd.len().saturating_sub(PARITY_LEN);

    for i in 0..PARITY_LEN {
        let k = i + synd_shift;
        let mut delta = synd[k];
        for j in 1..errloc.len() {
            delta ^= gf::mult(errloc[errloc.len() - j - 1], synd[k - j]);
        }
        oldloc.push(0);
        if delta != 0 {
            if oldloc.len() > errloc.len() {
                let newloc = gf::poly_scale(&oldloc, delta);
                oldloc = gf::poly_scale(&errloc, gf::inv(delta));
                errloc = newloc;
            }
            errloc = gf::poly_add(&errloc, &gf::poly_scale(&oldloc, delta));
        }
    }

    while !errloc.is_empty() && errloc[0] == 0 {
        errloc.remove(0);
    }
    errloc
}

/// Chien search over the reversed locator; returns symbol positions.
fn error_positions(errloc_rev: &[u8]) -> Vec<i32> {
    let n = CODEWORD_LEN as i32;
    let mut pos = Vec::with_capacity(errloc_rev.len() - 1);
    for i in 0..n {
        if gf::poly_eval(errloc_rev, gf::pow(GEN, i)) == 0 {
            pos.push(n - 1 - i);
        }
    }
    pos
}

fn errata_locator(coef_pos: &[i32]) -> Vec<u8> {
    let mut errloc = vec![1u8];
    for &p in coef_pos {
        errloc = gf::poly_mult(&errloc, &gf::poly_add(&[1], &[gf::pow(GEN, p), 0]));
    }
    errloc
}

fn error_evaluator(synd_rev: &[u8], errloc: &[u8], n: usize) -> Vec<u8> {
    let mut divisor = vec![0u8; n + 2];
    divisor[0] = 1;
    let (_, rem) = gf::poly_div(&gf::poly_mult(synd_rev, errloc), &divisor);
    rem
}

/// Forney: compute and apply error magnitudes at `errpos`. `None` if a
/// magnitude denominator degenerates, meaning the positions were bogus.
fn apply_corrections(input: &[u8], synd: &[u8], errpos: &[i32]) -> Option<Vec<u8>> {
    let n = input.len() as i32;
    let coef_pos: Vec<i32> = errpos.iter().map(|&p| n - 1 - p).collect();

    let errloc = errata_locator(&coef_pos);
    let mut synd_rev = synd.to_vec();
    synd_rev.reverse();
    let erreval = error_evaluator(&synd_rev, &errloc, errloc.len() - 1);

    let x: Vec<u8> = coef_pos
        .iter()
        .map(|&p| gf::pow(GEN, -(CODEWORD_LEN as i32 - p)))
        .collect();

    let mut e = vec![0u8; input.len()];
    for (i, &xi) in x.iter().enumerate() {
        let xi_inv = gf::inv(xi);

        let mut errloc_prime = 1u8;
        for (j, &xj) in x.iter().enumerate() {
            if j != i {
                errloc_prime = gf::mult(errloc_prime, 1 ^ gf::mult(xi_inv, xj));
            }
        }
        if errloc_prime == 0 {
            return None;
        }

        let mut y = gf::poly_eval(&erreval, xi_inv);
        y = gf::mult(gf::pow(xi, 1 - FCR), y);
        e[errpos[i] as usize] = gf::div(y, errloc_prime);
    }

    Some(gf::poly_add(input, &e))
}

/// Decode a single 255-symbol dual-basis codeword.
///
/// Returns the decode disposition together with the (possibly corrected)
/// dual-basis symbols, parity included. Uncorrectable codewords return
/// the received symbols unchanged.
///
/// # Panics
/// If `input` is not exactly [`CODEWORD_LEN`] bytes.
pub(crate) fn correct_codeword(input: &[u8]) -> (RsState, Vec<u8>) {
    assert_eq!(input.len(), CODEWORD_LEN, "codeword must be 255 symbols");

    let conv = dual_basis::to_conv(input);
    let synd = syndromes(&conv);
    if synd.iter().all(|&s| s == 0) {
        return (RsState::Ok, input.to_vec());
    }

    let errloc = error_locator(&synd[1..]);
    let num_errs = errloc.len() - 1;
    if num_errs * 2 > PARITY_LEN {
        return (RsState::Uncorrected, input.to_vec());
    }

    let mut errloc_rev = errloc;
    errloc_rev.reverse();
    let errpos = error_positions(&errloc_rev);
    if errpos.len() != num_errs {
        return (RsState::Uncorrected, input.to_vec());
    }

    let Some(corrected) = apply_corrections(&conv, &synd, &errpos) else {
        return (RsState::Uncorrected, input.to_vec());
    };
    if syndromes(&corrected).iter().any(|&s| s != 0) {
        return (RsState::Uncorrected, input.to_vec());
    }

    (RsState::Corrected(num_errs), dual_basis::to_dual(&corrected))
}

/// Split an interleaved codeblock into its `interleave` codewords.
///
/// Codeword `k` occupies block bytes `k, k + I, k + 2I, ...`
/// (CCSDS 130.1-G, Section 5.3).
///
/// # Panics
/// If the block length is not a multiple of the interleave.
pub fn deinterleave(block: &[u8], interleave: u8) -> Vec<[u8; CODEWORD_LEN]> {
    let i = interleave as usize;
    assert!(
        i > 0 && block.len() % i == 0,
        "block length {} not a multiple of interleave {interleave}",
        block.len()
    );
    let mut codewords = vec![[0u8; CODEWORD_LEN]; i];
    for (j, &b) in block.iter().enumerate() {
        codewords[j % i][j / i] = b;
    }
    codewords
}

/// Decode an interleaved Reed-Solomon codeblock.
///
/// The returned bytes are the re-interleaved message symbols with parity
/// removed, i.e. `interleave * 223` bytes of frame data. Each contained
/// codeword decodes independently; results aggregate per frame:
/// all clean is [`RsState::Ok`], any correction is [`RsState::Corrected`]
/// with the total symbol count, and any failure is
/// [`RsState::Uncorrected`] with best-effort bytes for the failed
/// codewords.
///
/// # Panics
/// If the block length is not `interleave * 255`.
pub fn correct_codeblock(block: &[u8], interleave: u8) -> (Vec<u8>, RsState) {
    let i = interleave as usize;
    assert_eq!(
        block.len(),
        i * CODEWORD_LEN,
        "codeblock must be interleave * 255 bytes"
    );
    let data_len = block.len() - i * PARITY_LEN;

    let codewords = deinterleave(block, interleave);
    let zults: Vec<(RsState, Vec<u8>)> = codewords
        .par_iter()
        .map(|cw| correct_codeword(cw))
        .collect();

    let mut corrected = vec![0u8; block.len()];
    let mut num_corrected = 0usize;
    let mut uncorrectable = false;
    for (idx, (state, symbols)) in zults.iter().enumerate() {
        match state {
            RsState::Corrected(num) => num_corrected += num,
            RsState::Uncorrected => uncorrectable = true,
            _ => {}
        }
        for (j, &s) in symbols.iter().enumerate() {
            corrected[idx + j * i] = s;
        }
    }

    let state = if uncorrectable {
        RsState::Uncorrected
    } else if num_corrected > 0 {
        RsState::Corrected(num_corrected)
    } else {
        RsState::Ok
    };
    (corrected[..data_len].to_vec(), state)
}


#[cfg(test)]
mod tests {
    use super::testdata::CODEWORD;
    use super::*;

    #[test]
    fn clean_codeword_is_ok() {
        let (state, symbols) = correct_codeword(CODEWORD);
        assert_eq!(state, RsState::Ok);
        assert_eq!(&symbols[..], &CODEWORD[..]);
    }

    #[test]
    fn zero_codeword_is_ok() {
        let (state, symbols) = correct_codeword(&[0u8; CODEWORD_LEN]);
        assert_eq!(state, RsState::Ok);
        assert_eq!(symbols, vec![0u8; CODEWORD_LEN]);
    }

    #[test]
    fn corrupted_symbols_are_corrected() {
        let mut msg = *CODEWORD;
        msg[0] = 0;
        msg[2] = 2;
        msg[4] = 2;
        msg[6] = 2;

        let (state, symbols) = correct_codeword(&msg);
        assert_eq!(state, RsState::Corrected(4));
        assert_eq!(&symbols[..], &CODEWORD[..]);
    }

    #[test]
    fn sixteen_errors_at_capacity_are_corrected() {
        let mut msg = [0u8; CODEWORD_LEN];
        for i in 0..16 {
            msg[i * 13] = 0xa5;
        }

        let (state, symbols) = correct_codeword(&msg);
        assert_eq!(state, RsState::Corrected(16));
        assert_eq!(symbols, vec![0u8; CODEWORD_LEN]);
    }

    #[test]
    fn seventeen_errors_are_uncorrectable() {
        let mut msg = [0u8; CODEWORD_LEN];
        for i in 0..17 {
            msg[i * 13] = 0xa5;
        }

        // one error past capacity; the received symbols come back
        // untouched
        let (state, symbols) = correct_codeword(&msg);
        assert_eq!(state, RsState::Uncorrected);
        assert_eq!(&symbols[..], &msg[..]);
    }

    #[test]
    fn deinterleave_round_robins_symbols() {
        let dat: Vec<u8> = vec![0, 1, 2, 3, 0, 1, 2, 3];
        let codewords = deinterleave(&dat, 4);
        for (i, cw) in codewords.iter().enumerate() {
            assert_eq!(cw[0], i as u8);
            assert_eq!(cw[1], i as u8);
        }
    }

    fn interleaved_block(interleave: usize) -> Vec<u8> {
        let mut block = vec![0u8; CODEWORD_LEN * interleave];
        for j in 0..CODEWORD_LEN {
            for i in 0..interleave {
                block[interleave * j + i] = CODEWORD[j];
            }
        }
        block
    }

    #[test]
    fn codeblock_i4_with_error_is_corrected() {
        let mut block = interleaved_block(4);
        assert_eq!(block.len(), 1020);
        block[100] ^= 0x40;

        let (data, state) = correct_codeblock(&block, 4);
        assert_eq!(state, RsState::Corrected(1));
        assert_eq!(data.len(), 892);
        assert_eq!(data[100], block[100] ^ 0x40);
    }

    #[test]
    fn codeblock_i5_with_error_is_corrected() {
        let mut block = interleaved_block(5);
        assert_eq!(block.len(), 1275);
        block[7] ^= 0x01;

        let (data, state) = correct_codeblock(&block, 5);
        assert_eq!(state, RsState::Corrected(1));
        assert_eq!(data.len(), 1115);
    }

    #[test]
    fn codeblock_with_failing_codeword_is_uncorrected() {
        let mut block = interleaved_block(4);
        // overwhelm codeword 0 with 17 errors; codeword 1 gets a single
        // correctable error
        for j in 0..17 {
            block[4 * (j * 13)] ^= 0xa5;
        }
        block[4 * 20 + 1] ^= 0x08;

        let (data, state) = correct_codeblock(&block, 4);
        assert_eq!(state, RsState::Uncorrected);
        assert_eq!(data.len(), 892);
        // the failed codeword's symbols pass through as received
        assert_eq!(data[0], CODEWORD[0] ^ 0xa5);
        // the healthy codeword was still corrected
        assert_eq!(data[4 * 20 + 1], CODEWORD[20]);
    }

    #[test]
    fn clean_codeblock_is_ok() {
        let (data, state) = correct_codeblock(&interleaved_block(4), 4);
        assert_eq!(state, RsState::Ok);
        assert_eq!(data.len(), 892);
        // message symbols come back in frame order
        assert_eq!(data[0], CODEWORD[0]);
        assert_eq!(data[4], CODEWORD[1]);
    }
}
