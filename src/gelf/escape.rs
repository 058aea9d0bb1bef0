// SPDX-License-Identifier: Apache-2.0

//! Repair of the hex escapes nginx writes into `escape=default` access logs.
//!
//! nginx emits non-printable and non-ASCII bytes as `\xHH`, which is not valid
//! JSON. The repair decodes those sequences back into raw bytes, except for the
//! ones that would break the surrounding JSON string (control bytes, `"` and
//! `\`), which instead get their backslash doubled so they survive as literal
//! text. Lone backslashes are doubled too, and a quote that directly follows a
//! backslash in the output gets its own backslash.
//!
//! The scan stops once fewer than four bytes remain; the tail is copied as-is.
//! That keeps every `\xHH` lookahead in bounds and means a trailing `\` or
//! `\x` is never touched.

const LOOKAHEAD: usize = 4;

/// Returns the repaired copy of `input`. Never fails and never panics.
pub fn repair(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8);
    let mut pos = 0;

    while input.len() - pos >= LOOKAHEAD {
        match input[pos] {
            b'"' => {
                if out.last() == Some(&b'\\') {
                    out.push(b'\\');
                }
                out.push(b'"');
                pos += 1;
            }
            b'\\' => match input[pos + 1] {
                b'\\' | b'"' => {
                    // already a valid escape pair
                    out.extend_from_slice(&input[pos..pos + 2]);
                    pos += 2;
                }
                b'x' => {
                    let (hi, lo) = (input[pos + 2], input[pos + 3]);
                    match decode_hex_pair(hi, lo) {
                        Some(byte) if !must_stay_escaped(hi, lo) => {
                            out.push(byte);
                            pos += LOOKAHEAD;
                        }
                        // keep the `x` in play as an ordinary byte
                        _ => {
                            out.extend_from_slice(br"\\");
                            pos += 1;
                        }
                    }
                }
                _ => {
                    out.extend_from_slice(br"\\");
                    pos += 1;
                }
            },
            byte => {
                out.push(byte);
                pos += 1;
            }
        }
    }

    out.extend_from_slice(&input[pos..]);
    out
}

/// Control bytes, `"` and the uppercase form of `\` stay as text.
fn must_stay_escaped(hi: u8, lo: u8) -> bool {
    matches!((hi, lo), (b'0' | b'1', _) | (b'2', b'2') | (b'5', b'C'))
}

fn decode_hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    u8::try_from(hi << 4 | lo).ok()
}
