// Quote hash computation
// blake2b-256 over a canonical JSON serialization of every quote-defining
// parameter. The canonical bytes are formatted directly, field by field, in
// sorted key order; there is no marshal/re-parse round trip, so decimal
// strings pass through exactly as rendered.

use crate::types::{Fees, QuoteRequest};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Canonical serialization of the quote parameters.
///
/// Keys appear in lexicographic order: `amount, est_out_fee, in,
/// ledger_index, out, router_bps, trading_fees, ttl`. Decimal values are
/// rendered by `rust_decimal`'s `Display`, which preserves the scale of the
/// inputs and never appends trailing zeros. Output is compact JSON with no
/// whitespace; any reorder or formatting change alters the hash.
pub fn canonical_quote_bytes(
    req: &QuoteRequest,
    fees: &Fees,
    ledger_index: u32,
    ttl: u16,
) -> Vec<u8> {
    let mut buf = String::with_capacity(192);
    buf.push('{');
    push_str_field(&mut buf, "amount", &req.amount.to_string());
    buf.push(',');
    push_str_field(&mut buf, "est_out_fee", &fees.est_out_fee.to_string());
    buf.push(',');
    push_str_field(&mut buf, "in", &req.input.canonical());
    buf.push(',');
    push_num_field(&mut buf, "ledger_index", &ledger_index.to_string());
    buf.push(',');
    push_str_field(&mut buf, "out", &req.output.canonical());
    buf.push(',');
    push_num_field(&mut buf, "router_bps", &fees.router_bps.to_string());
    buf.push(',');
    push_str_field(&mut buf, "trading_fees", &fees.trading_fees.to_string());
    buf.push(',');
    push_num_field(&mut buf, "ttl", &ttl.to_string());
    buf.push('}');
    buf.into_bytes()
}

/// blake2b-256 of the canonical serialization.
pub fn compute_quote_hash(
    req: &QuoteRequest,
    fees: &Fees,
    ledger_index: u32,
    ttl: u16,
) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(canonical_quote_bytes(req, fees, ledger_index, ttl));
    hasher.finalize().into()
}

fn push_str_field(buf: &mut String, key: &str, value: &str) {
    buf.push('"');
    buf.push_str(key);
    buf.push_str("\":\"");
    push_escaped(buf, value);
    buf.push('"');
}

fn push_num_field(buf: &mut String, key: &str, value: &str) {
    buf.push('"');
    buf.push_str(key);
    buf.push_str("\":");
    buf.push_str(value);
}

// Canonical asset strings and decimal renderings never need escaping, but the
// serialization stays well-formed JSON for arbitrary input regardless.
fn push_escaped(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            c if (c as u32) < 0x20 => {
                buf.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => buf.push(c),
        }
    }
}
