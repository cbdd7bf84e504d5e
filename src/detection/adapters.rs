//! Per-venue payload adapters.
//!
//! Each venue names its swap legs differently inside `parsedJson`. The
//! functions here read one venue's field names into a [`NormalizedSwap`];
//! everything downstream only sees the normalized shape.

use crate::detection::types::NormalizedSwap;
use crate::types::PayloadShape;
use crate::types::type_tag::same_type;
use serde_json::Value;

/// Read a venue payload into its canonical swap legs.
///
/// Returns `None` when neither leg's coin type can be found.
pub fn normalize(shape: PayloadShape, payload: &Value) -> Option<NormalizedSwap> {
    let swap = match shape {
        PayloadShape::Router => router(payload),
        PayloadShape::Settle => settle(payload),
        PayloadShape::BlueMove => bluemove(payload),
        PayloadShape::SuiRewardsMe => suirewardsme(payload),
        PayloadShape::Aftermath => aftermath(payload),
    };

    if swap.input_type.is_none() && swap.output_type.is_none() {
        return None;
    }
    Some(swap)
}

impl NormalizedSwap {
    /// Whether the tracked token sits on either leg
    pub fn touches(&self, tracked_type: &str) -> bool {
        [&self.input_type, &self.output_type]
            .into_iter()
            .flatten()
            .any(|t| same_type(t, tracked_type))
    }

    /// Whether the tracked token is what the trader received
    pub fn buys(&self, tracked_type: &str) -> bool {
        self.output_type
            .as_deref()
            .is_some_and(|t| same_type(t, tracked_type))
    }
}

fn router(p: &Value) -> NormalizedSwap {
    NormalizedSwap {
        input_type: first_type(p, &["from", "coin_a", "coin_in", "type_in"]),
        output_type: first_type(p, &["target", "coin_out", "coin_b", "type_out"]),
        amount_in: amount(p, "amount_in"),
        amount_out: amount(p, "amount_out"),
        trader: first_string(p, &["wallet", "swapper"]),
    }
}

fn settle(p: &Value) -> NormalizedSwap {
    NormalizedSwap {
        input_type: first_type(p, &["coin_in"]),
        output_type: first_type(p, &["coin_out"]),
        amount_in: amount(p, "amount_in"),
        amount_out: amount(p, "amount_out"),
        trader: first_string(p, &["sender"]),
    }
}

fn bluemove(p: &Value) -> NormalizedSwap {
    let coin_a = first_type(p, &["coin_a"]);
    let coin_b = first_type(p, &["coin_b"]);
    let a2b = p.get("a2b").and_then(Value::as_bool).unwrap_or(true);

    let (input_type, output_type) = if a2b { (coin_a, coin_b) } else { (coin_b, coin_a) };
    NormalizedSwap {
        input_type,
        output_type,
        amount_in: amount(p, "amount_in"),
        amount_out: amount(p, "amount_out"),
        trader: None,
    }
}

fn suirewardsme(p: &Value) -> NormalizedSwap {
    NormalizedSwap {
        input_type: first_type(p, &["tokenin"]),
        output_type: first_type(p, &["tokenout"]),
        amount_in: amount(p, "amountin"),
        amount_out: amount(p, "amountout"),
        trader: first_string(p, &["wallet"]),
    }
}

fn aftermath(p: &Value) -> NormalizedSwap {
    NormalizedSwap {
        input_type: first_type(p, &["type_in"]),
        output_type: first_type(p, &["type_out"]),
        amount_in: amount(p, "amount_in"),
        amount_out: amount(p, "amount_out"),
        trader: first_string(p, &["swapper"]),
    }
}

/// A coin type is either a bare string or a Move `TypeName { name }`
fn type_name(v: &Value) -> Option<String> {
    let name = match v {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("name")?.as_str()?,
        _ => return None,
    };
    (!name.is_empty()).then(|| name.to_string())
}

fn first_type(p: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| p.get(*f).and_then(type_name))
}

fn first_string(p: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|f| p.get(*f).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// u64 amounts arrive as strings; tolerate plain numbers too
fn amount(p: &Value, field: &str) -> Option<String> {
    match p.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
