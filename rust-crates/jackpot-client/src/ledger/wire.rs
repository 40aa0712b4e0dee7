//! Field decoding for Move objects rendered as JSON by the read API.
//!
//! The node does not render optional values consistently across versions, so
//! `decode_optional_address` tries each known shape in a fixed order and
//! reports anything else instead of treating it as absent.

use crate::{
    rpc::value_as_u64,
    types::{
        Address,
        Mist,
        Ticket,
    },
};
use serde_json::{
    Map,
    Value,
};

pub(crate) type Fields = Map<String, Value>;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WireOption {
    Absent,
    Present(Address),
    Unrecognized,
}

pub(crate) fn decode_optional_address(value: Option<&Value>) -> WireOption {
    let Some(value) = value else {
        return WireOption::Absent;
    };
    match value {
        Value::Null => WireOption::Absent,
        Value::String(raw) => {
            if raw.is_empty() {
                return WireOption::Absent;
            }
            match raw.parse::<Address>() {
                Ok(address) if address.is_zero() => WireOption::Absent,
                Ok(address) => WireOption::Present(address),
                Err(_) => WireOption::Unrecognized,
            }
        }
        Value::Object(map) => {
            if let Some(vec) = map.get("vec") {
                return match vec {
                    Value::Array(items) => decode_sequence(items),
                    _ => WireOption::Unrecognized,
                };
            }
            for key in ["fields", "id", "bytes"] {
                if let Some(inner) = map.get(key) {
                    return decode_optional_address(Some(inner));
                }
            }
            WireOption::Unrecognized
        }
        Value::Array(items) => decode_sequence(items),
        _ => WireOption::Unrecognized,
    }
}

fn decode_sequence(items: &[Value]) -> WireOption {
    match items {
        [] => WireOption::Absent,
        [single] => decode_optional_address(Some(single)),
        _ => WireOption::Unrecognized,
    }
}

/// Strips a `{ "fields": ... }` wrapper if the node added one.
pub(crate) fn unwrap_struct(value: &Value) -> Option<&Fields> {
    match value {
        Value::Object(map) => match map.get("fields") {
            Some(Value::Object(inner)) => Some(inner),
            _ => Some(map),
        },
        _ => None,
    }
}

/// Integers, including `Balance<T>` which may arrive as `{ "value": n }`.
pub(crate) fn u64_field(fields: &Fields, name: &str) -> Result<u64, String> {
    let value = fields
        .get(name)
        .ok_or_else(|| format!("missing field '{name}'"))?;
    u64_like(value).ok_or_else(|| format!("field '{name}' is not an integer: {value}"))
}

fn u64_like(value: &Value) -> Option<u64> {
    value_as_u64(value).or_else(|| {
        let inner = unwrap_struct(value)?;
        inner.get("value").and_then(u64_like)
    })
}

/// Missing vectors decode as empty.
pub(crate) fn address_list(fields: &Fields, name: &str) -> Result<Vec<Address>, String> {
    let Some(value) = fields.get(name) else {
        return Ok(Vec::new());
    };
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(format!("field '{name}' is not a list: {other}")),
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| format!("field '{name}' holds a non-address entry: {item}"))
        })
        .collect()
}

pub(crate) fn tickets(fields: &Fields) -> Result<Vec<Ticket>, String> {
    let items = match fields.get("tickets") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(format!("field 'tickets' is not a list: {other}")),
    };
    items
        .iter()
        .map(|item| {
            let ticket = unwrap_struct(item)
                .ok_or_else(|| format!("ticket entry is not a struct: {item}"))?;
            let owner = ticket
                .get("owner")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| format!("ticket entry has no owner: {item}"))?;
            Ok(Ticket {
                owner,
                amount: Mist(u64_field(ticket, "amount")?),
                ticket_count: u64_field(ticket, "ticket_count")?,
                multiplier: u64_field(ticket, "multiplier")?,
                purchase_time: u64_field(ticket, "purchase_time")?,
            })
        })
        .collect()
}

/// `0x2::foo::Bar<T>` -> `Bar`
pub(crate) fn struct_name(type_: &str) -> &str {
    let base = type_.split('<').next().unwrap_or(type_);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> WireOption {
        decode_optional_address(Some(&value))
    }

    #[test]
    fn decode_optional_address__accepts_every_known_shape() {
        let id = Address::from_u8(0xab);
        let raw = id.to_string();
        assert_eq!(decode(json!(raw)), WireOption::Present(id));
        assert_eq!(decode(json!({ "vec": [raw] })), WireOption::Present(id));
        assert_eq!(decode(json!({ "fields": raw })), WireOption::Present(id));
        assert_eq!(
            decode(json!({ "fields": { "vec": [raw] } })),
            WireOption::Present(id)
        );
        assert_eq!(decode(json!({ "id": raw })), WireOption::Present(id));
        assert_eq!(decode(json!([raw])), WireOption::Present(id));
    }

    #[test]
    fn decode_optional_address__treats_sentinels_as_absent() {
        assert_eq!(decode_optional_address(None), WireOption::Absent);
        assert_eq!(decode(Value::Null), WireOption::Absent);
        assert_eq!(decode(json!("")), WireOption::Absent);
        assert_eq!(decode(json!("0x0")), WireOption::Absent);
        assert_eq!(decode(json!({ "vec": [] })), WireOption::Absent);
        assert_eq!(decode(json!([])), WireOption::Absent);
    }

    #[test]
    fn decode_optional_address__flags_unknown_shapes() {
        assert_eq!(decode(json!(42)), WireOption::Unrecognized);
        assert_eq!(decode(json!({ "some": "0x1" })), WireOption::Unrecognized);
        assert_eq!(decode(json!({ "vec": ["0x1", "0x2"] })), WireOption::Unrecognized);
        assert_eq!(decode(json!("pool-7")), WireOption::Unrecognized);
    }

    #[test]
    fn u64_field__reads_numbers_strings_and_balances() {
        // given
        let fields = json!({
            "a": 7,
            "b": "8",
            "c": { "value": "9" },
            "d": { "fields": { "value": 10 } },
            "e": true
        });
        let fields = fields.as_object().unwrap();

        // then
        assert_eq!(u64_field(fields, "a"), Ok(7));
        assert_eq!(u64_field(fields, "b"), Ok(8));
        assert_eq!(u64_field(fields, "c"), Ok(9));
        assert_eq!(u64_field(fields, "d"), Ok(10));
        assert!(u64_field(fields, "e").is_err());
        assert!(u64_field(fields, "missing").is_err());
    }

    #[test]
    fn struct_name__drops_module_path_and_generics() {
        assert_eq!(struct_name("0x1::jackpot_contract::LotteryPool"), "LotteryPool");
        assert_eq!(struct_name("0x2::coin::Coin<0x2::sui::SUI>"), "Coin");
    }
}
