//! Lookup and coercion of host-command parameters.

use super::error::PluginError;
use serde_json::Value;

/// Finds the value paired with `name`; names are matched case-insensitively.
pub fn command_param<'a>(names: &[String], values: &'a [Value], name: &str) -> Option<&'a Value> {
    names
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .and_then(|index| values.get(index))
}

/// Integers may arrive as JSON numbers or as decimal / `0x` hex strings.
pub fn integer_param(value: &Value, name: &str) -> Result<u64, PluginError> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| PluginError::invalid_parameter(name, "expected a non-negative integer")),
        Value::String(text) => {
            let text = text.trim();
            let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => text.parse::<u64>(),
            };
            parsed.map_err(|_| PluginError::invalid_parameter(name, "expected an integer"))
        }
        _ => Err(PluginError::invalid_parameter(name, "expected an integer")),
    }
}

pub fn u8_param(value: &Value, name: &str) -> Result<u8, PluginError> {
    u8::try_from(integer_param(value, name)?)
        .map_err(|_| PluginError::invalid_parameter(name, "out of range for u8"))
}

pub fn u16_param(value: &Value, name: &str) -> Result<u16, PluginError> {
    u16::try_from(integer_param(value, name)?)
        .map_err(|_| PluginError::invalid_parameter(name, "out of range for u16"))
}

/// Byte strings arrive as arrays of numbers or as hex strings.
pub fn bytes_param(value: &Value, name: &str) -> Result<Vec<u8>, PluginError> {
    match value {
        Value::Array(items) => items.iter().map(|item| u8_param(item, name)).collect(),
        Value::String(hex) => {
            let digits: Vec<u8> = hex
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .map(|ch| {
                    ch.to_digit(16)
                        .map(|digit| digit as u8)
                        .ok_or_else(|| PluginError::invalid_parameter(name, "invalid hex digit"))
                })
                .collect::<Result<_, _>>()?;
            if digits.len() % 2 != 0 {
                return Err(PluginError::invalid_parameter(name, "odd number of hex digits"));
            }
            Ok(digits
                .chunks(2)
                .map(|pair| (pair[0] << 4) | pair[1])
                .collect())
        }
        _ => Err(PluginError::invalid_parameter(
            name,
            "expected a byte array or hex string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{bytes_param, command_param, u16_param, u8_param};
    use crate::plugin::PluginError;
    use serde_json::json;

    #[test]
    fn params_are_matched_by_name() {
        let names = vec!["AM_TYPE".to_string(), "data".to_string()];
        let values = vec![json!(7), json!("0a0B")];

        let am_type = command_param(&names, &values, "am_type").expect("am_type present");
        let data = command_param(&names, &values, "data").expect("data present");

        assert_eq!(u8_param(am_type, "am_type"), Ok(7));
        assert_eq!(bytes_param(data, "data"), Ok(vec![0x0a, 0x0b]));
        assert!(command_param(&names, &values, "destination").is_none());
    }

    #[test]
    fn integers_accept_hex_strings_and_enforce_range() {
        assert_eq!(u16_param(&json!("0xFFFF"), "destination"), Ok(0xffff));
        assert!(matches!(
            u8_param(&json!(300), "am_type"),
            Err(PluginError::InvalidParameter { .. })
        ));
        assert!(matches!(
            bytes_param(&json!("abc"), "data"),
            Err(PluginError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn non_ascii_hex_is_an_invalid_parameter() {
        for input in ["aé1", "éé", "0g"] {
            assert!(matches!(
                bytes_param(&json!(input), "data"),
                Err(PluginError::InvalidParameter { .. })
            ));
        }
        assert_eq!(bytes_param(&json!("de ad"), "data"), Ok(vec![0xde, 0xad]));
    }
}
