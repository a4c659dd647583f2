//! Currency code normalization shared by the FX service and the mart.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Placeholder tokens that some sources emit instead of a real value.
pub const PLACEHOLDER_NULLS: [&str; 6] = ["", "--", "N/A", "NA", "NULL", "NONE"];

pub fn is_placeholder(text: &str) -> bool {
    PLACEHOLDER_NULLS.contains(&text.trim().to_uppercase().as_str())
}

/// Maps a quoted currency code to the currency FX rates are published in,
/// plus the unit factor to apply. Minor units (GBX pence, ZAX cents) quote
/// at 1/100 of the major unit; CNH and ILA are aliases with no rates of
/// their own.
pub fn to_fx_currency(code: &str) -> (String, Decimal) {
    let upper = code.trim().to_uppercase();
    match upper.as_str() {
        "GBX" => ("GBP".to_string(), dec!(0.01)),
        "ZAX" => ("ZAR".to_string(), dec!(0.01)),
        "CNH" => ("CNY".to_string(), dec!(1)),
        "ILA" => ("ILS".to_string(), dec!(1)),
        _ => (upper, dec!(1)),
    }
}
