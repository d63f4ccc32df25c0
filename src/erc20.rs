//! ERC-20 calldata construction and the decimal-scaling rule used to convert
//! human-readable amounts into on-chain integer values.
//!
//! Calldata is built from [`alloy_sol_types::sol!`]-generated bindings, the
//! same pattern `x402_chain_eip155::chain::erc20` uses for its `IERC20`
//! bindings, rather than hand-spliced hex strings.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

alloy_sol_types::sol! {
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 value) external returns (bool);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScaleError {
    #[error("value has more than one decimal point: {0}")]
    MalformedDecimal(String),
    #[error("not a valid integer: {0}")]
    NotAnInteger(String),
}

/// Scales a human-readable decimal string `value` up to an integer with
/// `decimals` fractional digits, matching the original `GetRealDecimalValue`
/// behavior: if `value` contains `.`, the integer and fractional parts are
/// concatenated and the fractional part is right-padded with zeros up to
/// `decimals` digits; otherwise the integer is right-padded with `decimals`
/// zeros outright.
///
/// `scale("1.5", 2) == "150"`, `scale("1", 2) == "100"`,
/// `scale("0.01", 2) == "001"` (interpreted as the integer `1`).
pub fn scale(value: &str, decimals: u32) -> Result<U256, ScaleError> {
    let digits = if let Some((whole, frac)) = value.split_once('.') {
        if frac.contains('.') {
            return Err(ScaleError::MalformedDecimal(value.to_owned()));
        }
        let frac_len = frac.len() as u32;
        if frac_len > decimals {
            return Err(ScaleError::MalformedDecimal(value.to_owned()));
        }
        let padding = "0".repeat((decimals - frac_len) as usize);
        format!("{whole}{frac}{padding}")
    } else {
        format!("{value}{}", "0".repeat(decimals as usize))
    };
    U256::from_str_radix(&digits, 10).map_err(|_| ScaleError::NotAnInteger(value.to_owned()))
}

/// Builds ERC-20 `transfer(address,uint256)` calldata: selector `0xa9059cbb`
/// followed by the receiver padded to 32 bytes and the scaled value padded
/// to 32 bytes — exactly 68 bytes.
pub fn transfer_calldata(receiver: Address, scaled_value: U256) -> Bytes {
    let call = IERC20::transferCall {
        to: receiver,
        value: scaled_value,
    };
    Bytes::from(call.abi_encode())
}

/// Builds the `eth_call` data for an ERC-20 `balanceOf(address)` probe.
pub fn balance_of_calldata(holder: Address) -> Bytes {
    let call = IERC20::balanceOfCall { account: holder };
    Bytes::from(call.abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_idempotence() {
        assert_eq!(scale("1.5", 2).unwrap(), U256::from(150));
        assert_eq!(scale("1", 2).unwrap(), U256::from(100));
        assert_eq!(scale("0.01", 2).unwrap(), U256::from(1));
    }

    #[test]
    fn scale_native_decimals() {
        // Native transfer scaling uses 18 decimals.
        assert_eq!(scale("1", 18).unwrap(), U256::from(10).pow(U256::from(18)));
    }

    #[test]
    fn scale_rejects_two_decimal_points() {
        assert!(scale("1.2.3", 2).is_err());
    }

    #[test]
    fn transfer_calldata_matches_scenario_3() {
        let receiver: Address = "0xee9a7e064ddddb8db82bb5cef9e884409e7273fe"
            .parse()
            .unwrap();
        let value = scale("10", 2).unwrap();
        let data = transfer_calldata(receiver, value);
        assert_eq!(data.len(), 68);
        assert!(hex::encode(&data[..4]) == "a9059cbb");
        assert_eq!(
            hex::encode(&data[4..36]),
            "000000000000000000000000ee9a7e064ddddb8db82bb5cef9e884409e7273fe"
        );
        assert_eq!(
            hex::encode(&data[36..68]),
            "00000000000000000000000000000000000000000000000000000000000003e8"
        );
    }
}
