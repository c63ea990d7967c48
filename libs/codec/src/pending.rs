//! Pending router swap decoding
//!
//! Only the exact-input Uniswap-V2 router entry points are recognised. Anything else in
//! the mempool is reported as [`CodecError::UnrecognisedCalldata`] and dropped by the
//! caller.

use crate::error::{CodecError, CodecResult};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::utils::id;
use types::{Address, U256};

pub const SWAP_EXACT_TOKENS_FOR_TOKENS: &str =
    "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)";
pub const SWAP_EXACT_TOKENS_FOR_TOKENS_FEE_ON_TRANSFER: &str =
    "swapExactTokensForTokensSupportingFeeOnTransferTokens(uint256,uint256,address[],address,uint256)";

/// Decoded exact-input router swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwap {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    pub deadline: U256,
}

impl PendingSwap {
    /// First pair traded, (asset_in, asset_out)
    pub fn first_pair(&self) -> Option<(Address, Address)> {
        match self.path.as_slice() {
            [a, b, ..] => Some((*a, *b)),
            _ => None,
        }
    }
}

fn params() -> [ParamType; 5] {
    [
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Address,
        ParamType::Uint(256),
    ]
}

/// Decode router calldata (selector included)
pub fn decode_swap(calldata: &[u8]) -> CodecResult<PendingSwap> {
    if calldata.len() < 4 {
        return Err(CodecError::UnrecognisedCalldata {
            reason: format!("{} bytes is shorter than a selector", calldata.len()),
        });
    }
    let selector = &calldata[..4];
    if selector != id(SWAP_EXACT_TOKENS_FOR_TOKENS)
        && selector != id(SWAP_EXACT_TOKENS_FOR_TOKENS_FEE_ON_TRANSFER)
    {
        return Err(CodecError::UnrecognisedCalldata {
            reason: format!("selector 0x{}", hex::encode(selector)),
        });
    }

    let tokens = abi::decode(&params(), &calldata[4..]).map_err(|e| {
        CodecError::UnrecognisedCalldata {
            reason: e.to_string(),
        }
    })?;

    match tokens.as_slice() {
        [Token::Uint(amount_in), Token::Uint(amount_out_min), Token::Array(path), Token::Address(recipient), Token::Uint(deadline)] =>
        {
            let path = path
                .iter()
                .map(|token| match token {
                    Token::Address(address) => Ok(*address),
                    other => Err(CodecError::UnrecognisedCalldata {
                        reason: format!("non-address path element {other:?}"),
                    }),
                })
                .collect::<CodecResult<Vec<_>>>()?;
            if path.len() < 2 {
                return Err(CodecError::UnrecognisedCalldata {
                    reason: "swap path needs at least two assets".to_string(),
                });
            }
            Ok(PendingSwap {
                amount_in: *amount_in,
                amount_out_min: *amount_out_min,
                path,
                recipient: *recipient,
                deadline: *deadline,
            })
        }
        _ => Err(CodecError::UnrecognisedCalldata {
            reason: "unexpected argument layout".to_string(),
        }),
    }
}

/// Encode router calldata; used by simulators and tests
pub fn encode_swap(swap: &PendingSwap) -> Vec<u8> {
    let mut calldata = id(SWAP_EXACT_TOKENS_FOR_TOKENS).to_vec();
    calldata.extend(abi::encode(&[
        Token::Uint(swap.amount_in),
        Token::Uint(swap.amount_out_min),
        Token::Array(swap.path.iter().copied().map(Token::Address).collect()),
        Token::Address(swap.recipient),
        Token::Uint(swap.deadline),
    ]));
    calldata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap() -> PendingSwap {
        PendingSwap {
            amount_in: U256::exp10(18),
            amount_out_min: U256::from(1_900_000_000u64),
            path: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            recipient: Address::repeat_byte(0x09),
            deadline: U256::from(1_700_000_000u64),
        }
    }

    #[test]
    fn test_selector_matches_router() {
        assert_eq!(id(SWAP_EXACT_TOKENS_FOR_TOKENS), [0x38, 0xed, 0x17, 0x39]);
    }

    #[test]
    fn test_decode_router_calldata() {
        let decoded = decode_swap(&encode_swap(&swap())).unwrap();
        assert_eq!(decoded, swap());
        assert_eq!(
            decoded.first_pair(),
            Some((Address::repeat_byte(0x01), Address::repeat_byte(0x02)))
        );
    }

    #[test]
    fn test_rejects_other_calls() {
        // ERC-20 transfer
        let transfer = hex::decode("a9059cbb").unwrap();
        assert!(matches!(
            decode_swap(&transfer),
            Err(CodecError::UnrecognisedCalldata { .. })
        ));
        assert!(decode_swap(&[0x38]).is_err());

        let mut truncated = encode_swap(&swap());
        truncated.truncate(40);
        assert!(decode_swap(&truncated).is_err());
    }
}
