//! Contract call payload encoding
//!
//! A payload is the 4-byte method selector followed by the ABI encoding of
//! the argument values. The selector is the first four bytes of
//! keccak256 over the canonical signature `name(type1,type2,...)`; only the
//! declared types take part in it, never the values.

use crate::error::{ClientError, ClientResult};

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, I256, U256};
use sha3::{Digest, Keccak256};

/// A contract method invocation: name plus ordered (type, value) pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    name: String,
    args: Vec<(String, String)>,
}

impl MethodCall {
    /// A call with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A call with an explicit argument list
    pub fn with_args(name: impl Into<String>, args: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Append one argument
    pub fn arg(mut self, ty: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((ty.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Canonical signature string, e.g. `transfer(address,uint256)`
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.args.iter().map(|(ty, _)| ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// 4-byte method selector
    pub fn selector(&self) -> [u8; 4] {
        function_selector(&self.signature())
    }

    /// ABI encoding of the argument values (no selector)
    pub fn encode_args(&self) -> ClientResult<Vec<u8>> {
        let tokens = self
            .args
            .iter()
            .enumerate()
            .map(|(index, (ty, value))| {
                tokenize(ty, value).map_err(|message| {
                    ClientError::Abi(format!(
                        "argument {} of {} ({} = '{}'): {}",
                        index, self.name, ty, value, message
                    ))
                })
            })
            .collect::<ClientResult<Vec<Token>>>()?;

        Ok(abi::encode(&tokens))
    }

    /// Full call payload: selector followed by encoded arguments
    pub fn encode(&self) -> ClientResult<Bytes> {
        let mut data = self.selector().to_vec();
        data.extend(self.encode_args()?);
        Ok(data.into())
    }
}

/// Compute the selector for a signature string
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Build a call payload from a method name and (type, value) pairs
pub fn pack_method_data(method: &str, args: &[(&str, &str)]) -> ClientResult<Bytes> {
    let call = args
        .iter()
        .fold(MethodCall::new(method), |call, (ty, value)| call.arg(*ty, *value));
    call.encode()
}

/// Turn a textual value into a token for the declared type.
///
/// Supports the elementary types: address, bool, string, bytes, bytesN,
/// uintN and intN. Integers accept decimal or 0x-prefixed hex.
fn tokenize(ty: &str, value: &str) -> Result<Token, String> {
    let value = value.trim();
    match ty {
        "address" => value
            .parse::<Address>()
            .map(Token::Address)
            .map_err(|e| e.to_string()),
        "bool" => match value {
            "true" | "1" => Ok(Token::Bool(true)),
            "false" | "0" => Ok(Token::Bool(false)),
            other => Err(format!("expected true or false, got '{}'", other)),
        },
        "string" => Ok(Token::String(value.to_string())),
        "bytes" => decode_hex(value).map(Token::Bytes),
        _ if ty.starts_with("bytes") => {
            let size = bit_or_byte_width(&ty["bytes".len()..], 1, 32)?;
            let bytes = decode_hex(value)?;
            if bytes.len() != size {
                return Err(format!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        _ if ty.starts_with("uint") => {
            let bits = integer_width(&ty["uint".len()..])?;
            let number = parse_uint(value)?;
            if bits < 256 && number.bits() > bits {
                return Err(format!("value does not fit in uint{}", bits));
            }
            Ok(Token::Uint(number))
        }
        _ if ty.starts_with("int") => {
            let bits = integer_width(&ty["int".len()..])?;
            let number = I256::from_dec_str(value).map_err(|e| e.to_string())?;
            let raw = number.into_raw();
            if bits < 256 && !fits_signed(raw, bits) {
                return Err(format!("value does not fit in int{}", bits));
            }
            Ok(Token::Int(raw))
        }
        other => Err(format!("unsupported type '{}'", other)),
    }
}

fn integer_width(suffix: &str) -> Result<usize, String> {
    if suffix.is_empty() {
        return Ok(256);
    }
    let bits = bit_or_byte_width(suffix, 8, 256)?;
    if bits % 8 != 0 {
        return Err(format!("integer width {} is not a multiple of 8", bits));
    }
    Ok(bits)
}

fn bit_or_byte_width(suffix: &str, min: usize, max: usize) -> Result<usize, String> {
    let width: usize = suffix
        .parse()
        .map_err(|_| format!("invalid type width '{}'", suffix))?;
    if width < min || width > max {
        return Err(format!("type width {} out of range {}..={}", width, min, max));
    }
    Ok(width)
}

/// A two's complement word fits in `bits` when everything from the sign
/// bit upward is a copy of the sign.
fn fits_signed(raw: U256, bits: usize) -> bool {
    let upper = raw >> (bits - 1);
    upper.is_zero() || upper == U256::MAX >> (bits - 1)
}

fn parse_uint(value: &str) -> Result<U256, String> {
    match value.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(value).map_err(|e| e.to_string()),
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>, String> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value)).map_err(|e| e.to_string())
}
