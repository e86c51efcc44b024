//! Lexically time-ordered sled keys, adapted from the teacher's queue's
//! `make_order_key`/`parse_order_key`: an offset timestamp (so negative
//! millis still sort correctly) followed by a disambiguating suffix.

use crate::error::StorageError;

pub fn make_order_key(timestamp: i64, suffix: &str) -> Vec<u8> {
    let offset_timestamp = (timestamp as i128 + (1i128 << 62)) as u128;
    format!("{:020x}:{}", offset_timestamp, suffix).into_bytes()
}

pub fn parse_timestamp(key: &[u8]) -> Result<i64, StorageError> {
    let key_str = std::str::from_utf8(key).map_err(|_| StorageError::NotFound)?;
    let (hex_timestamp, _suffix) = key_str.split_once(':').ok_or(StorageError::NotFound)?;
    let offset_timestamp = u128::from_str_radix(hex_timestamp, 16).map_err(|_| StorageError::NotFound)?;
    Ok((offset_timestamp as i128 - (1i128 << 62)) as i64)
}
