//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use nom::{
    IResult,
    branch::alt,
    bytes::complete::take,
    combinator::{map, map_res, verify},
    multi::many_m_n,
    number::complete::{be_u8, be_u16, be_u32, be_i64, be_f32, be_f64},
    sequence::tuple,
};

use std::convert::TryFrom;
use std::string::FromUtf16Error;

use crate::document::ObjectFormat;
use crate::codec::binary::utils::{be_usize_n, be_u128_low64_n};

/// Returns a parser which consumes a marker conforming to the specified format.
fn marker(
    format: ObjectFormat
) -> impl Fn(&[u8]) -> IResult<&[u8], (ObjectFormat, u8)> {
    move |input: &[u8]| {
        map(
            verify(take(1usize), move |b: &[u8]| -> bool {
                (b[0] & format.tag_mask()) == format.tag_bits()
            }),
            move |b: &[u8]| -> (ObjectFormat, u8) {
                (format, b[0] & format.value_mask())
            }
        )(input)
    }
}

/// Parses a marker byte and returns both the object format and encoded value.
pub fn any_marker(input: &[u8]) -> IResult<&[u8], (ObjectFormat, u8)> {
    alt((
        marker(ObjectFormat::Null),
        marker(ObjectFormat::Boolean),
        marker(ObjectFormat::Fill),
        marker(ObjectFormat::UInt8),
        marker(ObjectFormat::UInt16),
        marker(ObjectFormat::UInt32),
        marker(ObjectFormat::SInt64),
        marker(ObjectFormat::UInt128),
        marker(ObjectFormat::Float32),
        marker(ObjectFormat::Float64),
        marker(ObjectFormat::Date),
        marker(ObjectFormat::Data),
        marker(ObjectFormat::AsciiString),
        marker(ObjectFormat::Utf16String),
        marker(ObjectFormat::Uid),
        marker(ObjectFormat::Array),
        marker(ObjectFormat::Dictionary),
    ))(input)
}

pub fn null(input: &[u8]) -> IResult<&[u8], ()> {
    map(marker(ObjectFormat::Null), |_| ())(input)
}

pub fn boolean(input: &[u8]) -> IResult<&[u8], bool> {
    map(marker(ObjectFormat::Boolean), |(_, value)| value == 1)(input)
}

pub fn fill(input: &[u8]) -> IResult<&[u8], ()> {
    map(marker(ObjectFormat::Fill), |_| ())(input)
}

pub fn uint8(input: &[u8]) -> IResult<&[u8], u8> {
    map(tuple((marker(ObjectFormat::UInt8), be_u8)), |(_, value)| value)(input)
}

pub fn uint16(input: &[u8]) -> IResult<&[u8], u16> {
    map(tuple((marker(ObjectFormat::UInt16), be_u16)), |(_, value)| value)(input)
}

pub fn uint32(input: &[u8]) -> IResult<&[u8], u32> {
    map(tuple((marker(ObjectFormat::UInt32), be_u32)), |(_, value)| value)(input)
}

pub fn sint64(input: &[u8]) -> IResult<&[u8], i64> {
    map(tuple((marker(ObjectFormat::SInt64), be_i64)), |(_, value)| value)(input)
}

/// Parses the 16-byte wide integer form; only the low 64 bits are kept, per
/// invariant 4 (negative values never use this encoding).
pub fn uint128_low64(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, _) = marker(ObjectFormat::UInt128)(input)?;
    be_u128_low64_n(16)(input)
}

pub fn float32(input: &[u8]) -> IResult<&[u8], f32> {
    map(tuple((marker(ObjectFormat::Float32), be_f32)), |(_, value)| value)(input)
}

pub fn float64(input: &[u8]) -> IResult<&[u8], f64> {
    map(tuple((marker(ObjectFormat::Float64), be_f64)), |(_, value)| value)(input)
}

pub fn date(input: &[u8]) -> IResult<&[u8], f64> {
    map(tuple((marker(ObjectFormat::Date), be_f64)), |(_, value)| value)(input)
}

/// Returns a parser for the length of an object payload, given the value
/// encoded in the marker byte.
fn payload_count(
    encoded_value: u8,
) -> impl Fn(&[u8]) -> IResult<&[u8], usize> {
    assert!((encoded_value & 0b1111_0000) == 0, "encoded length must be a 4-bit value");
    move |input: &[u8]| {
        if encoded_value == 0b0000_1111 {
            map_res(
                alt((
                    map(uint8, |value| value as u64),
                    map(uint16, |value| value as u64),
                    map(uint32, |value| value as u64),
                    map(sint64, |value| value as u64),
                )),
                |value| usize::try_from(value)
            )(input)
        } else {
            Ok((input, encoded_value as usize))
        }
    }
}

pub fn data(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, (_, encoded_value)) = marker(ObjectFormat::Data)(input)?;
    let (input, data_length) = payload_count(encoded_value)(input)?;
    take(data_length)(input)
}

/// The marker name is inherited from the format's `0x5_` ASCII string tag,
/// but a byte with the high bit set is widened to its Latin-1 code point
/// rather than rejected, since real-world writers emit bytes above 0x7F
/// under this tag despite the name.
pub fn ascii_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, (_, encoded_value)) = marker(ObjectFormat::AsciiString)(input)?;
    let (input, char_count) = payload_count(encoded_value)(input)?;
    map(
        take(char_count),
        |bytes: &[u8]| bytes.iter().map(|&b| b as char).collect::<String>()
    )(input)
}

pub fn utf16_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, (_, encoded_value)) = marker(ObjectFormat::Utf16String)(input)?;
    let (input, char_count) = payload_count(encoded_value)(input)?;
    map_res(
        many_m_n(char_count, char_count, be_u16),
        |code_points| -> Result<String, FromUtf16Error> {
            String::from_utf16(&code_points)
        }
    )(input)
}

pub fn uid(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, (_, encoded_value)) = marker(ObjectFormat::Uid)(input)?;
    take(encoded_value + 1)(input)
}

pub fn array(
    object_reference_size: usize
) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<usize>> {
    assert!(object_reference_size <= 8, "object references must be up to 8 bytes long");
    move |input: &[u8]| {
        let (input, (_, encoded_value)) = marker(ObjectFormat::Array)(input)?;
        let (input, array_length) = payload_count(encoded_value)(input)?;
        many_m_n(array_length, array_length, be_usize_n(object_reference_size))(input)
    }
}

pub fn dictionary(
    object_reference_size: usize
) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<(usize, usize)>> {
    assert!(object_reference_size <= 8, "object references must be up to 8 bytes long");
    move |input: &[u8]| {
        let (input, (_, encoded_value)) = marker(ObjectFormat::Dictionary)(input)?;
        let (input, entry_count) = payload_count(encoded_value)(input)?;
        map(
            tuple((
                many_m_n(entry_count, entry_count, be_usize_n(object_reference_size)),
                many_m_n(entry_count, entry_count, be_usize_n(object_reference_size)),
            )), |(mut keys, mut values)| {
                keys.drain(..).zip(values.drain(..)).collect::<Vec<(usize, usize)>>()
            }
        )(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean() {
        assert_eq!(boolean(&[0b0000_1000]), Ok((&[][..], false)));
        assert_eq!(boolean(&[0b0000_1001]), Ok((&[][..], true)));
    }

    #[test]
    fn test_null() {
        assert_eq!(null(&[0b0000_0000]), Ok((&[][..], ())));
    }

    #[test]
    fn test_uint128_low64() {
        let mut input = vec![0x14u8];
        input.extend_from_slice(&[0u8; 8]);
        input.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 7]);
        assert_eq!(uint128_low64(&input), Ok((&[][..], 7u64)));
    }

    #[test]
    fn test_ascii_string() {
        let test_input = &[0b0101_0101, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        assert_eq!(ascii_string(test_input), Ok((&[][..], "Hello".to_string())));
    }

    #[test]
    fn test_ascii_string_high_bit_bytes_widen_to_latin1() {
        let test_input = &[0b0101_0001, 0xe9];
        assert_eq!(ascii_string(test_input), Ok((&[][..], "\u{e9}".to_string())));
    }

    #[test]
    fn test_array() {
        let test_input = &[0b1010_0100, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(array(2)(test_input), Ok((&[][..], vec![0, 1, 2, 3])));
    }

    #[test]
    fn test_dictionary() {
        let test_input = &[0b1101_0010, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(dictionary(2)(test_input), Ok((&[][..], vec![(0, 2), (1, 3)])));
    }
}
