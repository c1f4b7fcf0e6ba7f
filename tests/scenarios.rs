//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Cross-codec end-to-end scenarios, one test per literal scenario this
//! crate is exercised against: an XML-sourced tree taken through the
//! binary, JSON, and OpenStep writers and back.

use plist::tree::Integer;
use plist::{Format, WriteOptions};

fn write_opts() -> WriteOptions {
    WriteOptions { compact: false, sort_keys: false, coerce: false }
}

#[test]
fn xml_to_binary_round_trip() {
    let xml = b"<plist><dict><key>a</key><integer>1</integer><key>b</key><true/></dict></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();
    assert_eq!(tree.dict_len(root), 2);

    let binary = plist::write(&mut tree, root, Format::Binary, write_opts()).unwrap();
    assert!(binary.starts_with(b"bplist00"));
    assert!(binary.len() >= 8 + 32);

    let (tree2, root2) = plist::read_as(&binary, Format::Binary).unwrap();
    assert_eq!(tree2.dict_len(root2), 2);
    let a = tree2.dict_get_item(root2, "a").unwrap();
    assert_eq!(tree2.get_int_val(a), 1);
    let b = tree2.dict_get_item(root2, "b").unwrap();
    assert!(tree2.get_bool_val(b));
}

#[test]
fn cfuid_promotion_round_trips_through_xml() {
    let xml = b"<plist><dict><key>CF$UID</key><integer>7</integer></dict></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();
    assert_eq!(tree.get_uid_val(root), 7);

    let out = plist::write(&mut tree, root, Format::Xml, write_opts()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("CF$UID"));
    assert!(text.contains("<integer>7</integer>"));

    let (tree2, root2) = plist::read_as(text.as_bytes(), Format::Xml).unwrap();
    assert_eq!(tree2.get_uid_val(root2), 7);
}

#[test]
fn extra_root_value_is_rejected() {
    let xml = b"<plist><string>one</string><string>two</string></plist>";
    let err = plist::read_as(xml, Format::Xml).unwrap_err();
    assert!(matches!(err, plist::Error::Parse(_)));
}

#[test]
fn integer_width_is_preserved_through_binary_and_xml() {
    let xml = b"<plist><dict><key>big</key><integer>18446744073709551615</integer></dict></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();
    let big = tree.dict_get_item(root, "big").unwrap();
    assert_eq!(tree.get_integer(big), Some(Integer::Wide(u64::MAX)));

    let binary = plist::write(&mut tree, root, Format::Binary, write_opts()).unwrap();
    let (tree2, root2) = plist::read_as(&binary, Format::Binary).unwrap();
    let big2 = tree2.dict_get_item(root2, "big").unwrap();
    assert_eq!(tree2.get_integer(big2), Some(Integer::Wide(u64::MAX)));
    assert_eq!(tree2.get_uint_val(big2), u64::MAX);

    let mut tree3 = tree2;
    let xml_out = plist::write(&mut tree3, root2, Format::Xml, write_opts()).unwrap();
    let text = String::from_utf8(xml_out).unwrap();
    assert!(text.contains("<integer>18446744073709551615</integer>"));
}

#[test]
fn base64_data_round_trips() {
    let xml = b"<plist><data>\n  SGVsbG8sIFdvcmxkIQ==\n</data></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();
    assert_eq!(tree.get_data_val(root), b"Hello, World!".to_vec());

    let out = plist::write(&mut tree, root, Format::Xml, write_opts()).unwrap();
    let (tree2, root2) = plist::read_as(&out, Format::Xml).unwrap();
    assert_eq!(tree2.get_data_val(root2), b"Hello, World!".to_vec());
}

#[test]
fn date_epoch_conversion() {
    let xml = b"<plist><date>2001-01-01T00:00:00Z</date></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();
    assert_eq!(tree.get_date_val(root), 0.0);
    assert_eq!(tree.get_unix_date_val(root), 978_307_200.0);

    let binary = plist::write(&mut tree, root, Format::Binary, write_opts()).unwrap();
    // Object record 0 is the date: tag byte 0x33 followed by eight zero bytes.
    let record_start = 8;
    assert_eq!(binary[record_start], 0x33);
    assert_eq!(&binary[record_start + 1..record_start + 9], &[0u8; 8]);
}

#[test]
fn json_round_trip_with_coerce() {
    let xml = b"<plist><dict><key>data</key><data>SGVsbG8=</data></dict></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();

    let no_coerce = plist::write(&mut tree, root, Format::Json, write_opts());
    assert!(no_coerce.is_err());

    let coerce_opts = WriteOptions { compact: true, sort_keys: false, coerce: true };
    let json = plist::write(&mut tree, root, Format::Json, coerce_opts).unwrap();
    let (tree2, root2) = plist::read_as(&json, Format::Json).unwrap();
    let data = tree2.dict_get_item(root2, "data").unwrap();
    assert_eq!(tree2.get_string_val(data), "SGVsbG8=");
}

#[test]
fn openstep_round_trip_preserves_structure() {
    let xml = b"<plist><dict><key>name</key><string>Alice</string><key>age</key><integer>30</integer></dict></plist>";
    let (mut tree, root) = plist::read_as(xml, Format::Xml).unwrap();

    let openstep = plist::write(&mut tree, root, Format::OpenStep, write_opts()).unwrap();
    let (tree2, root2) = plist::read_as(&openstep, Format::OpenStep).unwrap();
    let name = tree2.dict_get_item(root2, "name").unwrap();
    assert_eq!(tree2.get_string_val(name), "Alice");
    let age = tree2.dict_get_item(root2, "age").unwrap();
    assert_eq!(tree2.get_int_val(age), 30);
}

#[test]
fn sniffing_dispatches_to_the_right_codec() {
    let (tree, root) = plist::read_from_memory(b"{ a = 1; }").unwrap();
    let a = tree.dict_get_item(root, "a").unwrap();
    assert_eq!(tree.get_int_val(a), 1);

    let (tree2, root2) = plist::read_from_memory(br#"{"a": 1}"#).unwrap();
    let a2 = tree2.dict_get_item(root2, "a").unwrap();
    assert_eq!(tree2.get_int_val(a2), 1);
}
