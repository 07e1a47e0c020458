// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Differential property test: for a generated scalar message, this crate's
//! encoder must agree byte-for-byte with `prost`'s canonical encoding of the
//! same field values, and this crate's decoder must recover exactly what
//! `bolero` generated. Mirrors the teacher workspace's own
//! generate-encode-compare-against-prost roundtrip pattern used throughout
//! `datadog-profiling-protobuf`.

use prost::Message as _;

use nanoproto::stream::{InputStream, OutputStream};
use nanoproto::{decode, encode, Allocation as A, FieldInfo, FieldType, LogicalType as L, MessageDescriptor, Repetition as R};

#[repr(C)]
struct ScalarMsg {
    a: i32,
    has_a: bool,
    b: u32,
    has_b: bool,
    c: i32,
    has_c: bool,
    d: bool,
    has_d: bool,
    e: u32,
    has_e: bool,
    f: u64,
    has_f: bool,
}

const OFF_A: i32 = core::mem::offset_of!(ScalarMsg, a) as i32;
const OFF_HAS_A: i32 = core::mem::offset_of!(ScalarMsg, has_a) as i32;
const OFF_B: i32 = core::mem::offset_of!(ScalarMsg, b) as i32;
const OFF_HAS_B: i32 = core::mem::offset_of!(ScalarMsg, has_b) as i32;
const OFF_C: i32 = core::mem::offset_of!(ScalarMsg, c) as i32;
const OFF_HAS_C: i32 = core::mem::offset_of!(ScalarMsg, has_c) as i32;
const OFF_D: i32 = core::mem::offset_of!(ScalarMsg, d) as i32;
const OFF_HAS_D: i32 = core::mem::offset_of!(ScalarMsg, has_d) as i32;
const OFF_E: i32 = core::mem::offset_of!(ScalarMsg, e) as i32;
const OFF_HAS_E: i32 = core::mem::offset_of!(ScalarMsg, has_e) as i32;
const OFF_F: i32 = core::mem::offset_of!(ScalarMsg, f) as i32;
const OFF_HAS_F: i32 = core::mem::offset_of!(ScalarMsg, has_f) as i32;

// `FieldInfo::data_offset` is a delta from the previous field's own
// absolute offset (see `field_iter::FieldIter`'s running `data_base`), so
// every entry after the first is computed relative to its predecessor
// rather than from the struct's base.
static SCALAR_FIELDS: [FieldInfo; 6] = [
    FieldInfo {
        tag: 1,
        field_type: FieldType::new(L::SVarint, R::Optional, A::Static),
        data_offset: OFF_A,
        size_offset: OFF_HAS_A - OFF_A,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    },
    FieldInfo {
        tag: 2,
        field_type: FieldType::new(L::UVarint, R::Optional, A::Static),
        data_offset: OFF_B - OFF_A,
        size_offset: OFF_HAS_B - OFF_B,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    },
    FieldInfo {
        tag: 3,
        field_type: FieldType::new(L::SVarint, R::Optional, A::Static),
        data_offset: OFF_C - OFF_B,
        size_offset: OFF_HAS_C - OFF_C,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    },
    FieldInfo {
        tag: 4,
        field_type: FieldType::new(L::Bool, R::Optional, A::Static),
        data_offset: OFF_D - OFF_C,
        size_offset: OFF_HAS_D - OFF_D,
        array_size: 0,
        data_size: 1,
        submsg_index: None,
    },
    FieldInfo {
        tag: 5,
        field_type: FieldType::new(L::Fixed32, R::Optional, A::Static),
        data_offset: OFF_E - OFF_D,
        size_offset: OFF_HAS_E - OFF_E,
        array_size: 0,
        data_size: 4,
        submsg_index: None,
    },
    FieldInfo {
        tag: 6,
        field_type: FieldType::new(L::Fixed64, R::Optional, A::Static),
        data_offset: OFF_F - OFF_E,
        size_offset: OFF_HAS_F - OFF_F,
        array_size: 0,
        data_size: 8,
        submsg_index: None,
    },
];

static SCALAR_DESCRIPTOR: MessageDescriptor = MessageDescriptor {
    fields: &SCALAR_FIELDS,
    submessages: &[],
    default_value: &[],
    required_field_count: 0,
    largest_tag: 6,
    field_callback: None,
};

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
struct GenScalar {
    a: i32,
    b: u32,
    c: i32,
    d: bool,
    e: u32,
    f: u64,
}

#[derive(Clone, PartialEq, Debug, ::prost::Message)]
struct ProstScalar {
    #[prost(sint32, optional, tag = "1")]
    a: Option<i32>,
    #[prost(uint32, optional, tag = "2")]
    b: Option<u32>,
    #[prost(sint32, optional, tag = "3")]
    c: Option<i32>,
    #[prost(bool, optional, tag = "4")]
    d: Option<bool>,
    #[prost(fixed32, optional, tag = "5")]
    e: Option<u32>,
    #[prost(fixed64, optional, tag = "6")]
    f: Option<u64>,
}

fn zeroed_scalar_msg() -> ScalarMsg {
    ScalarMsg {
        a: 0,
        has_a: false,
        b: 0,
        has_b: false,
        c: 0,
        has_c: false,
        d: false,
        has_d: false,
        e: 0,
        has_e: false,
        f: 0,
        has_f: false,
    }
}

#[test]
fn scalar_fields_encode_identically_to_prost_and_roundtrip() {
    bolero::check!().with_type::<GenScalar>().for_each(|gen: &GenScalar| {
        let mut msg = zeroed_scalar_msg();
        msg.a = gen.a;
        msg.has_a = true;
        msg.b = gen.b;
        msg.has_b = true;
        msg.c = gen.c;
        msg.has_c = true;
        msg.d = gen.d;
        msg.has_d = true;
        msg.e = gen.e;
        msg.has_e = true;
        msg.f = gen.f;
        msg.has_f = true;

        let mut buf = Vec::new();
        let mut out = OutputStream::new(&mut buf, 128);
        unsafe {
            encode(&mut out, &SCALAR_DESCRIPTOR, &msg as *const ScalarMsg as *const u8).unwrap();
        }

        let prost_expected = ProstScalar {
            a: Some(gen.a),
            b: Some(gen.b),
            c: Some(gen.c),
            d: Some(gen.d),
            e: Some(gen.e),
            f: Some(gen.f),
        };
        let mut prost_buf = Vec::new();
        prost_expected.encode(&mut prost_buf).unwrap();
        assert_eq!(buf, prost_buf, "wire bytes must match prost's canonical encoding");

        let decoded_by_prost = ProstScalar::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded_by_prost, prost_expected);

        let mut fresh = zeroed_scalar_msg();
        let mut data: &[u8] = &buf;
        let mut input = InputStream::new(&mut data, buf.len() as u64);
        unsafe {
            decode(&mut input, &SCALAR_DESCRIPTOR, &mut fresh as *mut ScalarMsg as *mut u8).unwrap();
        }
        assert_eq!(fresh.a, gen.a);
        assert!(fresh.has_a);
        assert_eq!(fresh.b, gen.b);
        assert!(fresh.has_b);
        assert_eq!(fresh.c, gen.c);
        assert!(fresh.has_c);
        assert_eq!(fresh.d, gen.d);
        assert!(fresh.has_d);
        assert_eq!(fresh.e, gen.e);
        assert!(fresh.has_e);
        assert_eq!(fresh.f, gen.f);
        assert!(fresh.has_f);
    });
}
