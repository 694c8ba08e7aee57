//! Little-endian (un)packing of the scalar types stored in LAS records.

use byteorder::{ByteOrder, LittleEndian};

pub trait Packable: Sized + Copy {
    const SIZE: usize;

    fn unpack_from(input: &[u8]) -> Self;
    fn pack_into(&self, output: &mut [u8]);
}

impl Packable for u8 {
    const SIZE: usize = 1;

    fn unpack_from(input: &[u8]) -> Self {
        input[0]
    }

    fn pack_into(&self, output: &mut [u8]) {
        output[0] = *self;
    }
}

impl Packable for i8 {
    const SIZE: usize = 1;

    fn unpack_from(input: &[u8]) -> Self {
        input[0] as i8
    }

    fn pack_into(&self, output: &mut [u8]) {
        output[0] = *self as u8;
    }
}

macro_rules! impl_packable_with_byteorder {
    ($type:ty, $size:expr, $read_fn:ident, $write_fn:ident) => {
        impl Packable for $type {
            const SIZE: usize = $size;

            #[inline]
            fn unpack_from(input: &[u8]) -> Self {
                LittleEndian::$read_fn(&input[..$size])
            }

            #[inline]
            fn pack_into(&self, output: &mut [u8]) {
                LittleEndian::$write_fn(&mut output[..$size], *self)
            }
        }
    };
}

impl_packable_with_byteorder!(u16, 2, read_u16, write_u16);
impl_packable_with_byteorder!(i16, 2, read_i16, write_i16);
impl_packable_with_byteorder!(u32, 4, read_u32, write_u32);
impl_packable_with_byteorder!(i32, 4, read_i32, write_i32);
impl_packable_with_byteorder!(u64, 8, read_u64, write_u64);
impl_packable_with_byteorder!(i64, 8, read_i64, write_i64);
impl_packable_with_byteorder!(f32, 4, read_f32, write_f32);
impl_packable_with_byteorder!(f64, 8, read_f64, write_f64);
