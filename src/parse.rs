//! Helper macros for parsing packed structs.
//!
//! FLIR records are fixed-layout C structs whose byte order
//! is only known at runtime, so fields are read one by one
//! through a [`ByteOrdered`] reader.

use std::io::Error as IOError;

use anyhow::{ensure, Result};
use byteordered::{byteorder::ReadBytesExt, ByteOrdered, Endian, Endianness};

/// Declare [`Parseable`] structs.
///
/// A make-do for a derive macro. Supports only simple
/// structs without generics. Each field is `name => Type`,
/// optionally `name => Type as Converted` to widen the
/// parsed value.
macro_rules! declare_parseable_structs {
    (
        $(
            $(#[$smeta:meta])*
            $svis:vis struct $sname:ident {
                $($fvis:vis $name:ident => $ty:ty $(as $ty2:ty)?),* $(,)?
            }
        )*
    ) => {
        $(
            $(#[$smeta])* #[allow(dead_code)]
            $svis struct $sname {
                $($fvis $name: declaration_type!($ty $(as $ty2)?)),*
            }

            impl crate::parse::Parseable for $sname {
                type Error = anyhow::Error;
                fn parse<T, E>(
                    r: &mut byteordered::ByteOrdered<T, E>,
                ) -> ::std::result::Result<Self, Self::Error>
                where
                    T: byteordered::byteorder::ReadBytesExt,
                    E: byteordered::Endian,
                {
                    $(
                        let $name = anyhow::Context::with_context(
                            <$ty as crate::parse::Parseable>::parse(r),
                            || format!("parsing field `{}.{}`", stringify!($sname), stringify!($name)),
                        )? $(as $ty2)?;
                    )*
                    Ok($sname { $($name),* })
                }
            }
        )*
    };
}

/// Expands to the parsed type or the converted type.
macro_rules! declaration_type {
    ($ty:ty as $ty2:ty) => {
        $ty2
    };
    ($ty:ty) => {
        $ty
    };
}

pub(crate) trait Parseable: Sized {
    type Error;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, Self::Error>;
}

macro_rules! impl_parseable {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Parseable for $ty {
                type Error = IOError;
                fn parse<T: ReadBytesExt, E: Endian>(
                    r: &mut ByteOrdered<T, E>,
                ) -> Result<Self, IOError> {
                    r.$method()
                }
            }
        )*
    };
}

impl_parseable! {
    u8 => read_u8,
    u16 => read_u16,
    i16 => read_i16,
    u32 => read_u32,
    i32 => read_i32,
    f32 => read_f32,
}

impl<Ty, const N: usize> Parseable for [Ty; N]
where
    Ty: Parseable + Copy + Default,
    <Ty as Parseable>::Error: Into<anyhow::Error>,
{
    type Error = anyhow::Error;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, Self::Error> {
        let mut out = [Ty::default(); N];
        for slot in out.iter_mut() {
            *slot = Ty::parse(r).map_err(Into::into)?;
        }
        Ok(out)
    }
}

/// Parse a `P` starting at `offset` of `data`.
pub(crate) fn parse_at<P>(data: &[u8], offset: usize, little_endian: bool) -> Result<P>
where
    P: Parseable,
    <P as Parseable>::Error: Into<anyhow::Error>,
{
    ensure!(
        offset <= data.len(),
        "offset {:#x} past end of {} byte record",
        offset,
        data.len()
    );
    let endianness = if little_endian {
        Endianness::Little
    } else {
        Endianness::Big
    };
    let mut rdr = ByteOrdered::runtime(&data[offset..], endianness);
    P::parse(&mut rdr).map_err(Into::into)
}
