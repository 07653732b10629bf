//! Register plumbing shared by the register-level modules
//!
//! Each driver's `ll` module declares its registers with `impl_register!` and
//! provides a `RegAccessor` that knows the chip's bus framing. This module
//! only holds the chip-independent parts: the register traits, raw value
//! conversion and the field accessor generator.
//!
//! **NOTE**: Field write methods accept types that may have more bits than the
//! field. Values that are too large are silently truncated.

/// Implemented for all registers
///
/// This is a mostly internal trait that should not be implemented or used
/// directly by users of this crate. It is exposed through the public API
/// though, so it can't be made private.
pub trait Register {
    /// Type of the register address on this chip
    type Address: Copy;

    /// The register address
    const ADDRESS: Self::Address;

    /// Native width of the register
    type Raw: RegisterValue;
}

/// Marker trait for registers that can be read from
pub trait Readable: Register {
    /// The type that is used to read from the register
    type Read;

    /// Wrap a raw value read from the chip
    fn from_raw(raw: Self::Raw) -> Self::Read;

    /// Return the raw value of a read
    fn raw(r: &Self::Read) -> Self::Raw;
}

/// Marker trait for registers that can be written to
pub trait Writable: Register {
    /// The type that is used to write to the register
    type Write;

    /// Return the write type for this register, starting from `raw`
    fn write(raw: Self::Raw) -> Self::Write;

    /// Return the raw value to be written
    fn into_raw(w: &Self::Write) -> Self::Raw;
}

/// Integer types registers are built from
pub trait RegisterValue: Copy + Default {
    /// Width in bytes
    const LEN: usize;

    /// Decode from big-endian bytes
    fn from_be_slice(bytes: &[u8]) -> Self;

    /// Decode from little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Encode as big-endian bytes into `bytes[..LEN]`
    fn write_be(self, bytes: &mut [u8]);

    /// Encode as little-endian bytes into `bytes[..LEN]`
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_register_value {
    ($($ty:ty,)*) => {
        $(
            impl RegisterValue for $ty {
                const LEN: usize = ::core::mem::size_of::<$ty>();

                fn from_be_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0; ::core::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::LEN]);
                    <$ty>::from_be_bytes(buf)
                }

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0; ::core::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::LEN]);
                    <$ty>::from_le_bytes(buf)
                }

                fn write_be(self, bytes: &mut [u8]) {
                    bytes[..Self::LEN].copy_from_slice(&self.to_be_bytes());
                }

                fn write_le(self, bytes: &mut [u8]) {
                    bytes[..Self::LEN].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    }
}

impl_register_value! {
    u8,
    u16,
    u32,
}

/// Generates register implementations
///
/// Syntax:
///
/// ```text
/// impl_register! {
///     <Chip><<Bus>>, <address type>;
///     <address>, <raw type>, <RO/RW/WO>, <NAME>(<name>) { /// <doc>
///         <field>, <first-bit>, <last-bit>, <type>; /// <doc>
///     }
/// }
/// ```
///
/// The invoking module must define a `RegAccessor<'s, R, Bus>` tuple struct
/// wrapping `&'s mut Chip<Bus>`.
macro_rules! impl_register {
    (@rw RO, $name:ident, $name_lower:ident, $raw:ty) => {
        impl_register!(@r $name, $name_lower, $raw);
    };
    (@rw RW, $name:ident, $name_lower:ident, $raw:ty) => {
        impl_register!(@r $name, $name_lower, $raw);
        impl_register!(@w $name, $name_lower, $raw);
    };
    (@rw WO, $name:ident, $name_lower:ident, $raw:ty) => {
        impl_register!(@w $name, $name_lower, $raw);
    };
    (@r $name:ident, $name_lower:ident, $raw:ty) => {
        impl $crate::register::Readable for $name {
            type Read = $name_lower::R;

            fn from_raw(raw: $raw) -> Self::Read {
                $name_lower::R(raw)
            }

            fn raw(r: &Self::Read) -> $raw {
                r.0
            }
        }
    };
    (@w $name:ident, $name_lower:ident, $raw:ty) => {
        impl $crate::register::Writable for $name {
            type Write = $name_lower::W;

            fn write(raw: $raw) -> Self::Write {
                $name_lower::W(raw)
            }

            fn into_raw(w: &Self::Write) -> $raw {
                w.0
            }
        }
    };
    (
        $chip:ident<$bus:ident>, $addr_ty:ty;
        $(
            $addr:expr,
            $raw:ty,
            $rw:tt,
            $name:ident($name_lower:ident) {
            #[$doc:meta]
            $(
                $field:ident,
                $first_bit:expr,
                $last_bit:expr,
                $ty:ty;
                #[$field_doc:meta]
            )*
            }
        )*
    ) => {
        $(
            #[$doc]
            #[allow(non_camel_case_types)]
            pub struct $name;

            impl $crate::register::Register for $name {
                type Address = $addr_ty;
                const ADDRESS: $addr_ty = $addr;
                type Raw = $raw;
            }

            #[$doc]
            pub mod $name_lower {
                use core::fmt;

                /// Used to read from the register
                #[derive(Clone, Copy, PartialEq, Eq)]
                pub struct R(pub(crate) $raw);

                impl R {
                    /// The raw register value
                    #[inline(always)]
                    pub fn bits(&self) -> $raw {
                        self.0
                    }

                    $(
                        #[$field_doc]
                        #[inline(always)]
                        pub fn $field(&self) -> $ty {
                            const MASK: $raw =
                                <$raw>::MAX >> (<$raw>::BITS - ($last_bit - $first_bit + 1));

                            ((self.0 >> $first_bit) & MASK) as $ty
                        }
                    )*
                }

                impl fmt::Debug for R {
                    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                        write!(f, "{:#x}", self.0)
                    }
                }

                #[cfg(feature = "defmt")]
                impl defmt::Format for R {
                    fn format(&self, f: defmt::Formatter) {
                        defmt::write!(f, "{:#x}", self.0);
                    }
                }

                /// Used to write to the register
                pub struct W(pub(crate) $raw);

                impl W {
                    /// Overwrite the whole register value
                    #[inline(always)]
                    pub fn bits(&mut self, value: $raw) -> &mut Self {
                        self.0 = value;
                        self
                    }

                    $(
                        #[$field_doc]
                        #[inline(always)]
                        pub fn $field(&mut self, value: $ty) -> &mut Self {
                            const MASK: $raw =
                                <$raw>::MAX >> (<$raw>::BITS - ($last_bit - $first_bit + 1));

                            self.0 = (self.0 & !(MASK << $first_bit))
                                | (((value as $raw) & MASK) << $first_bit);
                            self
                        }
                    )*
                }
            }

            impl_register!(@rw $rw, $name, $name_lower, $raw);
        )*

        impl<$bus> $chip<$bus> {
            $(
                #[$doc]
                pub fn $name_lower(&mut self) -> RegAccessor<'_, $name, $bus> {
                    RegAccessor(self, ::core::marker::PhantomData)
                }
            )*
        }
    };
}
