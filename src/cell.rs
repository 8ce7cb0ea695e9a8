/*!
 * Typed Atomic Handle
 *
 * `AtomicCell<T>` lets any fixed-size scalar whose every bit pattern is
 * a valid value be used atomically, by carrying its bits in the
 * smallest raw atomic at least as wide as the type. Comparisons made by
 * the compare-and-set family are bitwise, not `PartialEq`: `f32` NaNs
 * with equal bits compare equal, and `-0.0` does not match `0.0`.
 */

use crate::order::MemOrder;
use crate::raw::{Primitive, RawAtom, RawU16, RawU32, RawU64, RawU8, RawUsize};
use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::ptr;

/// Marker for types whose every bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must guarantee all of the following:
/// - every bit pattern of the type is a valid, well-defined value
///   (`bool` and `char` do not qualify and are deliberately not
///   implemented);
/// - the type has no padding bytes;
/// - `size_of::<Self>() <= size_of::<<Self::Atom as RawAtom>::Prim>()`.
pub unsafe trait BitValid: Copy + Send + 'static {
    /// Carrier atomic wide enough to hold the value's bits.
    type Atom: RawAtom;
}

/// Marker for `BitValid` integers that are exactly as wide as their
/// carrier, so wrapping arithmetic on the carrier is wrapping
/// arithmetic on the type.
///
/// # Safety
///
/// `size_of::<Self>() == size_of::<<Self::Atom as RawAtom>::Prim>()`
/// and the type must be a two's complement integer.
pub unsafe trait BitValidInt: BitValid {}

type Prim<T> = <<T as BitValid>::Atom as RawAtom>::Prim;

fn pack<T: BitValid>(value: T) -> Prim<T> {
    let mut bits = Prim::<T>::ZERO;
    // the carrier is at least as wide as T; unused bytes stay zero
    unsafe {
        ptr::copy_nonoverlapping(
            (&value as *const T).cast::<u8>(),
            (&mut bits as *mut Prim<T>).cast::<u8>(),
            size_of::<T>(),
        );
    }
    bits
}

fn unpack<T: BitValid>(bits: Prim<T>) -> T {
    let mut value = MaybeUninit::<T>::uninit();
    unsafe {
        ptr::copy_nonoverlapping(
            (&bits as *const Prim<T>).cast::<u8>(),
            value.as_mut_ptr().cast::<u8>(),
            size_of::<T>(),
        );
        value.assume_init()
    }
}

/// Width-erasing atomic container for a [`BitValid`] scalar.
///
/// Plain methods order with [`MemOrder::Full`]; each has an `_ordered`
/// form taking an explicit level. Memory is only ever accessed through
/// the raw atomic once the cell is shared; plain access exists solely
/// at construction and teardown, which require ownership.
pub struct AtomicCell<T: BitValid> {
    atom: T::Atom,
    _marker: PhantomData<T>,
}

unsafe impl<T: BitValid> Sync for AtomicCell<T> {}

impl<T: BitValid> AtomicCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            atom: <T::Atom as RawAtom>::new(pack(value)),
            _marker: PhantomData,
        }
    }

    pub fn into_inner(self) -> T {
        unpack::<T>(self.atom.into_prim())
    }

    pub fn get(&self) -> T {
        self.get_ordered(MemOrder::Full)
    }

    pub fn get_ordered(&self, order: MemOrder) -> T {
        unpack::<T>(self.atom.get(order))
    }

    pub fn set(&self, value: T) {
        self.set_ordered(value, MemOrder::Full);
    }

    pub fn set_ordered(&self, value: T, order: MemOrder) {
        self.atom.set(pack(value), order);
    }

    /// Exchange; returns the previous value.
    pub fn get_set(&self, value: T) -> T {
        self.get_set_ordered(value, MemOrder::Full)
    }

    pub fn get_set_ordered(&self, value: T, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_set(pack(value), order))
    }

    /// Bitwise compare-and-set; reports success only.
    pub fn compare_set(&self, cmp: T, set: T) -> bool {
        self.compare_set_ordered(cmp, set, MemOrder::Full)
    }

    pub fn compare_set_ordered(&self, cmp: T, set: T, order: MemOrder) -> bool {
        self.atom.compare_set(pack(cmp), pack(set), order)
    }

    /// Bitwise compare-and-set; returns the previous value whether or
    /// not the exchange took place.
    pub fn get_compare_set(&self, cmp: T, set: T) -> T {
        self.get_compare_set_ordered(cmp, set, MemOrder::Full)
    }

    pub fn get_compare_set_ordered(&self, cmp: T, set: T, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_compare_set(pack(cmp), pack(set), order))
    }

    /// Single bitwise compare-and-set attempt: `Ok(previous)` on
    /// success, `Err(current)` on failure, spurious failures included.
    pub fn compare_set_else_get(&self, cmp: T, set: T) -> Result<T, T> {
        self.compare_set_else_get_ordered(cmp, set, MemOrder::Full)
    }

    pub fn compare_set_else_get_ordered(&self, cmp: T, set: T, order: MemOrder) -> Result<T, T> {
        self.atom
            .compare_set_else_get(pack(cmp), pack(set), order)
            .map(unpack::<T>)
            .map_err(unpack::<T>)
    }
}

impl<T: BitValidInt> AtomicCell<T> {
    pub fn add(&self, n: T) {
        self.add_ordered(n, MemOrder::Full);
    }

    pub fn add_ordered(&self, n: T, order: MemOrder) {
        self.atom.add(pack(n), order);
    }

    /// Wrapping add; returns the previous value.
    pub fn get_add(&self, n: T) -> T {
        self.get_add_ordered(n, MemOrder::Full)
    }

    pub fn get_add_ordered(&self, n: T, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_add(pack(n), order))
    }

    /// Wrapping increment by one; returns the previous value.
    pub fn get_add1(&self) -> T {
        self.get_add1_ordered(MemOrder::Full)
    }

    pub fn get_add1_ordered(&self, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_add1(order))
    }

    pub fn subtract(&self, n: T) {
        self.subtract_ordered(n, MemOrder::Full);
    }

    pub fn subtract_ordered(&self, n: T, order: MemOrder) {
        self.atom.subtract(pack(n), order);
    }

    /// Wrapping subtract; returns the previous value.
    pub fn get_subtract(&self, n: T) -> T {
        self.get_subtract_ordered(n, MemOrder::Full)
    }

    pub fn get_subtract_ordered(&self, n: T, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_subtract(pack(n), order))
    }

    /// Wrapping decrement by one; returns the previous value.
    pub fn get_subtract1(&self) -> T {
        self.get_subtract1_ordered(MemOrder::Full)
    }

    pub fn get_subtract1_ordered(&self, order: MemOrder) -> T {
        unpack::<T>(self.atom.get_subtract1(order))
    }
}

impl<T: BitValid + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: BitValid + std::fmt::Debug> std::fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicCell").field(&self.get()).finish()
    }
}

macro_rules! bit_valid {
    ($($t:ty => $atom:ty),* $(,)?) => {$(
        const _: () = assert!(
            size_of::<$t>() <= size_of::<<$atom as RawAtom>::Prim>()
        );

        unsafe impl BitValid for $t {
            type Atom = $atom;
        }
    )*};
}

macro_rules! bit_valid_int {
    ($($t:ty),* $(,)?) => {$(
        const _: () = assert!(
            size_of::<$t>() == size_of::<Prim<$t>>()
        );

        unsafe impl BitValidInt for $t {}
    )*};
}

#[cfg(target_has_atomic = "8")]
bit_valid! {
    u8 => RawU8,
    i8 => RawU8,
    () => RawU8,
}

#[cfg(target_has_atomic = "16")]
bit_valid! {
    u16 => RawU16,
    i16 => RawU16,
}

#[cfg(target_has_atomic = "32")]
bit_valid! {
    u32 => RawU32,
    i32 => RawU32,
    f32 => RawU32,
}

#[cfg(target_has_atomic = "64")]
bit_valid! {
    u64 => RawU64,
    i64 => RawU64,
    f64 => RawU64,
}

#[cfg(target_has_atomic = "ptr")]
bit_valid! {
    usize => RawUsize,
    isize => RawUsize,
}

#[cfg(target_has_atomic = "8")]
bit_valid_int!(u8, i8);
#[cfg(target_has_atomic = "16")]
bit_valid_int!(u16, i16);
#[cfg(target_has_atomic = "32")]
bit_valid_int!(u32, i32);
#[cfg(target_has_atomic = "64")]
bit_valid_int!(u64, i64);
#[cfg(target_has_atomic = "ptr")]
bit_valid_int!(usize, isize);
