//! Boundary conversions for column-major foreign callers.
//!
//! Foreign arrays are the transpose of ours: extents, strides and kind arrays
//! are reversed end to end. Nothing here holds state beyond one call.
use crate::api::{ApiError, Iodim, R2rKind};
use libc::{c_char, c_int, c_void};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("Rank must not be negative, got {0}")]
    NegativeRank(c_int),
    #[error("Null pointer for {0}")]
    NullArgument(&'static str),
    #[error("Array lengths differ: {n} extents, {is} input strides, {os} output strides")]
    LengthMismatch { n: usize, is: usize, os: usize },
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type WriteCharFn = unsafe extern "C" fn(*mut c_char, *mut c_void);
pub type ReadCharFn = unsafe extern "C" fn(*mut c_int, *mut c_void);

pub fn reverse_extents<T: Copy>(values: &[T]) -> Vec<T> {
    values.iter().rev().copied().collect()
}

/// Reversed, validated extents.
pub fn extents_reversed(n: &[c_int]) -> Result<Vec<usize>, MarshalError> {
    reverse_extents(n)
        .into_iter()
        .enumerate()
        .map(|(axis, n)| {
            usize::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or(MarshalError::Api(ApiError::InvalidExtent { axis, n: i64::from(n) }))
        })
        .collect()
}

/// Builds dimensions from parallel extent/stride arrays, reversing all three.
pub fn make_dims_reversed(n: &[c_int], is: &[c_int], os: &[c_int]) -> Result<Vec<Iodim>, MarshalError> {
    if n.len() != is.len() || n.len() != os.len() {
        return Err(MarshalError::LengthMismatch { n: n.len(), is: is.len(), os: os.len() });
    }
    let extents = extents_reversed(n)?;
    Ok(extents
        .into_iter()
        .zip(is.iter().rev().zip(os.iter().rev()))
        .map(|(n, (&is, &os))| Iodim {
            n,
            is: is as isize,
            os: os as isize,
        })
        .collect())
}

/// Maps integer kind codes, reversing their order.
pub fn ints_to_kinds(codes: &[c_int]) -> Result<Vec<R2rKind>, MarshalError> {
    codes
        .iter()
        .rev()
        .map(|&code| R2rKind::try_from(code).map_err(MarshalError::from))
        .collect()
}

/// # Safety
/// `ptr` must be null or point to an initialized `c_int`.
pub unsafe fn read_int(ptr: *const c_int, what: &'static str) -> Result<c_int, MarshalError> {
    if ptr.is_null() {
        return Err(MarshalError::NullArgument(what));
    }
    Ok(*ptr)
}

/// # Safety
/// For a positive `rank`, `ptr` must point to `rank` initialized values that
/// outlive `'a`.
pub unsafe fn foreign_array<'a>(ptr: *const c_int, rank: c_int, what: &'static str) -> Result<&'a [c_int], MarshalError> {
    let len = usize::try_from(rank).map_err(|_| MarshalError::NegativeRank(rank))?;
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(MarshalError::NullArgument(what));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

/// Character sink backed by a foreign `write_char(char*, void*)` callback.
pub struct ForeignWriter {
    write_char: WriteCharFn,
    data: *mut c_void,
}

impl ForeignWriter {
    /// # Safety
    /// `write_char` must accept `data` for the writer's lifetime.
    pub unsafe fn new(write_char: WriteCharFn, data: *mut c_void) -> Self {
        Self { write_char, data }
    }

    pub fn put(&mut self, byte: u8) {
        let mut c = byte as c_char;
        unsafe { (self.write_char)(&mut c, self.data) }
    }
}

/// Character source backed by a foreign `read_char(int*, void*)` callback.
/// A negative value ends the stream; anything else is truncated to its low byte.
pub struct ForeignReader {
    read_char: ReadCharFn,
    data: *mut c_void,
}

impl ForeignReader {
    /// # Safety
    /// `read_char` must accept `data` for the reader's lifetime.
    pub unsafe fn new(read_char: ReadCharFn, data: *mut c_void) -> Self {
        Self { read_char, data }
    }

    pub fn get(&mut self) -> Option<u8> {
        let mut c: c_int = -1;
        unsafe { (self.read_char)(&mut c, self.data) };
        if c < 0 {
            return None;
        }
        Some(c as u8)
    }
}
