//! Canonical foreign entry points. Every argument arrives by pointer; the
//! decorated aliases generated at build time forward here.
use super::marshal::{
    extents_reversed, foreign_array, ints_to_kinds, make_dims_reversed, read_int, ForeignReader, ForeignWriter,
    MarshalError, ReadCharFn, WriteCharFn,
};
use crate::api::{self, wisdom, Plan, PlannerFlags, Sign};
use crate::core::cache;
use crate::core::flags::CapabilityFlag;
use libc::{c_int, c_void};
use std::ptr;

unsafe fn store_plan(p: *mut *mut Plan, result: Result<Plan, MarshalError>) {
    if p.is_null() {
        return;
    }
    *p = match result {
        Ok(plan) => Box::into_raw(Box::new(plan)),
        Err(e) => {
            tracing::debug!(error = %e, "Foreign plan request failed");
            ptr::null_mut()
        }
    };
}

fn planner_flags(flags: c_int) -> PlannerFlags {
    PlannerFlags::from_bits_truncate(flags as u32)
}

unsafe fn plan_dft(
    rank: *const c_int,
    n: *const c_int,
    sign: *const c_int,
    flags: *const c_int,
) -> Result<Plan, MarshalError> {
    let extents = extents_reversed(foreign_array(n, read_int(rank, "rank")?, "n")?)?;
    let sign = Sign::try_from(read_int(sign, "sign")?)?;
    Ok(api::plan_dft(&extents, sign, planner_flags(read_int(flags, "flags")?))?)
}

unsafe fn plan_r2r(
    rank: *const c_int,
    n: *const c_int,
    kinds: *const c_int,
    flags: *const c_int,
) -> Result<Plan, MarshalError> {
    let rank = read_int(rank, "rank")?;
    let extents = extents_reversed(foreign_array(n, rank, "n")?)?;
    let kinds = ints_to_kinds(foreign_array(kinds, rank, "kinds")?)?;
    Ok(api::plan_r2r(&extents, &kinds, planner_flags(read_int(flags, "flags")?))?)
}

/// Reads one (rank, n, is, os) group into reversed dimensions.
unsafe fn guru_dims(
    rank: *const c_int,
    n: *const c_int,
    is: *const c_int,
    os: *const c_int,
) -> GuruDims {
    let rank = read_int(rank, "rank")?;
    let dims = make_dims_reversed(
        foreign_array(n, rank, "n")?,
        foreign_array(is, rank, "is")?,
        foreign_array(os, rank, "os")?,
    )?;
    Ok((rank, dims))
}

type GuruDims = Result<(c_int, Vec<api::Iodim>), MarshalError>;

unsafe fn guru_dft(dims: GuruDims, howmany: GuruDims, sign: *const c_int, flags: *const c_int) -> Result<Plan, MarshalError> {
    let ((_, dims), (_, howmany)) = (dims?, howmany?);
    let sign = Sign::try_from(read_int(sign, "sign")?)?;
    Ok(api::plan_guru_dft(&dims, &howmany, sign, planner_flags(read_int(flags, "flags")?))?)
}

unsafe fn guru_r2r(dims: GuruDims, howmany: GuruDims, kinds: *const c_int, flags: *const c_int) -> Result<Plan, MarshalError> {
    let ((rank, dims), (_, howmany)) = (dims?, howmany?);
    let kinds = ints_to_kinds(foreign_array(kinds, rank, "kinds")?)?;
    Ok(api::plan_guru_r2r(&dims, &howmany, &kinds, planner_flags(read_int(flags, "flags")?))?)
}

#[no_mangle]
pub unsafe extern "C" fn fftengine_plan_dft(
    p: *mut *mut Plan,
    rank: *const c_int,
    n: *const c_int,
    sign: *const c_int,
    flags: *const c_int,
) {
    store_plan(p, plan_dft(rank, n, sign, flags))
}

#[no_mangle]
pub unsafe extern "C" fn fftengine_plan_r2r(
    p: *mut *mut Plan,
    rank: *const c_int,
    n: *const c_int,
    kinds: *const c_int,
    flags: *const c_int,
) {
    store_plan(p, plan_r2r(rank, n, kinds, flags))
}

#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fftengine_plan_guru_dft(
    p: *mut *mut Plan,
    rank: *const c_int,
    n: *const c_int,
    is: *const c_int,
    os: *const c_int,
    howmany_rank: *const c_int,
    h_n: *const c_int,
    h_is: *const c_int,
    h_os: *const c_int,
    sign: *const c_int,
    flags: *const c_int,
) {
    let (dims, howmany) = (guru_dims(rank, n, is, os), guru_dims(howmany_rank, h_n, h_is, h_os));
    store_plan(p, guru_dft(dims, howmany, sign, flags))
}

#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fftengine_plan_guru_r2r(
    p: *mut *mut Plan,
    rank: *const c_int,
    n: *const c_int,
    is: *const c_int,
    os: *const c_int,
    howmany_rank: *const c_int,
    h_n: *const c_int,
    h_is: *const c_int,
    h_os: *const c_int,
    kinds: *const c_int,
    flags: *const c_int,
) {
    let (dims, howmany) = (guru_dims(rank, n, is, os), guru_dims(howmany_rank, h_n, h_is, h_os));
    store_plan(p, guru_r2r(dims, howmany, kinds, flags))
}

/// Frees the plan and nulls the caller's handle. A null handle is a no-op.
#[no_mangle]
pub unsafe extern "C" fn fftengine_destroy_plan(p: *mut *mut Plan) {
    if p.is_null() || (*p).is_null() {
        return;
    }
    drop(Box::from_raw(*p));
    *p = ptr::null_mut();
}

#[no_mangle]
pub unsafe extern "C" fn fftengine_export_wisdom(write_char: WriteCharFn, data: *mut c_void) {
    let mut writer = ForeignWriter::new(write_char, data);
    wisdom::export_wisdom(&mut |b| writer.put(b));
}

#[no_mangle]
pub unsafe extern "C" fn fftengine_import_wisdom(isuccess: *mut c_int, read_char: ReadCharFn, data: *mut c_void) {
    let mut reader = ForeignReader::new(read_char, data);
    let ok = match wisdom::import_wisdom(&mut || reader.get()) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Foreign wisdom import failed");
            false
        }
    };
    if !isuccess.is_null() {
        *isuccess = c_int::from(ok);
    }
}

#[no_mangle]
pub unsafe extern "C" fn fftengine_forget_wisdom() {
    wisdom::forget_wisdom()
}

/// Writes 1 if the flag numbered `*flag` is supported, 0 otherwise
/// (including out-of-range numbers).
#[no_mangle]
pub unsafe extern "C" fn fftengine_cpu_supports(result: *mut c_int, flag: *const c_int) {
    if result.is_null() {
        return;
    }
    let supported = read_int(flag, "flag")
        .ok()
        .and_then(|f| usize::try_from(f).ok())
        .and_then(CapabilityFlag::from_index)
        .is_some_and(cache::is_supported);
    *result = c_int::from(supported);
}

include!(concat!(env!("OUT_DIR"), "/foreign_aliases.rs"));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Iodim, Problem, R2rKind};
    use libc::c_char;

    #[test]
    fn test_guru_r2r_reverses_everything() {
        let (rank, n, is, os) = (2, [6, 10], [10, 1], [10, 1]);
        let (h_rank, h_n, h_is, h_os) = (1, [3], [60], [60]);
        let kinds = [R2rKind::Redft00 as c_int, R2rKind::Rodft11 as c_int];
        let flags = PlannerFlags::ESTIMATE.bits() as c_int;

        let mut plan: *mut Plan = ptr::null_mut();
        unsafe {
            fftengine_plan_guru_r2r(
                &mut plan,
                &rank,
                n.as_ptr(),
                is.as_ptr(),
                os.as_ptr(),
                &h_rank,
                h_n.as_ptr(),
                h_is.as_ptr(),
                h_os.as_ptr(),
                kinds.as_ptr(),
                &flags,
            );
        }
        assert!(!plan.is_null());

        let expected = Problem::R2r {
            dims: vec![Iodim { n: 10, is: 1, os: 1 }, Iodim { n: 6, is: 10, os: 10 }],
            howmany: vec![Iodim { n: 3, is: 60, os: 60 }],
            kinds: vec![R2rKind::Rodft11, R2rKind::Redft00],
        };
        assert_eq!(unsafe { (*plan).problem() }, &expected);

        unsafe { fftengine_destroy_plan(&mut plan) };
        assert!(plan.is_null());
        // Destroying again is harmless.
        unsafe { fftengine_destroy_plan(&mut plan) };
    }

    #[test]
    fn test_invalid_request_yields_null_plan() {
        let (rank, n, flags) = (1, [16], 0);
        let bad_sign = 0;
        let bad_kind = [99];

        let mut plan: *mut Plan = ptr::NonNull::dangling().as_ptr();
        unsafe { fftengine_plan_dft(&mut plan, &rank, n.as_ptr(), &bad_sign, &flags) };
        assert!(plan.is_null());

        unsafe { fftengine_plan_r2r(&mut plan, &rank, n.as_ptr(), bad_kind.as_ptr(), &flags) };
        assert!(plan.is_null());

        unsafe { fftengine_plan_dft(&mut plan, ptr::null(), n.as_ptr(), &bad_sign, &flags) };
        assert!(plan.is_null());
    }

    #[test]
    fn test_decorated_alias_forwards() {
        let (rank, n, sign, flags) = (2, [37, 41], -1, 0);
        let mut plan: *mut Plan = ptr::null_mut();
        unsafe { fftengine_plan_dft_u1(&mut plan, &rank, n.as_ptr(), &sign, &flags) };
        assert!(!plan.is_null());

        let extents: Vec<usize> = unsafe { (*plan).problem().dims().iter().map(|d| d.n).collect() };
        assert_eq!(extents, vec![41, 37]);
        unsafe { fftengine_destroy_plan_u2(&mut plan) };
        assert!(plan.is_null());
    }

    #[test]
    fn test_alias_table_covers_every_entry_point() {
        for name in [
            "fftengine_plan_dft",
            "fftengine_plan_r2r",
            "fftengine_plan_guru_dft",
            "fftengine_plan_guru_r2r",
            "fftengine_destroy_plan",
            "fftengine_export_wisdom",
            "fftengine_import_wisdom",
            "fftengine_forget_wisdom",
            "fftengine_cpu_supports",
        ] {
            let single = format!("{name}_");
            let double = format!("{name}__");
            assert!(ALIAS_NAMES.contains(&(name, single.as_str())), "missing {single}");
            assert!(ALIAS_NAMES.contains(&(name, double.as_str())), "missing {double}");
        }
    }

    #[test]
    fn test_cpu_supports_matches_cache() {
        for flag in CapabilityFlag::ALL {
            let index = flag.index() as c_int;
            let mut result = -1;
            unsafe { fftengine_cpu_supports(&mut result, &index) };
            assert_eq!(result, c_int::from(cache::is_supported(flag)), "{flag}");
        }

        for index in [-1, CapabilityFlag::COUNT as c_int, 1000] {
            let mut result = -1;
            unsafe { fftengine_cpu_supports(&mut result, &index) };
            assert_eq!(result, 0);
        }
    }

    unsafe extern "C" fn collect(c: *mut c_char, data: *mut c_void) {
        (*data.cast::<Vec<u8>>()).push(*c as u8);
    }

    struct Replay {
        bytes: Vec<u8>,
        pos: usize,
    }

    unsafe extern "C" fn replay(c: *mut c_int, data: *mut c_void) {
        let replay = &mut *data.cast::<Replay>();
        *c = match replay.bytes.get(replay.pos) {
            Some(b) => {
                replay.pos += 1;
                c_int::from(*b)
            }
            None => -1,
        };
    }

    #[test]
    fn test_forget_through_export() {
        let _wisdom = crate::api::wisdom::tests::global_lock();
        let (rank, n, sign) = (1, [251], -1);
        let estimate = PlannerFlags::ESTIMATE.bits() as c_int;
        let wisdom_only = PlannerFlags::WISDOM_ONLY.bits() as c_int;

        let mut plan: *mut Plan = ptr::null_mut();
        unsafe { fftengine_plan_dft(&mut plan, &rank, n.as_ptr(), &sign, &estimate) };
        assert!(!plan.is_null());
        unsafe { fftengine_destroy_plan(&mut plan) };

        unsafe { fftengine_plan_dft(&mut plan, &rank, n.as_ptr(), &sign, &wisdom_only) };
        assert!(!plan.is_null());
        assert!(unsafe { (*plan).from_wisdom() });
        unsafe { fftengine_destroy_plan(&mut plan) };

        unsafe { fftengine_forget_wisdom() };
        unsafe { fftengine_plan_dft(&mut plan, &rank, n.as_ptr(), &sign, &wisdom_only) };
        assert!(plan.is_null());
    }

    #[test]
    fn test_wisdom_through_callbacks() {
        let _wisdom = crate::api::wisdom::tests::global_lock();
        let (rank, n, sign, flags) = (1, [43], 1, 0);
        let mut plan: *mut Plan = ptr::null_mut();
        unsafe { fftengine_plan_dft(&mut plan, &rank, n.as_ptr(), &sign, &flags) };
        unsafe { fftengine_destroy_plan(&mut plan) };

        let mut exported: Vec<u8> = Vec::new();
        unsafe { fftengine_export_wisdom(collect, (&mut exported as *mut Vec<u8>).cast()) };
        assert!(exported.starts_with(b"(fft_engine-wisdom v1"));

        let mut good = Replay { bytes: exported.clone(), pos: 0 };
        let mut ok = -1;
        unsafe { fftengine_import_wisdom(&mut ok, replay, (&mut good as *mut Replay).cast()) };
        assert_eq!(ok, 1);
        assert_eq!(good.pos, exported.len());

        let mut truncated = Replay { bytes: exported[..exported.len() / 2].to_vec(), pos: 0 };
        unsafe { fftengine_import_wisdom(&mut ok, replay, (&mut truncated as *mut Replay).cast()) };
        assert_eq!(ok, 0);
    }
}
