//! Public construction API.
//!
//! A [`Plan`] describes a transform problem together with the kernel path the
//! dispatcher chose for it; the planning engine that executes it consumes
//! both. Decisions are remembered in [`wisdom`] so identical problems reuse
//! them, and can be exported and imported across processes.
pub mod wisdom;

use crate::simd::{self, KernelPath};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Extent {n} on axis {axis} must be at least 1")]
    InvalidExtent { axis: usize, n: i64 },
    #[error("Expected {rank} transform kinds, got {kinds}")]
    KindCount { rank: usize, kinds: usize },
    #[error("Unknown transform kind code {0}")]
    InvalidKind(i32),
    #[error("Transform sign must be -1 or +1, got {0}")]
    InvalidSign(i32),
    #[error("No wisdom for this problem and WISDOM_ONLY was requested")]
    NoWisdom,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PlannerFlags: u32 {
        const MEASURE = 0;
        const DESTROY_INPUT = 1 << 0;
        const UNALIGNED = 1 << 1;
        const CONSERVE_MEMORY = 1 << 2;
        const EXHAUSTIVE = 1 << 3;
        const PRESERVE_INPUT = 1 << 4;
        const PATIENT = 1 << 5;
        const ESTIMATE = 1 << 6;
        const NO_SIMD = 1 << 17;
        const WISDOM_ONLY = 1 << 21;
    }
}

/// One dimension of a transform: extent and input/output strides in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iodim {
    pub n: usize,
    pub is: isize,
    pub os: isize,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    Forward = -1,
    Backward = 1,
}

impl TryFrom<i32> for Sign {
    type Error = ApiError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Sign::Forward),
            1 => Ok(Sign::Backward),
            other => Err(ApiError::InvalidSign(other)),
        }
    }
}

/// Real-to-real transform kinds, numbered as foreign callers pass them.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum R2rKind {
    R2hc = 0,
    Hc2r = 1,
    Dht = 2,
    Redft00 = 3,
    Redft01 = 4,
    Redft10 = 5,
    Redft11 = 6,
    Rodft00 = 7,
    Rodft01 = 8,
    Rodft10 = 9,
    Rodft11 = 10,
}

impl R2rKind {
    pub const ALL: [R2rKind; 11] = [
        R2rKind::R2hc,
        R2rKind::Hc2r,
        R2rKind::Dht,
        R2rKind::Redft00,
        R2rKind::Redft01,
        R2rKind::Redft10,
        R2rKind::Redft11,
        R2rKind::Rodft00,
        R2rKind::Rodft01,
        R2rKind::Rodft10,
        R2rKind::Rodft11,
    ];
}

impl TryFrom<i32> for R2rKind {
    type Error = ApiError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|i| R2rKind::ALL.get(i).copied())
            .ok_or(ApiError::InvalidKind(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Problem {
    Dft {
        dims: Vec<Iodim>,
        howmany: Vec<Iodim>,
        sign: Sign,
    },
    R2r {
        dims: Vec<Iodim>,
        howmany: Vec<Iodim>,
        kinds: Vec<R2rKind>,
    },
}

impl Problem {
    pub fn dims(&self) -> &[Iodim] {
        match self {
            Problem::Dft { dims, .. } | Problem::R2r { dims, .. } => dims,
        }
    }

    pub fn howmany(&self) -> &[Iodim] {
        match self {
            Problem::Dft { howmany, .. } | Problem::R2r { howmany, .. } => howmany,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims().len()
    }

    fn validate(&self) -> Result<(), ApiError> {
        for (axis, dim) in self.dims().iter().chain(self.howmany()).enumerate() {
            if dim.n == 0 {
                return Err(ApiError::InvalidExtent { axis, n: 0 });
            }
        }
        if let Problem::R2r { dims, kinds, .. } = self {
            if kinds.len() != dims.len() {
                return Err(ApiError::KindCount { rank: dims.len(), kinds: kinds.len() });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    problem: Problem,
    kernel: KernelPath,
    flags: PlannerFlags,
    from_wisdom: bool,
}

impl Plan {
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn kernel(&self) -> KernelPath {
        self.kernel
    }

    pub fn flags(&self) -> PlannerFlags {
        self.flags
    }

    pub fn from_wisdom(&self) -> bool {
        self.from_wisdom
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extents: Vec<String> = self.problem.dims().iter().map(|d| d.n.to_string()).collect();
        let kind = match &self.problem {
            Problem::Dft { sign: Sign::Forward, .. } => "dft-forward",
            Problem::Dft { sign: Sign::Backward, .. } => "dft-backward",
            Problem::R2r { .. } => "r2r",
        };
        write!(f, "({kind} [{}] x{} kernel={}", extents.join("x"), self.problem.howmany().len(), self.kernel)?;
        if self.from_wisdom {
            f.write_str(" wisdom")?;
        }
        f.write_str(")")
    }
}

/// Row-major dimensions with unit stride along the last axis.
pub fn contiguous_dims(n: &[usize]) -> Vec<Iodim> {
    let mut dims = vec![Iodim { n: 0, is: 0, os: 0 }; n.len()];
    let mut stride: isize = 1;
    for (dim, &extent) in dims.iter_mut().zip(n).rev() {
        *dim = Iodim { n: extent, is: stride, os: stride };
        stride = stride.saturating_mul(extent as isize);
    }
    dims
}

pub fn plan_dft(n: &[usize], sign: Sign, flags: PlannerFlags) -> Result<Plan, ApiError> {
    plan_guru_dft(&contiguous_dims(n), &[], sign, flags)
}

pub fn plan_r2r(n: &[usize], kinds: &[R2rKind], flags: PlannerFlags) -> Result<Plan, ApiError> {
    plan_guru_r2r(&contiguous_dims(n), &[], kinds, flags)
}

pub fn plan_guru_dft(dims: &[Iodim], howmany: &[Iodim], sign: Sign, flags: PlannerFlags) -> Result<Plan, ApiError> {
    make_plan(
        Problem::Dft {
            dims: dims.to_vec(),
            howmany: howmany.to_vec(),
            sign,
        },
        flags,
    )
}

pub fn plan_guru_r2r(
    dims: &[Iodim],
    howmany: &[Iodim],
    kinds: &[R2rKind],
    flags: PlannerFlags,
) -> Result<Plan, ApiError> {
    make_plan(
        Problem::R2r {
            dims: dims.to_vec(),
            howmany: howmany.to_vec(),
            kinds: kinds.to_vec(),
        },
        flags,
    )
}

fn forces_portable(flags: PlannerFlags) -> bool {
    flags.intersects(PlannerFlags::UNALIGNED | PlannerFlags::NO_SIMD)
}

fn compatible(kernel: KernelPath, flags: PlannerFlags) -> bool {
    kernel.usable() && (kernel == KernelPath::Portable || !forces_portable(flags))
}

fn make_plan(problem: Problem, flags: PlannerFlags) -> Result<Plan, ApiError> {
    problem.validate()?;

    let store = wisdom::global();
    if let Some(kernel) = store.lookup(&problem).filter(|k| compatible(*k, flags)) {
        return Ok(Plan { problem, kernel, flags, from_wisdom: true });
    }
    if flags.contains(PlannerFlags::WISDOM_ONLY) {
        return Err(ApiError::NoWisdom);
    }

    let kernel = simd::select_kernel(flags);
    // An opt-out says nothing about the problem; it must not replace the
    // decision aligned requests rely on.
    if !forces_portable(flags) {
        store.record(problem.clone(), kernel);
    }
    Ok(Plan { problem, kernel, flags, from_wisdom: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_dims_are_row_major() {
        let dims = contiguous_dims(&[2, 3, 4]);
        assert_eq!(
            dims,
            vec![
                Iodim { n: 2, is: 12, os: 12 },
                Iodim { n: 3, is: 4, os: 4 },
                Iodim { n: 4, is: 1, os: 1 },
            ]
        );
    }

    #[test]
    fn test_zero_extent_rejected() {
        let err = plan_dft(&[8, 0], Sign::Forward, PlannerFlags::ESTIMATE).unwrap_err();
        assert_eq!(err, ApiError::InvalidExtent { axis: 1, n: 0 });
    }

    #[test]
    fn test_kind_count_must_match_rank() {
        let err = plan_r2r(&[16, 16], &[R2rKind::Dht], PlannerFlags::ESTIMATE).unwrap_err();
        assert_eq!(err, ApiError::KindCount { rank: 2, kinds: 1 });
    }

    #[test]
    fn test_codes_map_to_kinds() {
        assert_eq!(R2rKind::try_from(0), Ok(R2rKind::R2hc));
        assert_eq!(R2rKind::try_from(10), Ok(R2rKind::Rodft11));
        assert_eq!(R2rKind::try_from(11), Err(ApiError::InvalidKind(11)));
        assert_eq!(R2rKind::try_from(-1), Err(ApiError::InvalidKind(-1)));
        assert_eq!(Sign::try_from(0), Err(ApiError::InvalidSign(0)));
    }

    #[test]
    fn test_second_plan_reuses_wisdom() {
        let _wisdom = wisdom::tests::global_lock();
        let first = plan_dft(&[3, 5, 7, 11], Sign::Backward, PlannerFlags::ESTIMATE).unwrap();
        assert!(!first.from_wisdom());
        assert_eq!(first.kernel(), simd::best_available());

        let second = plan_dft(&[3, 5, 7, 11], Sign::Backward, PlannerFlags::MEASURE).unwrap();
        assert!(second.from_wisdom());
        assert_eq!(second.kernel(), first.kernel());
        assert_eq!(second.problem(), first.problem());
    }

    #[test]
    fn test_wisdom_only_without_record_fails() {
        let err = plan_r2r(&[13, 17, 19], &[R2rKind::Redft10; 3], PlannerFlags::WISDOM_ONLY).unwrap_err();
        assert_eq!(err, ApiError::NoWisdom);
    }

    #[test]
    fn test_guru_plan_keeps_strides_and_batches() {
        let dims = [Iodim { n: 23, is: 2, os: 1 }];
        let howmany = [Iodim { n: 4, is: 46, os: 23 }];
        let plan = plan_guru_dft(&dims, &howmany, Sign::Forward, PlannerFlags::NO_SIMD).unwrap();

        assert_eq!(plan.problem().dims(), &dims);
        assert_eq!(plan.problem().howmany(), &howmany);
        assert_eq!(plan.kernel(), KernelPath::Portable);
        assert!(plan.to_string().starts_with("(dft-forward [23] x1 kernel=portable"));

        let empty_batch = [Iodim { n: 0, is: 1, os: 1 }];
        let err = plan_guru_dft(&dims, &empty_batch, Sign::Forward, PlannerFlags::ESTIMATE).unwrap_err();
        assert_eq!(err, ApiError::InvalidExtent { axis: 1, n: 0 });
    }

    #[test]
    fn test_opt_out_request_keeps_recorded_kernel() {
        let _wisdom = wisdom::tests::global_lock();
        let aligned = plan_dft(&[211, 223], Sign::Forward, PlannerFlags::ESTIMATE).unwrap();

        let unaligned = plan_dft(&[211, 223], Sign::Forward, PlannerFlags::UNALIGNED).unwrap();
        assert_eq!(unaligned.kernel(), KernelPath::Portable);
        let scalar = plan_dft(&[211, 223], Sign::Forward, PlannerFlags::NO_SIMD).unwrap();
        assert_eq!(scalar.kernel(), KernelPath::Portable);

        let again = plan_dft(&[211, 223], Sign::Forward, PlannerFlags::ESTIMATE).unwrap();
        assert!(again.from_wisdom());
        assert_eq!(again.kernel(), aligned.kernel());
        assert_eq!(wisdom::global().lookup(again.problem()), Some(aligned.kernel()));
    }

    #[test]
    fn test_opt_out_request_alone_records_nothing() {
        let plan = plan_r2r(&[227], &[R2rKind::Dht], PlannerFlags::NO_SIMD).unwrap();
        assert_eq!(wisdom::global().lookup(plan.problem()), None);
    }

    #[test]
    fn test_unaligned_plan_is_portable() {
        let plan = plan_dft(&[29, 31], Sign::Forward, PlannerFlags::UNALIGNED).unwrap();
        assert_eq!(plan.kernel(), KernelPath::Portable);
        assert!(plan.to_string().starts_with("(dft-forward [29x31] x0 kernel=portable"));
    }
}
